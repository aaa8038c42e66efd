//! 一次完整的签到运行：认证 + 签到事务

use crate::captcha::{CaptchaSolver, LlmSolver};
use crate::client::{Gateway, HttpGateway};
use crate::config::Settings;
use crate::error::Result;
use crate::session::{AuthReport, SessionManager};
use crate::signin::{SigninOutcome, SigninTransaction};
use crate::types::Geolocation;
use tracing::{info, info_span, Instrument, Span};

/// 运行结果
#[derive(Debug, Clone)]
pub struct RunReport {
    pub auth: AuthReport,
    pub outcome: SigninOutcome,
}

/// 签到服务
///
/// 每次运行的日志都挂在构造时创建的 span 下。
pub struct SigninService<G, S> {
    session: SessionManager<G, S>,
    location: Geolocation,
    span: Span,
}

impl SigninService<HttpGateway, LlmSolver> {
    /// 按配置创建 HTTP 客户端与识别器
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;

        let span = info_span!("signin_run", user = %settings.user.username);
        let gateway = HttpGateway::new(settings.client_config())?;
        let solver = LlmSolver::new(settings.solver_config())?;

        let mut session = SessionManager::new(
            gateway,
            solver,
            settings.credential(),
            settings.login_policy(),
            info_span!(parent: &span, "session"),
        );
        if let Some(seed) = settings.seed_session() {
            session = session.with_session(seed);
        }

        Ok(Self::new(session, settings.location.clone(), span))
    }
}

impl<G: Gateway, S: CaptchaSolver> SigninService<G, S> {
    pub fn new(session: SessionManager<G, S>, location: Geolocation, span: Span) -> Self {
        Self {
            session,
            location,
            span,
        }
    }

    pub fn session(&self) -> &SessionManager<G, S> {
        &self.session
    }

    /// 执行完整签到流程
    pub async fn run(&mut self) -> Result<RunReport> {
        let span = self.span.clone();
        async move {
            info!("Starting sign-in run");
            let auth = self.session.run().await?;

            let transaction = SigninTransaction::new(
                self.session.gateway(),
                &self.location,
                info_span!(parent: &self.span, "transaction"),
            );
            let outcome = transaction.execute().await?;

            match &outcome {
                SigninOutcome::NothingPending => info!("Sign-in run finished, nothing to do"),
                SigninOutcome::Completed { record } => {
                    info!(id = record.id, "Sign-in run finished successfully")
                }
            }
            Ok(RunReport { auth, outcome })
        }
        .instrument(span)
        .await
    }
}
