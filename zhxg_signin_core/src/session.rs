//! 会话管理
//!
//! 状态流转：
//! `Unknown → Probing → {Authenticated | Unauthenticated} → LoggingIn → {Authenticated | Failed}`
//!
//! 先用低成本接口探测现有 token；探测失败（包括网络或解析错误）一律按未登录处理，
//! 进入有界重试的登录循环：获取验证码 → 识别 → 提交凭据。

use crate::captcha::CaptchaSolver;
use crate::client::Gateway;
use crate::error::{Error, Result};
use crate::retry::{Attempt, Retried, RetryFailure, RetryPolicy};
use crate::types::*;
use serde_json::json;
use std::fmt;
use tracing::{debug, info, warn, Instrument, Span};

/// 学生基本信息接口，用于探测登录状态
pub const INFO_PATH: &str = "/dnui/api/student/basic/stuInfo.api";

/// 登录 / 登出接口，同时下发验证码
pub const LOGIN_PATH: &str = "/dnui/api/user/loginout.api";

/// 登录尝试次数上限
pub const MAX_LOGIN_ATTEMPTS: u32 = 5;

const CLIENT_TYPE: &str = "App";
const CLIENT_VER: &str = "2.0.1";
const CLIENT_EXTRA: &str = r#"{"available":true,"platform":"Android","version":"15","uuid":"","cordova":"8.1.0","model":"22081212C","manufacturer":"Xiaomi","isVirtual":false,"serial":"unknown"}"#;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unknown,
    Probing,
    Authenticated,
    Unauthenticated,
    LoggingIn,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unknown => "UNKNOWN",
            SessionState::Probing => "PROBING",
            SessionState::Authenticated => "AUTHENTICATED",
            SessionState::Unauthenticated => "UNAUTHENTICATED",
            SessionState::LoggingIn => "LOGGING_IN",
            SessionState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// 认证结果
#[derive(Debug, Clone, Default)]
pub struct AuthReport {
    /// 是否执行了登录
    pub logged_in: bool,
    /// 登录尝试次数，token 有效时为 0
    pub attempts: u32,
    /// 中间失败记录
    pub failures: Vec<String>,
}

/// 会话管理器
///
/// 独占会话 token，登录成功后整体替换并同步到 [`Gateway`]。
pub struct SessionManager<G, S> {
    gateway: G,
    solver: S,
    credential: Credential,
    policy: RetryPolicy,
    session: Option<Session>,
    state: SessionState,
    span: Span,
}

impl<G: Gateway, S: CaptchaSolver> SessionManager<G, S> {
    /// 创建会话管理器，尝试次数超过上限时按上限处理
    pub fn new(
        gateway: G,
        solver: S,
        credential: Credential,
        mut policy: RetryPolicy,
        span: Span,
    ) -> Self {
        policy.max_attempts = policy.max_attempts.clamp(1, MAX_LOGIN_ATTEMPTS);
        Self {
            gateway,
            solver,
            credential,
            policy,
            session: None,
            state: SessionState::Unknown,
            span,
        }
    }

    /// 预置已有 token，探测通过时可跳过登录
    pub fn with_session(mut self, session: Session) -> Self {
        if !session.token.is_empty() {
            self.session = Some(session);
        }
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// 确保处于已登录状态
    pub async fn run(&mut self) -> Result<AuthReport> {
        let span = self.span.clone();
        async move {
            self.transition(SessionState::Probing);
            let token = self.session.as_ref().map(|s| s.token.clone());
            self.gateway.set_token(token);

            match self.probe().await {
                Ok(true) => {
                    info!("Session token is valid, skipping login");
                    self.transition(SessionState::Authenticated);
                    return Ok(AuthReport::default());
                }
                Ok(false) => info!("Session token is invalid or missing, login required"),
                Err(e) => warn!("Login status probe failed, will log in: {}", e),
            }

            self.transition(SessionState::Unauthenticated);
            self.login().await
        }
        .instrument(span)
        .await
    }

    /// 探测当前 token 是否有效
    async fn probe(&self) -> Result<bool> {
        let raw = self
            .gateway
            .post(INFO_PATH, json!({ "action": "queryMyStuInfo" }))
            .await?;
        let resp: ApiResponse<Empty> = raw.decode()?;
        info!(code = resp.code, message = %resp.message, "Login status probe answered");
        Ok(resp.is_ok())
    }

    /// 有界重试的登录循环
    pub async fn login(&mut self) -> Result<AuthReport> {
        self.transition(SessionState::LoggingIn);
        self.session = None;
        self.gateway.set_token(None);

        let this = &*self;
        let outcome = this
            .policy
            .run(|attempt| async move {
                info!(attempt, "Starting login attempt");
                match this.try_login().await {
                    Ok(session) => Attempt::Done(session),
                    Err(e) if !e.is_retryable_login() => Attempt::Abort(e),
                    Err(e) => Attempt::Retry(e.in_attempt(attempt)),
                }
            })
            .await;

        match outcome {
            Ok(Retried {
                value,
                attempts,
                failures,
            }) => {
                info!(attempts, "Login succeeded, new token acquired");
                self.gateway.set_token(Some(value.token.clone()));
                self.session = Some(value);
                self.transition(SessionState::Authenticated);
                Ok(AuthReport {
                    logged_in: true,
                    attempts,
                    failures,
                })
            }
            Err(RetryFailure::Aborted(e)) => {
                self.transition(SessionState::Failed);
                Err(e)
            }
            Err(RetryFailure::Exhausted { attempts, last }) => {
                self.transition(SessionState::Failed);
                Err(Error::LoginExhausted {
                    attempts,
                    last: Box::new(last),
                })
            }
        }
    }

    /// 单次登录：验证码 → 识别 → 提交
    async fn try_login(&self) -> Result<Session> {
        let challenge = self.fetch_captcha().await?;
        let answer = self.solver.solve(&challenge.image).await?;
        info!(answer, "Captcha solved");

        let request = LoginRequest {
            action: "loginStudent",
            verification_id: &challenge.id,
            verification_image: &challenge.image,
            verification_answer: answer.to_string(),
            login_name: &self.credential.username,
            password: &self.credential.password,
            client_type: CLIENT_TYPE,
            client_ver: CLIENT_VER,
            client_extra: CLIENT_EXTRA,
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| Error::Protocol(format!("Failed to encode login request: {}", e)))?;

        let raw = self.gateway.post(LOGIN_PATH, body).await?;
        let resp: ApiResponse<Empty> = raw.decode()?;
        info!(code = resp.code, message = %resp.message, "Login answered");

        match resp.code {
            CODE_OK => raw.token.map(|token| Session { token }).ok_or_else(|| {
                Error::Protocol("login succeeded but no token in response header".to_string())
            }),
            CODE_BAD_CREDENTIALS => Err(Error::InvalidCredentials {
                code: resp.code,
                message: resp.message,
            }),
            code => Err(Error::Api {
                code,
                message: resp.message,
            }),
        }
    }

    async fn fetch_captcha(&self) -> Result<CaptchaChallenge> {
        let raw = self
            .gateway
            .post(
                LOGIN_PATH,
                json!({ "action": "queryVerificationQuestion", "client_type": CLIENT_TYPE }),
            )
            .await?;
        let reply: CaptchaReply = raw.decode()?;

        if let Some(code) = reply.code.filter(|c| *c != CODE_OK) {
            return Err(Error::Api {
                code,
                message: reply.message,
            });
        }
        if reply.verification_id.is_empty() || reply.verification_image.is_empty() {
            return Err(Error::Protocol("captcha reply is missing id or image".to_string()));
        }
        debug!(id = %reply.verification_id, "Captcha challenge received");

        Ok(CaptchaChallenge {
            id: reply.verification_id,
            image: reply.verification_image,
        })
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, "Session state transition");
        self.state = next;
    }
}
