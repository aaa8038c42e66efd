//! 运行配置
//!
//! 核心库只消费已经合并好的 [`Settings`]，文件 / 环境变量 / 命令行的合并由 CLI 完成。

use crate::captcha::SolverConfig;
use crate::client::ClientConfig;
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::session::MAX_LOGIN_ATTEMPTS;
use crate::types::{Credential, Geolocation, Session};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// 请求超时（秒）
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// 全部配置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub user: UserConfig,
    pub location: Geolocation,
    pub llm: LlmConfig,
    pub signin: SigninConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

/// 用户凭据
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
    /// 预置 token，可省去一次登录
    pub token: Option<String>,
}

impl fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserConfig")
            .field("username", &self.username)
            .field("password", &mask(&self.password))
            .field("token", &self.token.as_deref().map(mask))
            .finish()
    }
}

/// 验证码识别服务
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &mask(&self.api_key))
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

/// 签到服务
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SigninConfig {
    pub base_url: String,
    /// 登录尝试次数，最多 5 次
    pub retry_times: u32,
    pub retry_interval_secs: u64,
}

impl Default for SigninConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            retry_times: MAX_LOGIN_ATTEMPTS,
            retry_interval_secs: 3,
        }
    }
}

/// 定时任务
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub cron: String,
    pub timezone: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cron: "0 8 * * *".to_string(),
            timezone: "Asia/Shanghai".to_string(),
        }
    }
}

/// 日志
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// JSON 日志文件
    pub file: Option<PathBuf>,
    /// 记录请求 / 响应体
    pub debug: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            debug: false,
        }
    }
}

impl Settings {
    /// 运行前检查必填项
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("user.username", &self.user.username),
            ("user.password", &self.user.password),
            ("signin.base_url", &self.signin.base_url),
            ("llm.endpoint", &self.llm.endpoint),
            ("llm.api_key", &self.llm.api_key),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(key, _)| *key)
            .collect();
        if !missing.is_empty() {
            return Err(Error::Config(format!("missing {}", missing.join(", "))));
        }
        if !self.location.longitude.is_finite() || !self.location.latitude.is_finite() {
            return Err(Error::Config("location coordinates must be finite".to_string()));
        }
        Ok(())
    }

    pub fn credential(&self) -> Credential {
        Credential::new(self.user.username.clone(), self.user.password.clone())
    }

    pub fn seed_session(&self) -> Option<Session> {
        self.user
            .token
            .as_ref()
            .filter(|t| !t.is_empty())
            .map(|token| Session {
                token: token.clone(),
            })
    }

    /// 登录重试策略：固定间隔，次数限制在 1..=5
    pub fn login_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.signin.retry_times.clamp(1, MAX_LOGIN_ATTEMPTS),
            Duration::from_secs(self.signin.retry_interval_secs),
        )
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            server_url: self.signin.base_url.trim_end_matches('/').to_string(),
            timeout: REQUEST_TIMEOUT_SECS,
            trace_bodies: self.logging.debug,
        }
    }

    pub fn solver_config(&self) -> SolverConfig {
        SolverConfig {
            endpoint: self.llm.endpoint.clone(),
            api_key: self.llm.api_key.clone(),
            model: self.llm.model.clone(),
            timeout: REQUEST_TIMEOUT_SECS,
        }
    }
}

/// 只保留前两位
pub fn mask(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let prefix: String = secret.chars().take(2).collect();
    format!("{}***", prefix)
}
