//! 智慧学工自动签到核心库
//!
//! 提供完整的登录 + 签到流程，包括：
//! - 会话探测与带验证码识别的有界重试登录
//! - 未签到记录选择与 进入 → 提交位置 → 确认 三步签到
//! - 基于多模态大模型的算式验证码识别

pub mod captcha;
pub mod client;
pub mod config;
pub mod error;
pub mod retry;
pub mod service;
pub mod session;
pub mod signin;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use captcha::{CaptchaSolver, LlmSolver, SolverConfig};
pub use client::{ClientConfig, Gateway, HttpGateway, RawResponse};
pub use config::Settings;
pub use error::{Error, ErrorKind, Result, SolverError};
pub use retry::{Backoff, RetryPolicy};
pub use service::{RunReport, SigninService};
pub use session::{AuthReport, SessionManager, SessionState};
pub use signin::{select_record, SigninOutcome, SigninTransaction};
pub use types::*;
