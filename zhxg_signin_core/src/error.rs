//! 错误类型定义

use thiserror::Error;

/// 错误分类
///
/// 登录循环与签到事务根据分类决定是否重试。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 网络 / 超时
    Transport,
    /// 响应结构异常
    Protocol,
    /// 凭据错误
    Auth,
    /// 验证码识别失败
    Solver,
    /// 业务失败（非零 code）
    Business,
}

/// 验证码识别错误
#[derive(Debug, Error)]
pub enum SolverError {
    /// 识别服务不可用（网络错误或 HTTP 非成功状态）
    #[error("Captcha solver unavailable: {0}")]
    Unavailable(String),

    /// 响应中没有任何候选结果
    #[error("Captcha solver returned no choices")]
    EmptyResponse,

    /// `result` 字段无法解析为整数
    #[error("Malformed captcha answer: {0}")]
    MalformedAnswer(String),
}

/// 错误类型
#[derive(Debug, Error)]
pub enum Error {
    /// 网络错误
    #[error("Network error: {0}")]
    Network(String),

    /// 协议错误
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// API 错误
    #[error("API error (code {code}): {message}")]
    Api { code: i64, message: String },

    /// 用户名或密码错误
    #[error("Invalid credentials (code {code}): {message}")]
    InvalidCredentials { code: i64, message: String },

    /// 验证码识别错误
    #[error(transparent)]
    Solver(#[from] SolverError),

    /// 某次登录尝试的上下文
    #[error("attempt {attempt}: {source}")]
    Attempt {
        attempt: u32,
        #[source]
        source: Box<Error>,
    },

    /// 登录重试耗尽
    #[error("Login failed after {attempts} attempts, last error: {last}")]
    LoginExhausted { attempts: u32, last: Box<Error> },

    /// 获取未签到列表失败
    #[error("Failed to list pending sign-ins: {0}")]
    ListFailed(#[source] Box<Error>),

    /// 进入签到失败
    #[error("Failed to enter sign-in: {0}")]
    EnterFailed(#[source] Box<Error>),

    /// 提交位置失败
    #[error("Failed to submit location: {0}")]
    LocationSubmitFailed(#[source] Box<Error>),

    /// 确认签到失败
    #[error("Failed to confirm sign-in: {0}")]
    ConfirmFailed(#[source] Box<Error>),

    /// 配置错误
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// 按错误分类归类；包装类错误取其内部原因的分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(_) => ErrorKind::Transport,
            Error::Protocol(_) | Error::Config(_) => ErrorKind::Protocol,
            Error::Api { .. } => ErrorKind::Business,
            Error::InvalidCredentials { .. } => ErrorKind::Auth,
            Error::Solver(_) => ErrorKind::Solver,
            Error::Attempt { source, .. } => source.kind(),
            Error::LoginExhausted { last, .. } => last.kind(),
            Error::ListFailed(inner)
            | Error::EnterFailed(inner)
            | Error::LocationSubmitFailed(inner)
            | Error::ConfirmFailed(inner) => inner.kind(),
        }
    }

    /// 登录循环内是否可以重试；只有凭据错误立即终止
    pub fn is_retryable_login(&self) -> bool {
        self.kind() != ErrorKind::Auth
    }

    pub(crate) fn in_attempt(self, attempt: u32) -> Self {
        Error::Attempt {
            attempt,
            source: Box::new(self),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e.to_string())
    }
}

/// 结果类型
pub type Result<T> = std::result::Result<T, Error>;
