//! 智慧学工接口客户端
//!
//! 只负责发送请求：附加默认请求头和会话 token，不做重试。

use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// 登录成功时携带 token 的响应头
pub const TOKEN_HEADER: &str = "token";

/// 除认证信息外的默认请求头
pub const DEFAULT_HEADERS: &[(&str, &str)] = &[
    (
        "User-Agent",
        "Mozilla/5.0 (Linux; Android 15; 22081212C Build/AQ3A.241006.001; wv) \
         AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Chrome/138.0.7204.179 \
         Mobile Safari/537.36",
    ),
    ("App-Version", "2.0.1"),
    ("X-Requested-With", "com.neuedu.wisestu"),
    ("Content-Type", "application/json"),
    ("forbid_notify", ""),
];

/// 客户端配置
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// 服务器 URL
    pub server_url: String,
    /// 请求超时（秒）
    pub timeout: u64,
    /// 是否在 debug 级别记录请求 / 响应体
    pub trace_bodies: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            timeout: 30,
            trace_bodies: false,
        }
    }
}

/// 原始响应
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    /// `token` 响应头（如果存在）
    pub token: Option<String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// 构造 HTTP 200 响应
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            token: None,
            body: body.into(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 解码响应体
    ///
    /// 业务码以响应体为准：非成功状态下只要响应体能解析就照常返回，
    /// 无法解析时才视为网络错误。
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        match serde_json::from_slice(&self.body) {
            Ok(value) => Ok(value),
            Err(_) if !self.is_success() => Err(Error::Network(format!(
                "HTTP {}: {}",
                self.status,
                String::from_utf8_lossy(&self.body)
            ))),
            Err(e) => Err(Error::Protocol(format!("Failed to parse response: {}", e))),
        }
    }
}

/// 请求发送接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Gateway: Send + Sync {
    /// POST JSON 到 `path`，返回原始响应
    async fn post(&self, path: &str, body: serde_json::Value) -> Result<RawResponse>;

    /// 设置或清除会话 token
    fn set_token(&mut self, token: Option<String>);
}

/// 基于 reqwest 的实现
pub struct HttpGateway {
    config: ClientConfig,
    http_client: Client,
    token: Option<String>,
}

impl HttpGateway {
    /// 创建新的客户端实例
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in DEFAULT_HEADERS {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Config(format!("header {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Config(format!("header {}: {}", name, e)))?;
            headers.insert(name, value);
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
            token: None,
        })
    }

    /// 使用默认配置创建客户端
    pub fn with_server_url(server_url: &str) -> Result<Self> {
        let mut config = ClientConfig::default();
        config.server_url = server_url.trim_end_matches('/').to_string();
        Self::new(config)
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn post(&self, path: &str, body: serde_json::Value) -> Result<RawResponse> {
        let url = format!("{}{}", self.config.server_url, path);
        if self.config.trace_bodies {
            debug!(%url, body = %redact(&body), "Sending request");
        }

        let mut request = self.http_client.post(&url).json(&body);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, token.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to connect to {}: {}", url, e)))?;

        let status = response.status().as_u16();
        let token = response
            .headers()
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("Failed to read response from {}: {}", url, e)))?
            .to_vec();

        if self.config.trace_bodies {
            debug!(%url, status, body = %String::from_utf8_lossy(&body), "Received response");
        }

        Ok(RawResponse {
            status,
            token,
            body,
        })
    }

    fn set_token(&mut self, token: Option<String>) {
        self.token = token.filter(|t| !t.is_empty());
    }
}

/// 日志中隐藏密码与验证码图片
fn redact(body: &serde_json::Value) -> String {
    let mut body = body.clone();
    if let Some(map) = body.as_object_mut() {
        for key in ["password", "verification_image"] {
            if let Some(v) = map.get_mut(key) {
                *v = serde_json::Value::String("***".to_string());
            }
        }
    }
    body.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApiResponse, Empty};

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, 30);
        assert!(!config.trace_bodies);
    }

    #[test]
    fn test_client_creation() {
        let client = HttpGateway::with_server_url("http://localhost:8080/");
        assert!(client.is_ok());
        assert_eq!(client.unwrap().config.server_url, "http://localhost:8080");
    }

    #[test]
    fn test_empty_token_is_unset() {
        let mut client = HttpGateway::with_server_url("http://localhost:8080").unwrap();
        client.set_token(Some(String::new()));
        assert!(client.token().is_none());
        client.set_token(Some("abc".to_string()));
        assert_eq!(client.token(), Some("abc"));
    }

    #[test]
    fn test_decode_http_error_is_network() {
        let raw = RawResponse {
            status: 502,
            token: None,
            body: b"bad gateway".to_vec(),
        };
        let err = raw.decode::<ApiResponse<Empty>>().unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }

    #[test]
    fn test_decode_http_error_with_envelope_keeps_code() {
        let raw = RawResponse {
            status: 401,
            token: None,
            body: r#"{"code":1002,"message":"密码错误"}"#.as_bytes().to_vec(),
        };
        let resp = raw.decode::<ApiResponse<Empty>>().unwrap();
        assert_eq!(resp.code, 1002);
        assert_eq!(resp.message, "密码错误");
    }

    #[test]
    fn test_decode_garbage_is_protocol() {
        let err = RawResponse::ok("<html>")
            .decode::<ApiResponse<Empty>>()
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_redact_hides_secrets() {
        let body = serde_json::json!({"login_name": "u", "password": "p"});
        let out = redact(&body);
        assert!(out.contains("***"));
        assert!(!out.contains("\"p\""));
    }
}
