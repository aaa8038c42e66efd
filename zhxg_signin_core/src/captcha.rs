//! 算式验证码识别
//!
//! 把验证码图片连同固定提示词发送到兼容 chat-completions 的多模态接口，
//! 再从模型输出中解析出 `result` 字段。本模块不做重试。

use crate::error::SolverError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// 固定提示词
pub const CAPTCHA_PROMPT: &str = r#"你是一个严谨的图片算式计算器。请按以下要求处理下面这张图片：
1. 识别：读出图片中完整的数学算式，忽略干扰线、噪点和与算式无关的符号。
2. 计算：求出该算式的数值结果。
3. 输出：只返回一个 JSON 对象，包含三个字段：'expression'（识别出的算式字符串）、'result'（计算结果，整数）、'error'（无法识别或无法计算时填写原因，否则为 null）。

示例：图片内容为 '7 - 2 =' 时，返回 {"expression": "7-2", "result": 5, "error": null}"#;

/// 验证码识别接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// 识别 base64 编码的验证码图片，返回算式结果
    async fn solve(&self, image: &str) -> Result<i64, SolverError>;
}

/// 识别服务配置
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    /// 请求超时（秒）
    pub timeout: u64,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// 基于多模态大模型的识别器
pub struct LlmSolver {
    config: SolverConfig,
    http_client: Client,
}

impl LlmSolver {
    pub fn new(config: SolverConfig) -> Result<Self, SolverError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| SolverError::Unavailable(e.to_string()))?;
        Ok(Self {
            config,
            http_client,
        })
    }
}

#[async_trait]
impl CaptchaSolver for LlmSolver {
    async fn solve(&self, image: &str) -> Result<i64, SolverError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: CAPTCHA_PROMPT,
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: data_url(image),
                        },
                    },
                ],
            }],
            max_tokens: 100,
            temperature: 0.1,
            stream: false,
        };

        debug!("Calling captcha solver, model: {}", self.config.model);
        let response = self
            .http_client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SolverError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response".to_string());
            return Err(SolverError::Unavailable(format!("HTTP {}: {}", status, body)));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| SolverError::Unavailable(format!("Failed to parse response: {}", e)))?;

        let choice = chat.choices.into_iter().next().ok_or(SolverError::EmptyResponse)?;
        let content = choice.message.content.unwrap_or_default();
        debug!("Captcha solver replied: {}", content.trim());
        parse_answer(&content)
    }
}

/// 把图片包装为 data URL；已经是 data URL 时原样返回
pub fn data_url(image: &str) -> String {
    if image.starts_with("data:") {
        return image.to_string();
    }
    format!("data:{};base64,{}", sniff_mime(image), image)
}

fn sniff_mime(image: &str) -> &'static str {
    // 只需要文件头，截取 4 的整数倍长度避免填充错误
    let head: Vec<u8> = image
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .take(16)
        .collect();
    let usable = head.len() - head.len() % 4;
    match BASE64.decode(&head[..usable]) {
        Ok(bytes) if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) => "image/jpeg",
        Ok(bytes) if bytes.starts_with(b"GIF8") => "image/gif",
        Ok(bytes) if bytes.starts_with(b"RIFF") => "image/webp",
        _ => "image/png",
    }
}

/// 从模型输出中解析整数答案
///
/// 输出可能被 Markdown 代码块或说明文字包裹，取最外层的 `{...}`。
pub fn parse_answer(content: &str) -> Result<i64, SolverError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &content[s..=e],
        _ => {
            return Err(SolverError::MalformedAnswer(format!(
                "no JSON object in reply: {}",
                content.trim()
            )))
        }
    };

    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| SolverError::MalformedAnswer(format!("invalid JSON: {}", e)))?;

    let result = value.get("result").unwrap_or(&serde_json::Value::Null);
    let answer = match result {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                // i64::MAX as f64 是 2^63，需排除
                .filter(|f| f.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(f))
                .map(|f| f as i64)
        }),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    answer.ok_or_else(|| {
        let reason = value
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or("result is not an integer");
        SolverError::MalformedAnswer(format!("{} (result: {})", reason, result))
    })
}
