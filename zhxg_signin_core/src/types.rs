//! 数据类型定义
//!
//! 请求体和各接口的响应体。所有响应共享 `code` / `message` 信封，
//! 每次调用只解码一次为对应的 [`ApiResponse`]。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 业务成功码
pub const CODE_OK: i64 = 0;

/// 用户名或密码错误
pub const CODE_BAD_CREDENTIALS: i64 = 1002;

/// 优先选择的签到类别（实习签到）
pub const INTERNSHIP_CATEGORY: &str = "实习签到";

/// 登录凭据
#[derive(Clone, Default, Deserialize)]
pub struct Credential {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// 会话信息
///
/// 登录成功后整体替换，不做部分更新。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
}

/// 签到地理位置
///
/// 坐标与地址描述随每个带位置的请求原样提交。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Geolocation {
    pub longitude: f64,
    pub latitude: f64,
    pub address: String,
    pub street: String,
    pub district: String,
    pub city: String,
    pub province: String,
}

impl Default for Geolocation {
    fn default() -> Self {
        Self {
            longitude: 121.533_04,
            latitude: 38.884_76,
            address: "辽宁省大连市甘井子区软件园路8号".to_string(),
            street: "软件园路".to_string(),
            district: "甘井子区".to_string(),
            city: "大连市".to_string(),
            province: "辽宁省".to_string(),
        }
    }
}

/// 统一 API 响应
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}

/// 无附加字段的响应
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Empty {}

/// 验证码响应
///
/// 验证码接口不保证返回 `code`，因此单独建模。
#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaReply {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub verification_id: String,
    #[serde(default)]
    pub verification_image: String,
}

/// 验证码挑战
#[derive(Debug, Clone)]
pub struct CaptchaChallenge {
    pub id: String,
    /// base64 编码的算式图片
    pub image: String,
}

/// 登录请求
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub action: &'static str,
    pub verification_id: &'a str,
    pub verification_image: &'a str,
    pub verification_answer: String,
    pub login_name: &'a str,
    pub password: &'a str,
    pub client_type: &'static str,
    pub client_ver: &'static str,
    pub client_extra: &'static str,
}

/// 未签到列表响应数据
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PendingList {
    #[serde(default)]
    pub result: Option<PendingPage>,
}

impl PendingList {
    pub fn into_records(self) -> Vec<PendingRecord> {
        self.result.map(|page| page.list).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PendingPage {
    #[serde(default)]
    pub list: Vec<PendingRecord>,
}

/// 待签到记录
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PendingRecord {
    pub id: i64,
    #[serde(default, rename = "signin_type_name")]
    pub category: String,
    #[serde(default)]
    pub batch: i64,
}

/// 进入 / 确认签到请求
#[derive(Debug, Clone, Serialize)]
pub struct StepRequest {
    pub action: &'static str,
    pub id: i64,
    pub batch: i64,
}

/// 提交位置请求，`location` 为序列化后的 [`LocationPayload`]
#[derive(Debug, Clone, Serialize)]
pub struct LocationRequest {
    pub action: &'static str,
    pub id: i64,
    pub batch: i64,
    pub outside_flag: i32,
    pub location: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationPayload<'a> {
    pub lng: f64,
    pub lat: f64,
    pub address: &'a str,
    #[serde(rename = "addressComponent")]
    pub address_component: AddressComponent<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddressComponent<'a> {
    pub street: &'a str,
    pub district: &'a str,
    pub city: &'a str,
    pub province: &'a str,
}

impl<'a> From<&'a Geolocation> for LocationPayload<'a> {
    fn from(geo: &'a Geolocation) -> Self {
        Self {
            lng: geo.longitude,
            lat: geo.latitude,
            address: &geo.address,
            address_component: AddressComponent {
                street: &geo.street,
                district: &geo.district,
                city: &geo.city,
                province: &geo.province,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_with_list_payload() {
        let body = r#"{"code":0,"message":"ok","result":{"list":[
            {"id":11,"signin_type_name":"日常签到","batch":2},
            {"id":12,"signin_type_name":"实习签到","batch":5}
        ]}}"#;
        let resp: ApiResponse<PendingList> = serde_json::from_str(body).unwrap();
        assert!(resp.is_ok());
        let records = resp.data.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].category, INTERNSHIP_CATEGORY);
        assert_eq!(records[1].batch, 5);
    }

    #[test]
    fn test_failed_envelope_without_payload() {
        let body = r#"{"code":401,"message":"未登录","result":null}"#;
        let resp: ApiResponse<PendingList> = serde_json::from_str(body).unwrap();
        assert!(!resp.is_ok());
        assert!(resp.data.into_records().is_empty());

        let resp: ApiResponse<Empty> = serde_json::from_str(r#"{"code":3}"#).unwrap();
        assert_eq!(resp.code, 3);
        assert!(resp.message.is_empty());
    }

    #[test]
    fn test_location_payload_shape() {
        let geo = Geolocation::default();
        let value = serde_json::to_value(LocationPayload::from(&geo)).unwrap();
        assert_eq!(value["addressComponent"]["city"], "大连市");
        assert_eq!(value["lng"], geo.longitude);
    }

    #[test]
    fn test_credential_debug_masks_password() {
        let cred = Credential::new("20210001", "hunter2");
        let dbg = format!("{:?}", cred);
        assert!(dbg.contains("20210001"));
        assert!(!dbg.contains("hunter2"));
    }
}
