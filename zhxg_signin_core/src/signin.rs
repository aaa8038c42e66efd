//! 签到事务
//!
//! 获取未签到列表 → 选择记录 → 进入签到 → 提交位置 → 确认签到。
//! 每一步只发一次请求，任何一步失败都会终止整个事务，由调用方决定下次何时再试。

use crate::client::Gateway;
use crate::error::{Error, Result};
use crate::types::*;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn, Instrument, Span};

/// 签到接口
pub const SIGNIN_PATH: &str = "/dnui/api/student/signin/signin.api";

/// 提交位置时固定的范围外标记
pub const OUTSIDE_FLAG: i32 = 0;

/// 事务结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigninOutcome {
    /// 没有待签到记录
    NothingPending,
    /// 已完成签到
    Completed { record: PendingRecord },
}

/// 按优先级选择待签到记录
///
/// 第一条类别为 [`INTERNSHIP_CATEGORY`] 的记录优先；否则退回列表第一条。
/// 退回规则是经验做法，待签到类别混杂的账号可能选错，因此会记录警告。
pub fn select_record(records: &[PendingRecord]) -> Option<&PendingRecord> {
    if let Some(record) = records.iter().find(|r| r.category == INTERNSHIP_CATEGORY) {
        return Some(record);
    }
    let first = records.first()?;
    warn!(
        id = first.id,
        category = %first.category,
        "No {} record found, falling back to the first pending record",
        INTERNSHIP_CATEGORY
    );
    Some(first)
}

/// 签到事务，要求 gateway 上已设置有效 token
pub struct SigninTransaction<'a, G> {
    gateway: &'a G,
    location: &'a Geolocation,
    span: Span,
}

impl<'a, G: Gateway> SigninTransaction<'a, G> {
    pub fn new(gateway: &'a G, location: &'a Geolocation, span: Span) -> Self {
        Self {
            gateway,
            location,
            span,
        }
    }

    /// 执行完整签到流程
    pub async fn execute(&self) -> Result<SigninOutcome> {
        async {
            let records = self.list_pending().await.map_err(|e| Error::ListFailed(Box::new(e)))?;
            if records.is_empty() {
                info!("No pending sign-in records");
                return Ok(SigninOutcome::NothingPending);
            }

            let record = match select_record(&records) {
                Some(record) => record.clone(),
                None => return Ok(SigninOutcome::NothingPending),
            };
            info!(
                id = record.id,
                batch = record.batch,
                category = %record.category,
                "Selected sign-in record"
            );

            self.step(&StepRequest {
                action: "getSigninDetails",
                id: record.id,
                batch: record.batch,
            })
            .await
            .map_err(|e| Error::EnterFailed(Box::new(e)))?;
            info!(id = record.id, "Entered sign-in");

            self.submit_location(&record)
                .await
                .map_err(|e| Error::LocationSubmitFailed(Box::new(e)))?;
            info!(id = record.id, "Location submitted");

            let message = self
                .step(&StepRequest {
                    action: "getSigninSuccess",
                    id: record.id,
                    batch: record.batch,
                })
                .await
                .map_err(|e| Error::ConfirmFailed(Box::new(e)))?;
            info!(id = record.id, message = %message, "Sign-in confirmed");

            Ok(SigninOutcome::Completed { record })
        }
        .instrument(self.span.clone())
        .await
    }

    async fn list_pending(&self) -> Result<Vec<PendingRecord>> {
        let raw = self
            .gateway
            .post(
                SIGNIN_PATH,
                json!({ "action": "getUnSigninList", "pageSize": 10, "pageNum": 1 }),
            )
            .await?;
        let resp: ApiResponse<PendingList> = raw.decode()?;
        ensure_ok(&resp)?;
        let records = resp.data.into_records();
        info!(count = records.len(), "Fetched pending sign-in records");
        Ok(records)
    }

    async fn submit_location(&self, record: &PendingRecord) -> Result<String> {
        let location = serde_json::to_string(&LocationPayload::from(self.location))
            .map_err(|e| Error::Protocol(format!("Failed to encode location: {}", e)))?;
        self.step(&LocationRequest {
            action: "updateLocationSignin",
            id: record.id,
            batch: record.batch,
            outside_flag: OUTSIDE_FLAG,
            location,
        })
        .await
    }

    /// 发送一步请求，成功时返回服务端消息
    async fn step<T: Serialize>(&self, request: &T) -> Result<String> {
        let body = serde_json::to_value(request)
            .map_err(|e| Error::Protocol(format!("Failed to encode request: {}", e)))?;
        let raw = self.gateway.post(SIGNIN_PATH, body).await?;
        let resp: ApiResponse<Empty> = raw.decode()?;
        ensure_ok(&resp)?;
        Ok(resp.message)
    }
}

fn ensure_ok<T>(resp: &ApiResponse<T>) -> Result<()> {
    if resp.is_ok() {
        Ok(())
    } else {
        Err(Error::Api {
            code: resp.code,
            message: resp.message.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RawResponse;
    use crate::testing::*;

    fn record(id: i64, category: &str, batch: i64) -> PendingRecord {
        PendingRecord {
            id,
            category: category.to_string(),
            batch,
        }
    }

    #[test]
    fn test_select_prefers_first_internship_record() {
        let records = vec![
            record(1, "日常签到", 1),
            record(2, INTERNSHIP_CATEGORY, 7),
            record(3, INTERNSHIP_CATEGORY, 9),
        ];
        assert_eq!(select_record(&records).unwrap().id, 2);
    }

    #[test]
    fn test_select_falls_back_to_first_record() {
        // 没有实习签到时退回第一条（经验规则）
        let records = vec![record(4, "日常签到", 1), record(5, "晚归签到", 2)];
        assert_eq!(select_record(&records).unwrap().id, 4);
        assert!(select_record(&[]).is_none());
    }

    #[tokio::test]
    async fn test_empty_list_is_a_no_op() {
        let (gateway, rec) = scripted_gateway(vec![("getUnSigninList", Ok(pending(&[])))]);
        let geo = Geolocation::default();
        let outcome = SigninTransaction::new(&gateway, &geo, Span::none())
            .execute()
            .await
            .unwrap();
        assert_eq!(outcome, SigninOutcome::NothingPending);
        assert_eq!(rec.actions(), vec!["getUnSigninList"]);
    }

    #[tokio::test]
    async fn test_internship_record_used_in_all_steps() {
        let (gateway, rec) = scripted_gateway(vec![
            (
                "getUnSigninList",
                Ok(pending(&[(10, "日常签到", 1), (20, INTERNSHIP_CATEGORY, 3)])),
            ),
            ("getSigninDetails", Ok(envelope(0))),
            ("updateLocationSignin", Ok(envelope(0))),
            ("getSigninSuccess", Ok(envelope(0))),
        ]);
        let geo = Geolocation::default();
        let outcome = SigninTransaction::new(&gateway, &geo, Span::none())
            .execute()
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SigninOutcome::Completed {
                record: record(20, INTERNSHIP_CATEGORY, 3)
            }
        );

        let bodies = rec.bodies();
        for body in &bodies[1..] {
            assert_eq!(body["id"], 20);
            assert_eq!(body["batch"], 3);
        }

        let location = &bodies[2];
        assert_eq!(location["outside_flag"], OUTSIDE_FLAG);
        let embedded: serde_json::Value =
            serde_json::from_str(location["location"].as_str().unwrap()).unwrap();
        assert_eq!(embedded["lat"], geo.latitude);
        assert_eq!(embedded["addressComponent"]["province"], "辽宁省");
    }

    #[tokio::test]
    async fn test_list_failure() {
        let (gateway, _) = scripted_gateway(vec![("getUnSigninList", Ok(envelope(401)))]);
        let geo = Geolocation::default();
        let err = SigninTransaction::new(&gateway, &geo, Span::none())
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ListFailed(_)));
    }

    #[tokio::test]
    async fn test_enter_failure_aborts_transaction() {
        let (gateway, rec) = scripted_gateway(vec![
            ("getUnSigninList", Ok(pending(&[(1, "日常签到", 1)]))),
            ("getSigninDetails", Ok(envelope(3))),
        ]);
        let geo = Geolocation::default();
        let err = SigninTransaction::new(&gateway, &geo, Span::none())
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EnterFailed(_)));
        assert_eq!(rec.actions().len(), 2);
    }

    #[tokio::test]
    async fn test_location_transport_failure() {
        let (gateway, _) = scripted_gateway(vec![
            ("getUnSigninList", Ok(pending(&[(1, INTERNSHIP_CATEGORY, 1)]))),
            ("getSigninDetails", Ok(envelope(0))),
            ("updateLocationSignin", Err(Error::Network("timeout".to_string()))),
        ]);
        let geo = Geolocation::default();
        let err = SigninTransaction::new(&gateway, &geo, Span::none())
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LocationSubmitFailed(_)));
        assert_eq!(err.kind(), crate::error::ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_confirm_failure() {
        let (gateway, _) = scripted_gateway(vec![
            ("getUnSigninList", Ok(pending(&[(1, INTERNSHIP_CATEGORY, 1)]))),
            ("getSigninDetails", Ok(envelope(0))),
            ("updateLocationSignin", Ok(envelope(0))),
            ("getSigninSuccess", Ok(RawResponse::ok("not json"))),
        ]);
        let geo = Geolocation::default();
        let err = SigninTransaction::new(&gateway, &geo, Span::none())
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConfirmFailed(_)));
        assert_eq!(err.kind(), crate::error::ErrorKind::Protocol);
    }
}
