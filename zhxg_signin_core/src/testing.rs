//! 单元测试辅助：按脚本应答的 mock

use crate::captcha::MockCaptchaSolver;
use crate::client::{MockGateway, RawResponse};
use crate::error::{Result, SolverError};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// (期望的 action, 应答)
pub type Script = Vec<(&'static str, Result<RawResponse>)>;

/// 记录 mock 收到的请求体与 token 设置
#[derive(Clone, Default)]
pub struct Recorder {
    bodies: Arc<Mutex<Vec<Value>>>,
    tokens: Arc<Mutex<Vec<Option<String>>>>,
}

impl Recorder {
    pub fn bodies(&self) -> Vec<Value> {
        self.bodies.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.bodies()
            .iter()
            .map(|b| b.get("action").and_then(Value::as_str).unwrap_or_default().to_string())
            .collect()
    }

    pub fn tokens(&self) -> Vec<Option<String>> {
        self.tokens.lock().unwrap().clone()
    }
}

/// 按顺序应答的 gateway；收到脚本之外的请求时 panic
pub fn scripted_gateway(script: Script) -> (MockGateway, Recorder) {
    let recorder = Recorder::default();
    let queue = Arc::new(Mutex::new(VecDeque::from(script)));

    let mut gateway = MockGateway::new();
    let bodies = recorder.bodies.clone();
    gateway.expect_post().returning(move |_path, body| {
        let action = body
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        bodies.lock().unwrap().push(body.clone());

        let (expected, reply) = queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected request: {}", action));
        assert_eq!(expected, action, "request out of order");
        reply
    });

    let tokens = recorder.tokens.clone();
    gateway
        .expect_set_token()
        .returning(move |token| tokens.lock().unwrap().push(token));

    (gateway, recorder)
}

/// 按顺序给出答案的识别器
pub fn scripted_solver(answers: Vec<std::result::Result<i64, SolverError>>) -> MockCaptchaSolver {
    let queue = Arc::new(Mutex::new(VecDeque::from(answers)));
    let mut solver = MockCaptchaSolver::new();
    solver.expect_solve().returning(move |_| {
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected solve call"))
    });
    solver
}

pub fn envelope(code: i64) -> RawResponse {
    RawResponse::ok(format!(r#"{{"code":{},"message":"m"}}"#, code))
}

pub fn captcha() -> RawResponse {
    RawResponse::ok(r#"{"code":0,"verification_id":"v-1","verification_image":"iVBORw0KGgo="}"#)
}

pub fn pending(records: &[(i64, &str, i64)]) -> RawResponse {
    let list: Vec<Value> = records
        .iter()
        .map(|(id, category, batch)| {
            serde_json::json!({ "id": id, "signin_type_name": category, "batch": batch })
        })
        .collect();
    let body = serde_json::json!({ "code": 0, "message": "ok", "result": { "list": list } });
    RawResponse::ok(body.to_string())
}
