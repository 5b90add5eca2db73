//! 统一响应信封

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::trace::TraceId;

pub const SUCCESS_CODE: &str = "SUCCESS";
const SUCCESS_MESSAGE: &str = "操作成功";

/// `{success, code, data, message, timestamp, traceId}`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub data: Option<T>,
    pub message: String,
    pub timestamp: String,
    pub trace_id: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self::build(true, SUCCESS_CODE, Some(data), SUCCESS_MESSAGE)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(false, code, None, message)
    }

    fn build(
        success: bool,
        code: impl Into<String>,
        data: Option<T>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success,
            code: code.into(),
            data,
            message: message.into(),
            timestamp: now_rfc3339(),
            trace_id: current_trace_id(),
        }
    }
}

impl ApiResponse<()> {
    /// 无数据的成功响应，例如删除
    pub fn done(message: impl Into<String>) -> Self {
        Self::build(true, SUCCESS_CODE, None, message)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// 判断 JSON 是否已经是信封结构，避免重复包装
pub fn is_envelope(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };
    matches!(object.get("success"), Some(Value::Bool(_)))
        && (object.contains_key("data")
            || object.contains_key("code")
            || object.contains_key("traceId"))
}

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 作用域外（例如单元测试直接调用处理器）时生成一个新的标识，保证非空
pub(crate) fn current_trace_id() -> String {
    TraceId::current()
        .unwrap_or_else(TraceId::generate)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_camel_case_fields() {
        let value = serde_json::to_value(ApiResponse::ok(json!({"n": 1}))).unwrap();
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["code"], json!(SUCCESS_CODE));
        assert_eq!(value["data"], json!({"n": 1}));
        assert!(value["traceId"].as_str().is_some_and(|id| !id.is_empty()));
        assert!(value["timestamp"].as_str().is_some_and(|ts| ts.ends_with('Z')));
    }

    #[test]
    fn envelope_detection() {
        assert!(is_envelope(&json!({"success": true, "data": {"n": 1}})));
        assert!(is_envelope(&json!({"success": false, "code": "X", "traceId": "t"})));
        assert!(!is_envelope(&json!({"success": "yes", "data": 1})));
        assert!(!is_envelope(&json!({"name": "foo"})));
        assert!(!is_envelope(&json!([1, 2])));
    }
}
