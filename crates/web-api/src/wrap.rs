//! 成功响应自动包装
//!
//! 2xx 且 `Content-Type: application/json` 的响应体被包进 [`ApiResponse`]。
//! 已是信封的响应、排除路径、`stream=true` 请求以及非 JSON 响应原样透传。

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use config::ResponseConfig;
use serde_json::Value;

use crate::{
    envelope::{is_envelope, ApiResponse},
    error::ApiError,
};

/// 内置的不包装路径前缀
pub const DEFAULT_EXCLUDED_PATHS: [&str; 5] =
    ["/health", "/healthz", "/openapi", "/metrics", "/favicon.ico"];

const MAX_WRAPPED_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct ResponseWrapping {
    excluded_paths: Arc<[String]>,
}

impl ResponseWrapping {
    pub fn new(config: &ResponseConfig) -> Self {
        let excluded_paths = DEFAULT_EXCLUDED_PATHS
            .iter()
            .map(|p| p.to_string())
            .chain(config.excluded_paths.iter().cloned())
            .map(|p| p.to_lowercase())
            .collect();
        Self { excluded_paths }
    }

    fn skips(&self, path: &str, query: Option<&str>) -> bool {
        let path = path.to_lowercase();
        self.excluded_paths.iter().any(|p| path.starts_with(p.as_str()))
            || query.is_some_and(requests_stream)
    }
}

fn requests_stream(query: &str) -> bool {
    query
        .split('&')
        .any(|pair| pair.eq_ignore_ascii_case("stream=true"))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().starts_with("application/json"))
}

pub async fn wrap_response(
    State(wrapping): State<ResponseWrapping>,
    req: Request,
    next: Next,
) -> Response {
    if wrapping.skips(req.uri().path(), req.uri().query()) {
        return next.run(req).await;
    }

    let response = next.run(req).await;
    if !response.status().is_success() || !is_json(response.headers()) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_WRAPPED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => return ApiError::internal_server_error(err).into_response(),
    };

    let data = if bytes.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) if !is_envelope(&value) => value,
            _ => return Response::from_parts(parts, Body::from(bytes)),
        }
    };

    match serde_json::to_vec(&ApiResponse::ok(data)) {
        Ok(wrapped) => {
            parts.headers.remove(CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(wrapped))
        }
        Err(err) => ApiError::internal_server_error(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{header, StatusCode},
        middleware,
        routing::get,
        Json, Router,
    };
    use serde_json::json;
    use tower::ServiceExt;

    fn app() -> Router {
        let wrapping = ResponseWrapping::new(&ResponseConfig {
            excluded_paths: vec!["/api/raw".into()],
        });
        Router::new()
            .route("/api/demo", get(|| async { Json(json!({"name": "foo"})) }))
            .route(
                "/api/created",
                get(|| async { (StatusCode::CREATED, Json(json!({"id": 1}))) }),
            )
            .route(
                "/api/wrapped",
                get(|| async { Json(json!({"success": true, "data": {"n": 1}})) }),
            )
            .route(
                "/api/sse",
                get(|| async { ([(header::CONTENT_TYPE, "text/event-stream")], "data: message\n\n") }),
            )
            .route("/api/raw", get(|| async { Json(json!({"ok": true})) }))
            .route("/openapi", get(|| async { Json(json!({"ok": true})) }))
            .route(
                "/api/missing",
                get(|| async { (StatusCode::NOT_FOUND, Json(json!({"reason": "gone"}))) }),
            )
            .layer(middleware::from_fn_with_state(wrapping, wrap_response))
    }

    async fn get_body(uri: &str) -> (StatusCode, String) {
        let response = app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn json_success_is_wrapped() {
        let (status, body) = get_body("/api/demo").await;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["data"], json!({"name": "foo"}));
        assert!(value["traceId"].as_str().is_some());
    }

    #[tokio::test]
    async fn status_code_is_preserved() {
        let (status, body) = get_body("/api/created").await;
        assert_eq!(status, StatusCode::CREATED);
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["data"], json!({"id": 1}));
    }

    #[tokio::test]
    async fn envelopes_are_not_wrapped_twice() {
        let (_, body) = get_body("/api/wrapped").await;
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value, json!({"success": true, "data": {"n": 1}}));
    }

    #[tokio::test]
    async fn passthrough_cases() {
        assert_eq!(get_body("/api/sse").await.1, "data: message\n\n");
        assert_eq!(get_body("/api/raw").await.1, r#"{"ok":true}"#);
        assert_eq!(get_body("/openapi").await.1, r#"{"ok":true}"#);
        assert_eq!(get_body("/api/demo?stream=true").await.1, r#"{"name":"foo"}"#);
        assert_eq!(get_body("/api/missing").await.1, r#"{"reason":"gone"}"#);
    }
}
