//! 活动日志采集中间件
//!
//! 请求完成后在当前任务里提取日志字段，再非阻塞地交给 [`ActivityLogQueue`]，
//! 不等待写入结果。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use application::ActivityLogQueue;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::USER_AGENT, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use config::ActivityLogConfig;
use domain::HttpRequestRecord;

use crate::auth::CurrentUser;

/// 内置的不记录路径前缀
pub const DEFAULT_EXCLUDED_PATHS: [&str; 7] = [
    "/health",
    "/openapi",
    "/api/openapi",
    "/scalar/",
    "/metrics",
    "/_framework/",
    "/favicon.ico",
];

#[derive(Clone)]
pub struct ActivityRecorder {
    queue: ActivityLogQueue,
    settings: Arc<RecorderSettings>,
}

struct RecorderSettings {
    enabled: bool,
    excluded_paths: Vec<String>,
    include_anonymous: bool,
    include_query_string: bool,
    max_query_string_length: usize,
}

impl ActivityRecorder {
    pub fn new(queue: ActivityLogQueue, config: &ActivityLogConfig) -> Self {
        let excluded_paths = DEFAULT_EXCLUDED_PATHS
            .iter()
            .map(|p| p.to_string())
            .chain(config.excluded_paths.iter().cloned())
            .map(|p| p.to_lowercase())
            .collect();
        Self {
            queue,
            settings: Arc::new(RecorderSettings {
                enabled: config.enabled,
                excluded_paths,
                include_anonymous: config.include_anonymous,
                include_query_string: config.include_query_string,
                max_query_string_length: config.max_query_string_length,
            }),
        }
    }

    fn records(&self, path: &str) -> bool {
        let path = path.to_lowercase();
        self.settings.enabled
            && !self
                .settings
                .excluded_paths
                .iter()
                .any(|p| path.starts_with(p.as_str()))
    }

    fn query_string(&self, query: Option<&str>) -> Option<String> {
        if !self.settings.include_query_string {
            return None;
        }
        let query = query.filter(|q| !q.is_empty())?;
        let max = self.settings.max_query_string_length;
        if query.chars().count() > max {
            Some(format!("{}...", query.chars().take(max).collect::<String>()))
        } else {
            Some(query.to_owned())
        }
    }
}

/// 客户端地址：`X-Forwarded-For` 首项，其次 `X-Real-IP`，最后是连接对端地址
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    header("x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(|first| first.trim().to_owned())
        .filter(|first| !first.is_empty())
        .or_else(|| header("x-real-ip").map(str::to_owned))
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

pub async fn record_activity(
    State(recorder): State<ActivityRecorder>,
    req: Request,
    next: Next,
) -> Response {
    if !recorder.records(req.uri().path()) {
        return next.run(req).await;
    }

    let started = Instant::now();
    let http_method = req.method().to_string();
    let path = req.uri().path().to_owned();
    let query_string = recorder.query_string(req.uri().query());
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip_address = client_ip(req.headers(), peer);
    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let response = next.run(req).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    let user = response.extensions().get::<CurrentUser>().cloned();
    if user.is_none() && !recorder.settings.include_anonymous {
        return response;
    }

    recorder.queue.enqueue(HttpRequestRecord {
        user_id: user.as_ref().map(|u| u.user_id),
        username: user.map(|u| u.username),
        http_method,
        path,
        query_string,
        status_code: response.status().as_u16(),
        duration_ms,
        ip_address,
        user_agent,
        occurred_at: Utc::now(),
    });
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use application::{ActivityLogSink, ActivityQueueConfig, ApplicationError};
    use async_trait::async_trait;
    use axum::{
        body::Body, http::StatusCode, middleware, routing::get, Extension, Router,
    };
    use domain::UserId;
    use tokio::sync::Mutex;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<HttpRequestRecord>>,
    }

    #[async_trait]
    impl ActivityLogSink for RecordingSink {
        async fn persist(&self, record: &HttpRequestRecord) -> Result<(), ApplicationError> {
            self.records.lock().await.push(record.clone());
            Ok(())
        }
    }

    fn config() -> ActivityLogConfig {
        ActivityLogConfig {
            max_query_string_length: 8,
            ..ActivityLogConfig::default()
        }
    }

    fn app(queue: ActivityLogQueue, config: &ActivityLogConfig) -> Router {
        let user = CurrentUser {
            user_id: UserId::generate(),
            username: "alice".into(),
            company_id: None,
        };
        Router::new()
            .route(
                "/api/role",
                get(move || {
                    let user = user.clone();
                    async move { (Extension(user), "ok") }
                }),
            )
            .route("/api/public", get(|| async { "ok" }))
            .route("/health", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                ActivityRecorder::new(queue, config),
                record_activity,
            ))
    }

    async fn run(config: ActivityLogConfig, requests: Vec<Request>) -> Vec<HttpRequestRecord> {
        let (queue, worker) = ActivityLogQueue::channel(ActivityQueueConfig {
            capacity: 16,
            retry_delay: Duration::from_millis(1),
            max_attempts: 1,
        });
        let sink = Arc::new(RecordingSink::default());
        let cancel = CancellationToken::new();
        let handle = worker.spawn(sink.clone(), cancel.clone());

        let router = app(queue, &config);
        for request in requests {
            let response = router.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        cancel.cancel();
        handle.await.unwrap();
        let records = sink.records.lock().await.clone();
        records
    }

    fn request(uri: &str) -> Request {
        Request::builder()
            .uri(uri)
            .header("x-forwarded-for", "10.0.0.1, 10.0.0.2")
            .header("user-agent", "unit-test")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn authenticated_request_is_recorded() {
        let records = run(config(), vec![request("/api/role?page=1&pageSize=20")]).await;
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.username.as_deref(), Some("alice"));
        assert_eq!(record.http_method, "GET");
        assert_eq!(record.path, "/api/role");
        assert_eq!(record.query_string.as_deref(), Some("page=1&p..."));
        assert_eq!(record.status_code, 200);
        assert_eq!(record.ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(record.user_agent.as_deref(), Some("unit-test"));
    }

    #[tokio::test]
    async fn anonymous_and_excluded_requests_are_skipped_by_default() {
        let records = run(config(), vec![request("/api/public"), request("/health")]).await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn anonymous_requests_recorded_when_enabled() {
        let config = ActivityLogConfig {
            include_anonymous: true,
            ..config()
        };
        let records = run(config, vec![request("/api/public"), request("/health")]).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_id, None);
        assert_eq!(records[0].path, "/api/public");
    }

    #[test]
    fn client_ip_fallbacks() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "192.168.1.9:5000".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("192.168.1.9"));
        headers.insert("x-real-ip", "172.16.0.3".parse().unwrap());
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("172.16.0.3"));
        headers.insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("203.0.113.7"));
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }
}
