#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use application::{
    ActivityLogQueue, ActivityLogSink, ActivityQueueConfig, BootstrapSettings, Clock,
    PasswordHasher, SystemClock,
};
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use config::{AppConfig, StorageBackend};
use infrastructure::{BcryptPasswordHasher, Repositories};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use web_api::{router, AppState};

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin123";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    cancel: CancellationToken,
    worker: JoinHandle<()>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestApp {
    /// 内存存储 + 默认企业与管理员 + 已启动的活动日志写入任务
    pub async fn spawn() -> Self {
        Self::spawn_with(AppConfig::default()).await
    }

    pub async fn spawn_with(mut config: AppConfig) -> Self {
        config.database.backend = StorageBackend::Memory;
        let repositories = Repositories::in_memory();
        let password_hasher: Arc<dyn PasswordHasher> =
            Arc::new(BcryptPasswordHasher::new(Some(4)));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let (queue, worker) = ActivityLogQueue::channel(ActivityQueueConfig {
            capacity: 1_000,
            retry_delay: Duration::from_millis(10),
            max_attempts: 3,
        });

        let state = AppState::new(config, repositories, password_hasher, clock, queue);
        state
            .data_initializer()
            .run(Some(&BootstrapSettings {
                company_name: "默认企业".into(),
                company_code: "default".into(),
                admin_username: ADMIN_USERNAME.into(),
                admin_password: ADMIN_PASSWORD.into(),
                admin_email: None,
            }))
            .await
            .expect("bootstrap");

        let cancel = CancellationToken::new();
        let sink: Arc<dyn ActivityLogSink> = state.activity_log_service.clone();
        let worker = worker.spawn(sink, cancel.clone());

        Self {
            router: router(state.clone()),
            state,
            cancel,
            worker,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.expect("request");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(request("GET", uri, token, None)).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.send(request("POST", uri, token, Some(body))).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.send(request("PUT", uri, token, Some(body))).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(request("DELETE", uri, token, None)).await
    }

    /// 登录并返回令牌
    pub async fn login(&self, username: &str, password: &str) -> String {
        let response = self
            .post(
                "/api/auth/login",
                None,
                json!({"username": username, "password": password}),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "login failed: {}", response.body);
        response.body["data"]["token"]
            .as_str()
            .expect("token in login response")
            .to_owned()
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_USERNAME, ADMIN_PASSWORD).await
    }

    /// 由管理员在默认企业下创建一个没有任何角色的成员并登录
    pub async fn member_token(&self, admin_token: &str, username: &str) -> (String, String) {
        let created = self
            .post(
                "/api/user",
                Some(admin_token),
                json!({"username": username, "password": "member123"}),
            )
            .await;
        assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
        let id = created.body["data"]["id"]
            .as_str()
            .expect("user id")
            .to_owned();
        (self.login(username, "member123").await, id)
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.worker.await.expect("worker join");
    }
}

pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}
