//! 请求级追踪标识
//!
//! 每个请求生成一个 UUID，保存在 tokio task-local 中，响应信封和错误体都从这里读取。
//! task-local 不会跨 `tokio::spawn` 传播，需要时用 [`TraceId::scope`] 包裹新任务。

use std::fmt;
use std::future::Future;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tokio::task_local;
use uuid::Uuid;

pub const TRACE_ID_HEADER: HeaderName = HeaderName::from_static("x-trace-id");

task_local! {
    static TRACE_ID: TraceId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceId(Uuid);

impl TraceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// 当前作用域内的追踪标识
    pub fn current() -> Option<Self> {
        TRACE_ID.try_with(|id| *id).ok()
    }

    pub async fn scope<Fut>(trace_id: TraceId, fut: Fut) -> Fut::Output
    where
        Fut: Future,
    {
        TRACE_ID.scope(trace_id, fut).await
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 为请求分配追踪标识，并在响应头 `x-trace-id` 中返回
pub async fn trace_id(req: Request, next: Next) -> Response {
    let trace_id = TraceId::generate();
    let mut response = TraceId::scope(trace_id, next.run(req)).await;
    if let Ok(value) = HeaderValue::from_str(&trace_id.to_string()) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scope_exposes_current_id() {
        assert_eq!(TraceId::current(), None);
        let id = TraceId::generate();
        let observed = TraceId::scope(id, async { TraceId::current() }).await;
        assert_eq!(observed, Some(id));
    }
}
