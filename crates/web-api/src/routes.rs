use axum::{
    extract::State,
    http::{HeaderValue, Method, Uri},
    middleware,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    activity::{record_activity, ActivityRecorder},
    activity_routes::activity_log_routes,
    auth::authenticate,
    auth_routes::auth_routes,
    company_routes::company_routes,
    envelope::now_rfc3339,
    error::ApiError,
    menu_routes::menu_routes,
    permission_routes::permission_routes,
    role_routes::role_routes,
    state::AppState,
    trace::trace_id,
    user_routes::user_routes,
    wrap::{wrap_response, ResponseWrapping},
};

/// 组装全部路由与全局中间件
///
/// 中间件由外到内：CORS、请求 span、追踪标识、活动日志、响应包装、认证。
pub fn router(state: AppState) -> Router {
    let wrapping = ResponseWrapping::new(&state.config.response);
    let recorder = ActivityRecorder::new(state.activity_queue.clone(), &state.config.activity_log);
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/health", get(health))
        .merge(auth_routes())
        .merge(company_routes(&state))
        .merge(user_routes(&state))
        .merge(role_routes(&state))
        .merge(menu_routes(&state))
        .merge(permission_routes(&state))
        .merge(activity_log_routes(&state))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .layer(middleware::from_fn_with_state(wrapping, wrap_response))
        .layer(middleware::from_fn_with_state(recorder, record_activity))
        .layer(middleware::from_fn(trace_id))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let queue = state.activity_queue.status();
    Json(json!({
        "status": "healthy",
        "timestamp": now_rfc3339(),
        "activityLogQueue": {
            "pending": queue.pending,
            "capacity": queue.capacity,
            "dropped": queue.dropped,
            "persisted": queue.persisted,
            "failed": queue.failed,
            "isRunning": queue.is_running,
        },
    }))
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("接口不存在: {}", uri.path()))
}
