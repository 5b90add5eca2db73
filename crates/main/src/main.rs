//! 主应用程序入口
//!
//! 加载配置、装配存储与用例服务，启动活动日志写入任务和 Axum Web API 服务。

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    ActivityLogQueue, ActivityLogSink, ActivityQueueConfig, BootstrapSettings, Clock,
    PasswordHasher, SystemClock,
};
use config::{AppConfig, BootstrapConfig, LogFormat};
use infrastructure::Infrastructure;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(config.server.log_format);

    for warning in config.production_warnings() {
        tracing::warn!("{warning}");
    }
    tracing::info!(config = %config.sanitize(), "配置加载完成");

    let infrastructure = Infrastructure::connect(&config.database, config.server.bcrypt_cost).await?;
    let password_hasher: Arc<dyn PasswordHasher> = infrastructure.password_hasher.clone();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (queue, worker) = ActivityLogQueue::channel(queue_config(&config));
    let bootstrap = bootstrap_settings(&config.bootstrap);
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = AppState::new(
        config,
        infrastructure.repositories,
        password_hasher,
        clock,
        queue,
    );

    state.data_initializer().run(bootstrap.as_ref()).await?;

    let cancel = CancellationToken::new();
    let sink: Arc<dyn ActivityLogSink> = state.activity_log_service.clone();
    let worker = worker.spawn(sink, cancel.clone());

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("平台服务启动在 http://{addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // 停止接收请求后把队列中剩余的日志写完
    cancel.cancel();
    if let Err(err) = worker.await {
        tracing::error!(error = %err, "活动日志写入任务异常退出");
    }
    tracing::info!("服务已停止");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,web_api=debug,application=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn queue_config(config: &AppConfig) -> ActivityQueueConfig {
    ActivityQueueConfig {
        capacity: config.activity_log.queue_capacity,
        retry_delay: Duration::from_millis(config.activity_log.retry_delay_ms),
        max_attempts: config.activity_log.max_attempts,
    }
}

fn bootstrap_settings(config: &BootstrapConfig) -> Option<BootstrapSettings> {
    config.enabled.then(|| BootstrapSettings {
        company_name: config.company_name.clone(),
        company_code: config.company_code.clone(),
        admin_username: config.admin_username.clone(),
        admin_password: config.admin_password.clone(),
        admin_email: config.admin_email.clone(),
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听停止信号");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到停止信号，开始优雅关闭");
}
