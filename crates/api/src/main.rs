use std::net::SocketAddr;

use anyhow::Context;

use habbot_api::app;
use habbot_api::config::AppConfig;
use habbot_observability::{LogLevel, LogType, LoggerOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    habbot_observability::init();

    let config = AppConfig::from_env()?;
    let (router, services) = app::build_app(&config).await?;

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    let local = listener.local_addr()?;

    services
        .logs()
        .get_logger("BackendApp", LoggerOptions::non_request())
        .record(LogLevel::Info, format!("Backend app started on {local}"))
        .log_type(LogType::Startup)
        .extra_details(format!("environment: {}", config.environment))
        .emit();
    tracing::info!(%local, environment = %config.environment, "listening");

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    services.logs().shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for shutdown signal");
    }
}
