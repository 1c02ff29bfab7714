use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use vitrine_control_service::build_router;
use vitrine_control_service::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("load service configuration")?;
    init_tracing(&config);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("bind {}", config.bind_addr))?;
    let local_addr = listener.local_addr().context("read bound address")?;

    tracing::info!(
        target: "vitrine.service",
        addr = %local_addr,
        platform_domains = ?config.platform_domains,
        domain_store = ?config.domain_store_path,
        fail_mode = %config.custom_domain_fail_mode,
        "vitrine control service listening",
    );

    let app = build_router(config);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve http")?;

    tracing::info!(target: "vitrine.service", "vitrine control service stopped");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(
            target: "vitrine.service",
            error = %error,
            "failed to listen for shutdown signal",
        );
        std::future::pending::<()>().await;
    }
}
