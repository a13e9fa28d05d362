use std::sync::Arc;

use leasekeep_api::app::{build_app, services::build_services};
use leasekeep_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loads `.env` before the subscriber reads LOG_FORMAT.
    let config = AppConfig::from_env();
    leasekeep_observability::init();
    let config = config?;

    let cron_secret = config.require_cron_secret()?.to_string();
    let services = Arc::new(build_services(&config).await?);
    let app = build_app(services.clone(), cron_secret);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    services.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received; draining connections");
}
