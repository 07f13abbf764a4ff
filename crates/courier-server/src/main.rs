mod config;

use tokio_util::sync::CancellationToken;
use tracing::info;

use courier_gateway::Supervisor;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "courier=info,courier_gateway=info,courier_transfer=info".into()
            }),
        )
        .init();

    let config = ServerConfig::from_env()?;
    info!(
        "Outbound queue {} frames, send timeout {} ms, max frame {} bytes",
        config.gateway.outbound_capacity,
        config.gateway.send_timeout.as_millis(),
        config.gateway.max_frame_size
    );

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!("Courier relay bound on {}", config.addr);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    Supervisor::new(config.gateway).run(listener, shutdown).await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
            },
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
