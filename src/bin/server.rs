use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::signal;
use toolpass::{
    backend::{AppState, build_router},
    utils::config::AppConfig,
};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(log_dir: Option<&str>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("toolpass=info,tower_http=warn"));

    // JSON to stdout; a daily-rotated copy on disk when a directory is configured.
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "toolpass.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer.boxed()), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = AppConfig::load()?;
    let _log_guard = init_tracing(cfg.server.log_dir.as_deref());

    info!(
        port = cfg.server.port,
        backend = ?cfg.store.backend,
        protected_routes = cfg.guard.protected_routes.len(),
        "toolpass server starting"
    );

    let state = Arc::new(AppState::from_config(&cfg).await?);

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_millis(
            cfg.server.request_timeout_ms,
        )))
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", cfg.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            info!("Received shutdown signal");
        })
        .await?;

    info!("Shut down gracefully");
    Ok(())
}
