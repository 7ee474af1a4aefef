use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use argus_core::maintenance::run_sweeper;
use argus_core::PipelineConfig;
use argus_db::{Database, DatabaseConfig};
use argus_server::consumers::spawn_result_consumers;
use argus_server::routes;
use argus_server::state::AppState;

/// How often expired queue messages are purged.
const PURGE_INTERVAL: Duration = Duration::from_secs(600);
/// How often the stale-pending sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("argus=info".parse()?))
        .with_target(false)
        .init();

    let port = std::env::var("SERVER_PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{port}");

    let config = PipelineConfig::from_env()?;
    let db = Database::connect(&DatabaseConfig::from_env()?).await?;
    db.migrate().await?;

    let cancel = CancellationToken::new();
    let mut tasks = spawn_result_consumers(&db, config.max_retries, cancel.clone());

    let state = Arc::new(AppState::new(db.clone(), config.clone()));
    tasks.push(tokio::spawn(run_sweeper(
        state.maintenance.clone(),
        config.stale_timeout(),
        SWEEP_INTERVAL,
        cancel.clone(),
    )));
    tasks.push(tokio::spawn(run_queue_purge(db.clone(), cancel.clone())));

    let cors = match std::env::var("CORS_ORIGIN") {
        Ok(origin) if origin == "*" => CorsLayer::permissive(),
        Ok(origin) => {
            let origins: Vec<HeaderValue> = origin
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            CorsLayer::new().allow_origin(AllowOrigin::list(origins))
        }
        Err(_) => CorsLayer::new(),
    };

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    tracing::info!("Starting control plane on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let the consumers settle their in-flight deliveries before exit.
    cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }

    Ok(())
}

async fn run_queue_purge(db: Database, cancel: CancellationToken) {
    let bus = db.queue_bus();
    loop {
        tokio::select! {
            () = tokio::time::sleep(PURGE_INTERVAL) => {}
            () = cancel.cancelled() => break,
        }
        if let Err(e) = bus.purge_expired().await {
            tracing::error!(error = %e, "Queue purge failed");
        }
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    tracing::info!("Shutdown signal received");
}
