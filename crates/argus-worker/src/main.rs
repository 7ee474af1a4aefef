use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use argus_browser::ChromiumEngine;
use argus_core::attempt::{RequestHandler, ScrapeWorker};
use argus_core::bus::run_consumer;
use argus_core::messages::Queue;
use argus_core::ScraperConfig;
use argus_db::{Database, DatabaseConfig};

/// Idle poll interval for request consumers.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("argus=info".parse()?))
        .with_target(false)
        .init();

    let config = ScraperConfig::from_env()?;
    let db = Database::connect(&DatabaseConfig::from_env()?).await?;
    db.migrate().await?;

    tracing::info!(
        concurrent_scrapers = config.concurrent_scrapers,
        wait_strategy = config.wait_strategy.as_str(),
        nav_timeout_ms = config.nav_timeout_ms,
        "Launching browser"
    );
    let engine = ChromiumEngine::launch(config.clone()).await?;
    let worker = ScrapeWorker::new(engine, db.queue_bus(), config.user_agent.clone());

    // One consumer loop per concurrent page. Each loop holds at most one
    // unacknowledged request, so the queue itself throttles in-flight work
    // to the configured concurrency — no in-process scheduler needed.
    let cancel = CancellationToken::new();
    let mut loops = Vec::with_capacity(config.concurrent_scrapers);
    for n in 0..config.concurrent_scrapers {
        loops.push(tokio::spawn(run_consumer(
            db.queue_bus(),
            Queue::Requests,
            format!("scraper-{n}"),
            POLL_INTERVAL,
            cancel.clone(),
            RequestHandler(worker.clone()),
        )));
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    cancel.cancel();
    for task in loops {
        let _ = task.await;
    }

    Ok(())
}
