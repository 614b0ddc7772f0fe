//! Rights keeper daemon

use rights_core::{clock::SystemClock, escrow::PayoutJournal, RightsService};
use rights_keeper::{event_log, Config, UpkeepScheduler};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting rights keeper");

    let config = Config::from_env()?;

    let service = RightsService::open(
        config.registry.clone(),
        Arc::new(SystemClock),
        Arc::new(PayoutJournal::new()),
    )?;
    tracing::info!(
        data_dir = ?config.registry.data_dir,
        interval_secs = config.interval_secs,
        "Registry opened"
    );

    let event_task = tokio::spawn(event_log::follow_events(service.handle().subscribe()));

    let scheduler = Arc::new(UpkeepScheduler::from_config(
        service.handle().clone(),
        &config,
    ));
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(scheduler.clone().start(stop_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down rights keeper");

    stop_tx.send(true)?;
    task.await?;

    let stats = scheduler.stats().await;
    tracing::info!(
        ticks = stats.ticks,
        sweeps = stats.sweeps,
        licenses_removed = stats.licenses_removed,
        "Scheduler totals"
    );
    // Last handle clone outside the service; the event log ends once all are gone
    drop(scheduler);

    service.shutdown().await?;
    let logged = event_task.await?;
    tracing::info!(logged, "Event log closed");
    Ok(())
}
