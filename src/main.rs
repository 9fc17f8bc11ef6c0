use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use service_health::{
    ChangeDetector, ChannelToastSink, HealthStore, HttpHealthCheck, MonitorConfig,
    NotificationDispatcher, Scheduler, SubscriptionHub,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting service health monitor...");

    let config = MonitorConfig::from_env()?;
    config.log_configuration();

    let store = Arc::new(HealthStore::new());
    let hub = Arc::new(SubscriptionHub::new(store.clone()));

    // The toast channel stands in for the console's toast UI; a drain task
    // logs whatever would be shown.
    let (sink, mut toast_rx) = ChannelToastSink::new(64);
    let notifier = Arc::new(NotificationDispatcher::new(
        Arc::new(sink),
        config.dedupe_window,
    ));
    tokio::spawn(async move {
        while let Some(toast) = toast_rx.recv().await {
            info!("[{}] [{}] {}", toast.severity, toast.target_key, toast.message);
        }
    });

    let detector = Arc::new(ChangeDetector::new(
        store.clone(),
        config.detector_policy(),
        notifier,
        hub.clone(),
    ));
    let port = Arc::new(HttpHealthCheck::new(
        config.check_timeout,
        config.provider_urls.clone(),
    )?);
    let scheduler = Scheduler::new(
        port,
        detector,
        store.clone(),
        config.check_timeout,
        config.max_backoff_multiplier,
    );

    for target in &config.targets {
        let interval = config.interval_for(&target.provider);
        scheduler.register(target.clone(), interval)?;
    }
    info!("Monitoring {} targets", config.targets.len());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    scheduler.shutdown();
    Ok(())
}
