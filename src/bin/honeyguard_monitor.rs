use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use honeyguard::alerting::AlertDispatcher;
use honeyguard::client::HoneyGuardClient;
use honeyguard::config::Config;
use honeyguard::geo::MarkerBounds;
use honeyguard::models::{LogFilter, Scope};
use honeyguard::monitor::{start_location_polling, start_polling, PollHandle, PollOptions};
use honeyguard::notify::{FanOut, LogSink, NotificationSink};
use honeyguard::output::{OutputFormat, OutputHandler, OutputSink};
use tokio::sync::mpsc;

/// Honeytoken access monitor: polls access logs (and optionally IP
/// locations) until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting HoneyGuard monitor...");

    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("honeyguard.toml"));

    let config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        log::warn!("Config file not found, using defaults");
        Config::default()
    };

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal, gracefully stopping...");
        let _ = shutdown_tx.try_send(());
    })?;

    let client = Arc::new(HoneyGuardClient::new(&config.api)?);
    log::info!("Using HoneyGuard API at {}", client.base_url());

    let output = OutputHandler::new(
        OutputFormat::from(config.output.format.as_str()),
        config.output.file_path.clone(),
    )?;

    let dispatcher = AlertDispatcher::new(config.alerting.clone());
    let (queue, alert_rx) = AlertDispatcher::channel();
    let dispatcher_task = tokio::spawn(dispatcher.run(alert_rx));

    let sink: Arc<dyn NotificationSink> = Arc::new(
        FanOut::new()
            .with(Arc::new(LogSink))
            .with(Arc::new(queue))
            .with(Arc::new(OutputSink::new(output))),
    );

    let filter = LogFilter {
        time_range: config.polling.time_range,
        level: config.polling.level.clone(),
    };
    let options = PollOptions::from(&config.polling);

    let scopes: Vec<Scope> = if config.polling.tokens.is_empty() {
        vec![Scope::Global]
    } else {
        config.polling.tokens.iter().cloned().map(Scope::Token).collect()
    };

    let mut handles: Vec<PollHandle> = scopes
        .into_iter()
        .map(|scope| {
            start_polling(
                client.clone(),
                scope,
                filter.clone(),
                options.clone(),
                Arc::clone(&sink),
            )
        })
        .collect();

    if config.polling.location_interval_secs > 0 {
        handles.push(start_location_polling(
            client.clone(),
            Duration::from_secs(config.polling.location_interval_secs),
            Arc::clone(&sink),
            |aggregation| {
                let clustered = aggregation.markers.iter().filter(|m| m.is_clustered()).count();
                log::info!(
                    "{} location marker(s) ({} clustered) from {} record(s)",
                    aggregation.markers.len(),
                    clustered,
                    aggregation.total_records()
                );
                if let Some(bounds) = MarkerBounds::from_markers(&aggregation.markers) {
                    log::debug!("Marker bounds: {:?}", bounds);
                }
            },
        ));
    }

    log::info!("Monitor running. Press Ctrl+C to stop.");
    shutdown_rx.recv().await;

    for handle in &handles {
        handle.cancel();
    }
    for handle in handles {
        handle.join().await;
    }

    // Last sink reference gone closes the alert queue and lets the
    // dispatcher drain
    drop(sink);
    if tokio::time::timeout(Duration::from_secs(10), dispatcher_task)
        .await
        .is_err()
    {
        log::warn!("Alert dispatcher did not drain in time");
    }

    log::info!("HoneyGuard monitor stopped");
    Ok(())
}
