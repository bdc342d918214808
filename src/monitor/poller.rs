//! Cancellable fixed-interval polling tasks

use super::novelty::{NoveltyDetector, NoveltyPolicy};
use crate::client::{LocationSource, LogSource};
use crate::config::PollingConfig;
use crate::geo::{self, Aggregation};
use crate::models::{LogFilter, Scope};
use crate::notify::{FailureSource, Notification, NotificationSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Interval, MissedTickBehavior};

/// Settings for an access-log polling session
#[derive(Debug, Clone)]
pub struct PollOptions {
    pub interval: Duration,
    pub policy: NoveltyPolicy,
    pub summary_limit: usize,
}

impl Default for PollOptions {
    fn default() -> Self {
        PollOptions {
            interval: Duration::from_secs(30),
            policy: NoveltyPolicy::default(),
            summary_limit: 5,
        }
    }
}

impl From<&PollingConfig> for PollOptions {
    fn from(config: &PollingConfig) -> Self {
        PollOptions {
            interval: Duration::from_secs(config.interval_secs).max(MIN_PERIOD),
            policy: config.novelty_policy,
            summary_limit: config.summary_limit,
        }
    }
}

/// Owner of a running polling task
///
/// Dropping the handle cancels the task.
#[derive(Debug)]
pub struct PollHandle {
    cancel_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Stop polling. No fetch starts after this returns, and the result of a
    /// fetch already in flight is discarded. Idempotent.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the task to exit. Does not cancel it.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::error!("Polling task failed: {}", e);
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Interval timer that yields until cancelled
///
/// Ticks that fall due while a poll is still running are skipped, so at most
/// one fetch per task is ever in flight.
struct Ticker {
    interval: Interval,
    cancel: watch::Receiver<bool>,
}

/// Shortest period a polling task will run at
pub const MIN_PERIOD: Duration = Duration::from_secs(1);

impl Ticker {
    fn new(period: Duration, cancel: watch::Receiver<bool>) -> Self {
        let period = if period < MIN_PERIOD {
            log::warn!("Polling period {:?} is below {:?}, using {:?}", period, MIN_PERIOD, MIN_PERIOD);
            MIN_PERIOD
        } else {
            period
        };
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Ticker { interval, cancel }
    }

    fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// `false` once the task should stop
    async fn next(&mut self) -> bool {
        if self.cancelled() {
            return false;
        }
        let ticked = tokio::select! {
            biased;
            // Err means the handle is gone, which also cancels
            _ = self.cancel.changed() => false,
            _ = self.interval.tick() => true,
        };
        ticked && !self.cancelled()
    }
}

fn spawn_task<F, Fut>(period: Duration, body: F) -> PollHandle
where
    F: FnOnce(Ticker) -> Fut,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let task = tokio::spawn(body(Ticker::new(period, cancel_rx)));
    PollHandle {
        cancel_tx,
        task: Some(task),
    }
}

/// Poll `source` for `scope` every `options.interval`, starting immediately,
/// and push a notification for every batch of new entries and every failed
/// fetch.
///
/// A failed fetch leaves the baseline untouched and polling continues on the
/// next tick.
pub fn start_polling(
    source: Arc<dyn LogSource>,
    scope: Scope,
    filter: LogFilter,
    options: PollOptions,
    sink: Arc<dyn NotificationSink>,
) -> PollHandle {
    spawn_task(options.interval, move |mut ticker| async move {
        let mut detector =
            NoveltyDetector::new(scope.clone(), options.policy).with_summary_limit(options.summary_limit);
        log::info!(
            "Polling access logs for {} every {:?}",
            scope,
            options.interval
        );

        while ticker.next().await {
            let result = source.fetch_logs(&scope, &filter).await;
            if ticker.cancelled() {
                log::debug!("Discarding in-flight fetch for {} after cancel", scope);
                break;
            }

            match result {
                Ok(entries) => {
                    if detector.consecutive_failures() > 0 {
                        log::info!(
                            "Access-log polling for {} recovered after {} failure(s)",
                            scope,
                            detector.consecutive_failures()
                        );
                    }
                    log::debug!("Fetched {} entries for {}", entries.len(), scope);
                    if let Some(alert) = detector.observe(entries) {
                        sink.notify(Notification::Novelty { alert });
                    }
                }
                Err(e) => {
                    let failures = detector.record_failure();
                    log::warn!("Error fetching logs for {} ({} in a row): {}", scope, failures, e);
                    sink.notify(Notification::failure(FailureSource::LogPolling, e.to_string()));
                }
            }
        }

        log::info!("Stopped polling access logs for {}", scope);
    })
}

/// Poll `source` for geolocations every `interval` and hand each aggregated
/// marker set to `on_markers`.
pub fn start_location_polling<M>(
    source: Arc<dyn LocationSource>,
    interval: Duration,
    sink: Arc<dyn NotificationSink>,
    on_markers: M,
) -> PollHandle
where
    M: Fn(Aggregation) + Send + Sync + 'static,
{
    spawn_task(interval, move |mut ticker| async move {
        log::info!("Polling IP locations every {:?}", interval);

        while ticker.next().await {
            let result = source.fetch_locations().await;
            if ticker.cancelled() {
                break;
            }

            match result {
                Ok(records) => {
                    let aggregation = geo::aggregate(records);
                    log::debug!(
                        "{} location marker(s), {} record(s) skipped",
                        aggregation.markers.len(),
                        aggregation.skipped
                    );
                    on_markers(aggregation);
                }
                Err(e) => {
                    log::warn!("Error fetching IP locations: {}", e);
                    sink.notify(Notification::failure(
                        FailureSource::LocationPolling,
                        e.to_string(),
                    ));
                }
            }
        }

        log::info!("Stopped polling IP locations");
    })
}

/// Access-log polling bound to a changeable filter
///
/// Changing the filter cancels the running session and starts a new one with
/// a fresh baseline.
pub struct LogMonitor {
    source: Arc<dyn LogSource>,
    scope: Scope,
    options: PollOptions,
    sink: Arc<dyn NotificationSink>,
    filter: LogFilter,
    handle: Option<PollHandle>,
}

impl LogMonitor {
    pub fn new(
        source: Arc<dyn LogSource>,
        scope: Scope,
        options: PollOptions,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        LogMonitor {
            source,
            scope,
            options,
            sink,
            filter: LogFilter::default(),
            handle: None,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn filter(&self) -> &LogFilter {
        &self.filter
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_cancelled())
    }

    /// Start (or restart) polling with `filter`
    pub fn start(&mut self, filter: LogFilter) {
        self.stop();
        self.filter = filter;
        self.handle = Some(start_polling(
            Arc::clone(&self.source),
            self.scope.clone(),
            self.filter.clone(),
            self.options.clone(),
            Arc::clone(&self.sink),
        ));
    }

    /// Restart with a new filter; no-op when the filter is unchanged and
    /// polling is running
    pub fn set_filter(&mut self, filter: LogFilter) {
        if self.is_running() && filter == self.filter {
            return;
        }
        log::info!("Log filter for {} changed, restarting polling", self.scope);
        self.start(filter);
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }
}

impl Drop for LogMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
