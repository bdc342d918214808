//! Notification sinks
//!
//! Components never reach for shared alert state. The submission builder and
//! the pollers are handed a [`NotificationSink`] and push one-shot
//! notifications into it; what happens next (logging, a channel feeding the
//! webhook dispatcher, a test recorder) is the caller's choice.

use crate::models::Token;
use crate::monitor::NoveltyAlert;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Where a failure originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureSource {
    Submission,
    LogPolling,
    LocationPolling,
}

impl fmt::Display for FailureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureSource::Submission => "token submission",
            FailureSource::LogPolling => "access-log polling",
            FailureSource::LocationPolling => "location polling",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    TokenCreated { token: Token },
    Novelty { alert: NoveltyAlert },
    Failure { source: FailureSource, message: String },
}

impl Notification {
    pub fn failure(source: FailureSource, message: impl Into<String>) -> Self {
        Notification::Failure {
            source,
            message: message.into(),
        }
    }

    /// One-line text suitable for a toast or console line
    pub fn summary(&self) -> String {
        match self {
            Notification::TokenCreated { token } => {
                format!("Token generated successfully: {} ({})", token.token, token.category)
            }
            Notification::Novelty { alert } => alert.summary(),
            Notification::Failure { source, message } => {
                format!("Error during {}: {}", source, message)
            }
        }
    }
}

/// Receiver of one-shot notifications
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

impl<F> NotificationSink for F
where
    F: Fn(Notification) + Send + Sync,
{
    fn notify(&self, notification: Notification) {
        self(notification)
    }
}

/// Writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, notification: Notification) {
        match &notification {
            Notification::TokenCreated { .. } => log::info!("{}", notification.summary()),
            Notification::Novelty { .. } => log::warn!("ALERT: {}", notification.summary()),
            Notification::Failure { .. } => log::error!("{}", notification.summary()),
        }
    }
}

/// Forwards every notification to each inner sink
#[derive(Clone, Default)]
pub struct FanOut {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl NotificationSink for FanOut {
    fn notify(&self, notification: Notification) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.notify(notification.clone());
            }
            last.notify(notification);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records everything it is sent
    #[derive(Default)]
    pub struct RecordingSink {
        received: Mutex<Vec<Notification>>,
    }

    impl RecordingSink {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn take(&self) -> Vec<Notification> {
            std::mem::take(&mut *self.received.lock().unwrap())
        }

        pub fn len(&self) -> usize {
            self.received.lock().unwrap().len()
        }
    }

    impl NotificationSink for RecordingSink {
        fn notify(&self, notification: Notification) {
            self.received.lock().unwrap().push(notification);
        }
    }
}
