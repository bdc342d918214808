pub mod alerting;
pub mod client;
pub mod config;
pub mod geo;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod output;
pub mod schema;
pub mod submission;
pub mod wizard;

// Re-export commonly used types
pub use models::{AccessLogEntry, LocationRecord, LogFilter, Scope, Token, TokenCategory};
pub use client::{ClientError, HoneyGuardClient, LocationSource, LogSource, TokenService};
pub use geo::{aggregate_locations, LocationMarker};
pub use monitor::{start_location_polling, start_polling, NoveltyAlert, NoveltyPolicy, PollHandle};
pub use notify::{Notification, NotificationSink};
pub use submission::{SubmissionBuilder, SubmitError};
pub use wizard::{WizardState, WizardStep};
pub use alerting::{AlertDispatcher, AlertQueue};
