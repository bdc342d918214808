//! Access-log and location monitoring

pub mod novelty;
pub mod poller;

pub use novelty::{LogOrder, NoveltyAlert, NoveltyDetector, NoveltyPolicy};
pub use poller::{start_location_polling, start_polling, LogMonitor, PollHandle, PollOptions, MIN_PERIOD};
