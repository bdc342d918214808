//! Detection of access-log entries not seen in earlier polls

use crate::models::{AccessLogEntry, EntryIdentity, Scope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Order in which the log source returns entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOrder {
    #[default]
    MostRecentFirst,
    OldestFirst,
}

/// How a fetched collection is compared against the baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoveltyPolicy {
    /// New iff the collection grew; the extra entries are taken from the
    /// newest end according to `order`. Misses rotations (one entry in, one
    /// out).
    HeadDelta { order: LogOrder },
    /// New iff the entry's identity has never been observed this session
    #[default]
    IdentityDiff,
}

/// Entries that appeared since the previous successful poll
#[derive(Debug, Clone, Serialize)]
pub struct NoveltyAlert {
    pub scope: Scope,
    pub detected_at: DateTime<Utc>,
    pub new_entries: Vec<AccessLogEntry>,
    #[serde(skip)]
    summary_limit: usize,
}

impl NoveltyAlert {
    pub fn count(&self) -> usize {
        self.new_entries.len()
    }

    /// The entries listed in the summary
    pub fn headline(&self) -> &[AccessLogEntry] {
        let n = self.new_entries.len().min(self.summary_limit.max(1));
        &self.new_entries[..n]
    }

    pub fn summary(&self) -> String {
        let ips: Vec<&str> = self
            .headline()
            .iter()
            .map(|e| e.ip_address.as_str())
            .collect();
        let mut text = if self.count() == 1 {
            format!("New access attempt detected! IP: {}", ips.join(", "))
        } else {
            format!(
                "{} new access attempts detected on {}! IPs: {}",
                self.count(),
                self.scope,
                ips.join(", ")
            )
        };
        let hidden = self.count() - ips.len();
        if hidden > 0 {
            text.push_str(&format!(" (+{} more)", hidden));
        }
        text
    }
}

/// Session-scoped novelty state for one scope
///
/// The first observation only establishes the baseline. Every later
/// observation replaces it, and identities reported once are never reported
/// again.
#[derive(Debug)]
pub struct NoveltyDetector {
    scope: Scope,
    policy: NoveltyPolicy,
    summary_limit: usize,
    baseline: Option<Vec<AccessLogEntry>>,
    seen: HashSet<EntryIdentity>,
    consecutive_failures: u32,
}

impl NoveltyDetector {
    pub fn new(scope: Scope, policy: NoveltyPolicy) -> Self {
        NoveltyDetector {
            scope,
            policy,
            summary_limit: 5,
            baseline: None,
            seen: HashSet::new(),
            consecutive_failures: 0,
        }
    }

    pub fn with_summary_limit(mut self, limit: usize) -> Self {
        self.summary_limit = limit;
        self
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn policy(&self) -> NoveltyPolicy {
        self.policy
    }

    /// Collection from the last successful poll
    pub fn baseline(&self) -> Option<&[AccessLogEntry]> {
        self.baseline.as_deref()
    }

    pub fn is_primed(&self) -> bool {
        self.baseline.is_some()
    }

    /// Forget everything, so the next observation is a baseline again
    pub fn reset(&mut self) {
        self.baseline = None;
        self.seen.clear();
        self.consecutive_failures = 0;
    }

    /// Note a failed fetch. The baseline is kept for the next successful
    /// observation. Returns the number of failures in a row.
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures += 1;
        self.consecutive_failures
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Compare a freshly fetched collection with the baseline, then make it
    /// the new baseline.
    pub fn observe(&mut self, fetched: Vec<AccessLogEntry>) -> Option<NoveltyAlert> {
        self.consecutive_failures = 0;
        let previous_len = match self.baseline {
            Some(ref baseline) => baseline.len(),
            None => {
                log::debug!(
                    "Baseline for {} established with {} entries",
                    self.scope,
                    fetched.len()
                );
                self.seen.extend(fetched.iter().map(|e| e.identity()));
                self.baseline = Some(fetched);
                return None;
            }
        };

        let candidates: &[AccessLogEntry] = match self.policy {
            NoveltyPolicy::HeadDelta { order } if fetched.len() > previous_len => {
                let delta = fetched.len() - previous_len;
                match order {
                    LogOrder::MostRecentFirst => &fetched[..delta],
                    LogOrder::OldestFirst => &fetched[fetched.len() - delta..],
                }
            }
            NoveltyPolicy::HeadDelta { .. } => &[],
            NoveltyPolicy::IdentityDiff => &fetched,
        };

        let new_entries: Vec<AccessLogEntry> = candidates
            .iter()
            .filter(|e| self.seen.insert(e.identity()))
            .cloned()
            .collect();

        // Entries outside the delta still count as observed
        self.seen.extend(fetched.iter().map(|e| e.identity()));
        self.baseline = Some(fetched);

        if new_entries.is_empty() {
            return None;
        }

        log::debug!("{} new entries for {}", new_entries.len(), self.scope);
        Some(NoveltyAlert {
            scope: self.scope.clone(),
            detected_at: Utc::now(),
            new_entries,
            summary_limit: self.summary_limit,
        })
    }
}
