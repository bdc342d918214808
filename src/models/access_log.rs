//! Access-log entries returned by the log source, plus the query filters and
//! client-side search applied to them.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity/status attached to an access-log entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
    Other(String),
}

impl LogLevel {
    pub fn as_str(&self) -> &str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Success => "success",
            LogLevel::Other(s) => s,
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl From<String> for LogLevel {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "info" => LogLevel::Info,
            "warning" | "warn" => LogLevel::Warning,
            "error" => LogLevel::Error,
            "success" => LogLevel::Success,
            _ => LogLevel::Other(s),
        }
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.as_str().to_string()
    }
}

impl FromStr for LogLevel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(LogLevel::from(s.to_string()))
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single observed access to a honeytoken
///
/// Entries are immutable once observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessLogEntry {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default, alias = "status")]
    pub level: LogLevel,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// Identity of an entry across polls
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryIdentity(String);

impl EntryIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AccessLogEntry {
    /// The server id when present, otherwise a composite of the entry's fields
    pub fn identity(&self) -> EntryIdentity {
        match &self.id {
            Some(id) => EntryIdentity(format!("id:{}", id)),
            None => EntryIdentity(format!(
                "{}|{}|{}|{}",
                self.timestamp.to_rfc3339(),
                self.ip_address,
                self.source,
                self.message
            )),
        }
    }
}

/// How recent an access is, relative to now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recency {
    /// Less than an hour ago
    Recent,
    /// Less than a day ago
    Today,
    Old,
}

impl Recency {
    pub fn classify(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let age = now - timestamp;
        if age < Duration::hours(1) {
            Recency::Recent
        } else if age < Duration::hours(24) {
            Recency::Today
        } else {
            Recency::Old
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Recency::Recent => "Recent",
            Recency::Today => "Today",
            Recency::Old => "Old",
        }
    }
}

/// Time window understood by the log endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "1h")]
    LastHour,
    #[serde(rename = "24h")]
    LastDay,
    #[serde(rename = "7d")]
    LastWeek,
    #[serde(rename = "30d")]
    LastMonth,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::LastHour => "1h",
            TimeRange::LastDay => "24h",
            TimeRange::LastWeek => "7d",
            TimeRange::LastMonth => "30d",
        }
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" => Ok(TimeRange::LastHour),
            "24h" => Ok(TimeRange::LastDay),
            "7d" => Ok(TimeRange::LastWeek),
            "30d" => Ok(TimeRange::LastMonth),
            other => Err(format!("Unknown time range: {} (expected 1h, 24h, 7d or 30d)", other)),
        }
    }
}

/// What a log or location query is issued against
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "token", rename_all = "lowercase")]
pub enum Scope {
    Global,
    Token(String),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("all tokens"),
            Scope::Token(token) => write!(f, "token {}", token),
        }
    }
}

/// Server-side filter parameters of a log query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    pub time_range: Option<TimeRange>,
    /// `None` means all levels
    pub level: Option<LogLevel>,
}

impl LogFilter {
    /// Query-string pairs for the log endpoint; unset filters are omitted
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(range) = self.time_range {
            pairs.push(("timeRange", range.as_str().to_string()));
        }
        if let Some(ref level) = self.level {
            pairs.push(("level", level.as_str().to_string()));
        }
        pairs
    }
}

/// Client-side search over an already fetched collection
#[derive(Debug, Clone, Default)]
pub struct LogSearch {
    pub term: String,
    pub level: Option<LogLevel>,
}

impl LogSearch {
    pub fn matches(&self, entry: &AccessLogEntry) -> bool {
        let term = self.term.to_lowercase();
        let matches_term = term.is_empty()
            || entry.message.to_lowercase().contains(&term)
            || entry.source.to_lowercase().contains(&term)
            || entry.ip_address.to_lowercase().contains(&term);
        let matches_level = self.level.as_ref().map_or(true, |level| &entry.level == level);
        matches_term && matches_level
    }

    pub fn apply<'a>(&self, entries: &'a [AccessLogEntry]) -> Vec<&'a AccessLogEntry> {
        entries.iter().filter(|e| self.matches(e)).collect()
    }
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => parse_timestamp(&s)
            .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {}", s))),
        // Epoch milliseconds, as produced by `Date.now()`
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|ms| ms as i64))
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {}", n))),
        other => Err(D::Error::custom(format!("invalid timestamp: {}", other))),
    }
}

/// Decode a raw log collection row by row
///
/// Rows that fail to decode (typically a missing or unreadable timestamp)
/// are dropped and counted instead of failing the whole collection.
pub fn decode_entries(rows: Vec<serde_json::Value>) -> (Vec<AccessLogEntry>, usize) {
    let mut entries = Vec::with_capacity(rows.len());
    let mut skipped = 0;
    for row in rows {
        match serde_json::from_value::<AccessLogEntry>(row) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                log::debug!("Skipping malformed log row: {}", e);
                skipped += 1;
            }
        }
    }
    (entries, skipped)
}

/// Parse RFC 3339, or a naive date-time taken as UTC
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}
