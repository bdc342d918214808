pub mod access_log;
pub mod location;
pub mod token;

pub use access_log::{decode_entries, AccessLogEntry, EntryIdentity, LogFilter, LogLevel, LogSearch, Recency, Scope, TimeRange};
pub use location::LocationRecord;
pub use token::{SortDirection, Token, TokenCategory, TokenQuery, TokenRecord, TokenSortField, UnknownCategory};
