//! SQLite storage layer.
//!
//! Repository, store and queue implementations backed by SQLite with WAL
//! mode and split read/write connection pools.

pub mod flow;
pub mod flow_store;
pub mod job_queue;
pub mod pool;
pub mod trigger_source;

use chrono::{DateTime, SecondsFormat, Utc};
use flowplane_types::error::RepositoryError;

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width UTC form, so stored timestamps order lexically.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}
