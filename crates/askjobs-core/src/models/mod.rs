//! Data models for ASK 2.0 platform entities.
//!
//! - `Job`, `JobFilter`: job postings and the open/closed filter
//! - `Question`, `Answer`: community threads
//! - `ChatReply`: AI assistant responses
//! - `SignUpRequest`: member registration payload

pub mod chat;
pub mod community;
pub mod job;
pub mod member;

pub use chat::ChatReply;
pub use community::{Answer, Question};
pub use job::{Job, JobFilter};
pub use member::SignUpRequest;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Parse the server's date strings: RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS`
/// (assumed UTC), or a bare date (UTC midnight).
pub(crate) fn parse_server_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
