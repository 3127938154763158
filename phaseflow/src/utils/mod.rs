//! Utility functions for run ids and timestamps.

use chrono::Utc;
use uuid::Uuid;

/// Generates a new run id (UUID v4, hyphenated).
#[must_use]
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Returns the current UTC time as an ISO-8601 string with microseconds.
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Truncates `text` to at most `max_chars` characters, appending an ellipsis.
#[must_use]
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}
