use serde::{Deserialize, Serialize};

/// Result wrapper for list operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResult<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> ListResult<T> {
    pub fn from_items(items: Vec<T>) -> Self {
        let total = items.len();
        Self { items, total }
    }
}

/// Generate a new random ID (UUIDv4, no dashes).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string().replace('-', "")
}

/// Get the current time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Last six digits of the current Unix time in milliseconds.
///
/// Used as the short suffix in operator-facing generated codes
/// (`10004-512934`).
pub fn millis_suffix() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    format!("{:06}", millis.rem_euclid(1_000_000))
}

/// Normalize operator-entered free text: trim, and treat blank as absent.
pub fn normalize_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
