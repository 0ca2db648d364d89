use std::time::{SystemTime, UNIX_EPOCH};

/// Persisted document shapes shared by every backend.
pub mod models;
/// Session store boundary and its backends.
pub mod session_store;
/// Storage error type shared across backends.
pub mod storage;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
