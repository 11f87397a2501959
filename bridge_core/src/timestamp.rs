use std::time::{SystemTime, UNIX_EPOCH};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const NANOS_PER_SEC: u32 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid timestamp (sec: {sec}, nsec: {nsec})")]
pub struct TimestampError {
    pub sec: i64,
    pub nsec: i64,
}

/// Seconds and nanoseconds since the Unix epoch. Both parts are non-negative
/// and `nsec` stays below one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    sec: i64,
    nsec: u32,
}

impl Timestamp {
    pub fn new(sec: i64, nsec: i64) -> Result<Self, TimestampError> {
        if sec < 0 || nsec < 0 || nsec >= NANOS_PER_SEC as i64 {
            return Err(TimestampError { sec, nsec });
        }
        Ok(Timestamp { sec, nsec: nsec as u32 })
    }

    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Times before the epoch clamp to the epoch.
    pub fn from_system_time(t: SystemTime) -> Self {
        let since = t.duration_since(UNIX_EPOCH).unwrap_or_default();
        Timestamp {
            sec: since.as_secs() as i64,
            nsec: since.subsec_nanos(),
        }
    }

    pub fn sec(&self) -> i64 {
        self.sec
    }

    pub fn nsec(&self) -> u32 {
        self.nsec
    }
}
