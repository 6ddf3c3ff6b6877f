use std::time::{SystemTime, UNIX_EPOCH};

pub trait SystemTimeExt {
    /// Seconds since the epoch, negative for times before it.
    fn to_unix_seconds(&self) -> i64;
}

impl SystemTimeExt for SystemTime {
    fn to_unix_seconds(&self) -> i64 {
        match self.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_secs()).unwrap_or(i64::MAX),
            Err(before) => i64::try_from(before.duration().as_secs())
                .map(|secs| -secs)
                .unwrap_or(i64::MIN),
        }
    }
}
