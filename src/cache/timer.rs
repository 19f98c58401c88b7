use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock seconds since the Unix epoch.
///
/// TTL accounting is coarse (whole seconds), so a monotonic clock is not
/// required. The trait exists so tests can drive expiry without sleeping.
pub trait Timer: Send + Sync {
    fn timestamp(&self) -> u64;
}

#[derive(Default)]
pub struct SystemTimer;

impl SystemTimer {
    pub fn new() -> Self {
        SystemTimer
    }
}

impl Timer for SystemTimer {
    fn timestamp(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0)
    }
}
