//! Last-activity bookkeeping, read by whatever serves the viewer

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Default)]
pub struct Activity {
    last_millis: AtomicU64,
}

impl Activity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record activity now
    pub fn touch(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.last_millis.fetch_max(now, Ordering::Relaxed);
    }

    /// Milliseconds since the UNIX epoch of the last activity, if any
    pub fn last(&self) -> Option<u64> {
        match self.last_millis.load(Ordering::Relaxed) {
            0 => None,
            millis => Some(millis),
        }
    }
}
