//! Per-endpoint failure history

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Failure count and time of the most recent failure of one endpoint.
///
/// `attempts() == 0` exactly when `failure_time()` is `None`: the timestamp
/// is written before the counter is incremented and cleared after it is
/// reset, both under the same lock.
#[derive(Debug, Default)]
pub struct RetryMetadata {
    failure_time: Mutex<Option<Instant>>,
    attempts: AtomicU32,
}

impl RetryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&self, time: Instant) {
        let mut failure_time = self.lock();
        *failure_time = Some(time);
        self.attempts.fetch_add(1, Ordering::AcqRel);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    pub fn has_recorded_failure(&self) -> bool {
        self.attempts() > 0
    }

    pub fn failure_time(&self) -> Option<Instant> {
        *self.lock()
    }

    pub fn reset(&self) {
        let mut failure_time = self.lock();
        self.attempts.store(0, Ordering::Release);
        *failure_time = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        // The guarded value is a plain timestamp; a poisoned lock still holds
        // a consistent one.
        self.failure_time
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
