//! Fixed-window request throttle.
//!
//! Keyed counters (client IP, account email, ...) with explicit window
//! expiry. The map is owned by the limiter and guarded by a mutex; callers
//! share the limiter itself, never the map.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    resets_at: Instant,
}

/// Outcome of one [`FixedWindowLimiter::check`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleDecision {
    pub allowed: bool,
    pub limit: u32,
    /// Requests left in the current window (0 once exceeded).
    pub remaining: u32,
    pub reset_in: Duration,
}

pub struct FixedWindowLimiter {
    max: u32,
    window: Duration,
    entries: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Count one request for `key` at `now` and decide whether it may proceed.
    pub fn check(&self, key: &str, now: Instant) -> ThrottleDecision {
        // A poisoned lock only means another request panicked mid-update;
        // the counters are still usable.
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let entry = entries.entry(key.to_string()).or_insert(Window {
            count: 0,
            resets_at: now + self.window,
        });
        if now >= entry.resets_at {
            *entry = Window {
                count: 0,
                resets_at: now + self.window,
            };
        }
        entry.count = entry.count.saturating_add(1);

        ThrottleDecision {
            allowed: entry.count <= self.max,
            limit: self.max,
            remaining: self.max.saturating_sub(entry.count),
            reset_in: entry.resets_at.saturating_duration_since(now),
        }
    }

    /// Drop windows that have expired. Returns how many were removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, w| now < w.resets_at);
        before - entries.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
