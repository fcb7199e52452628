//! Rate-limit bookkeeping for the upstream API quota.
//!
//! The quota is global to the process, so exactly one `RateLimitState`
//! lives inside the one client instance. It is overwritten from response
//! headers after every request and consulted before every request.

use std::time::Duration;

use reqwest::header::HeaderMap;

/// Remaining-request threshold below which the client waits out the
/// current quota window before issuing the next request.
pub const LOW_WATERMARK: i64 = 5;

/// Assumed quota size after a window reset. Only an optimistic local
/// guess — the real numbers arrive with the next response.
const ASSUMED_FULL_QUOTA: i64 = 60;

const HEADER_USED: &str = "x-ratelimit-used";
const HEADER_REMAINING: &str = "x-ratelimit-remaining";
const HEADER_RESET: &str = "x-ratelimit-reset";

/// Quota counters as last reported by the server.
///
/// `-1` means "unknown, assume fresh": the state a new client starts in
/// and returns to after an assumed window reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    pub used: i64,
    pub remaining: i64,
    pub reset_seconds: i64,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self {
            used: -1,
            remaining: -1,
            reset_seconds: -1,
        }
    }
}

impl RateLimitState {
    /// True when the next request should wait for the window to reset
    /// instead of burning the last few quota slots.
    pub fn nearly_exhausted(&self) -> bool {
        self.remaining >= 0 && self.remaining < LOW_WATERMARK
    }

    /// How long to sleep before the window is assumed fresh again.
    /// One extra second of slack over the server-reported reset.
    pub fn wait_duration(&self) -> Duration {
        Duration::from_secs(self.reset_seconds.max(0) as u64 + 1)
    }

    /// Optimistically reset to a full fresh window after waiting it out.
    pub fn assume_fresh(&mut self) {
        self.used = 0;
        self.remaining = ASSUMED_FULL_QUOTA;
        self.reset_seconds = ASSUMED_FULL_QUOTA;
    }

    /// Overwrite counters from response headers. Missing or unparsable
    /// headers leave the corresponding field untouched.
    pub fn update_from_headers(&mut self, headers: &HeaderMap) {
        if let Some(v) = header_i64(headers, HEADER_USED) {
            self.used = v;
        }
        if let Some(v) = header_i64(headers, HEADER_REMAINING) {
            self.remaining = v;
        }
        if let Some(v) = header_i64(headers, HEADER_RESET) {
            self.reset_seconds = v;
        }
    }

    /// Server-reported reset, for the 429 error payload.
    pub fn reset_hint(headers: &HeaderMap) -> Option<u64> {
        header_i64(headers, HEADER_RESET).and_then(|v| u64::try_from(v).ok())
    }
}

fn header_i64(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

impl std::fmt::Display for RateLimitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "used={} remaining={} reset={}s",
            self.used, self.remaining, self.reset_seconds
        )
    }
}
