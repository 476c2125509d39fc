//! Retry-After fast-fail cache.
//!
//! When a service responds with a `Retry-After` directive, the failing
//! response is cached under the call's endpoint cache id. Until the
//! indicated time passes, further calls sharing that id fail immediately
//! from the cache without issuing any transport work.

use crate::base::error::HcError;
use bytes::Bytes;
use dashmap::DashMap;
use std::time::Instant;

/// A throttling failure recorded for an endpoint cache id.
#[derive(Debug, Clone)]
pub struct CachedFailure {
    /// Network error that accompanied the throttled attempt, if any.
    pub error: Option<HcError>,
    /// Platform-specific error code, for logging and debugging.
    pub platform_error_code: u32,
    /// HTTP status of the throttling response (e.g. 429).
    pub status: u32,
    /// Body snapshot of the throttling response.
    pub body: Bytes,
    /// Absolute time after which calls may reach the network again.
    pub retry_until: Instant,
}

/// Process-wide map from endpoint cache id to its standing failure.
///
/// Ids are caller-assigned; ranges are a convention, not enforced here.
/// Entries are overwritten by each new throttling response and simply
/// expire in place — checked, never purged.
#[derive(Default)]
pub struct RetryAfterCache {
    entries: DashMap<u32, CachedFailure>,
}

impl RetryAfterCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns the standing failure for `cache_id` if its deadline has not
    /// yet passed.
    pub fn check(&self, cache_id: u32) -> Option<CachedFailure> {
        let entry = self.entries.get(&cache_id)?;
        if Instant::now() < entry.retry_until {
            Some(entry.clone())
        } else {
            None
        }
    }

    /// Records the latest throttling failure for `cache_id`, superseding
    /// any previous entry.
    pub fn record(&self, cache_id: u32, failure: CachedFailure) {
        tracing::debug!(
            cache_id,
            status = failure.status,
            "caching Retry-After fast-fail entry"
        );
        self.entries.insert(cache_id, failure);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
