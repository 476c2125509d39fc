//! Retry decision logic with exponential backoff and jitter.
//!
//! After each transport attempt the engine decides between retrying and
//! finishing. Transient failures (network errors and a fixed set of HTTP
//! statuses) are retried while the call's timeout window allows; delays
//! start at the configured retry delay, double up to a ceiling, and are
//! jittered across the interval since the previous delay to spread load
//! across clients hammering the same endpoint.

use crate::base::error::HcError;
use http::StatusCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Smallest permitted retry delay; configured values clamp up to this.
pub const MIN_RETRY_DELAY: Duration = Duration::from_secs(2);
/// Backoff ceiling.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Whether an HTTP status is eligible for backoff retry.
///
/// The retryable set: 408 Request Timeout, 429 Too Many Requests,
/// 500 Internal Server Error, 502 Bad Gateway, 503 Service Unavailable,
/// 504 Gateway Timeout.
pub fn is_retryable_status(status: u32) -> bool {
    match StatusCode::from_u16(status as u16) {
        Ok(code) => matches!(
            code,
            StatusCode::REQUEST_TIMEOUT
                | StatusCode::TOO_MANY_REQUESTS
                | StatusCode::INTERNAL_SERVER_ERROR
                | StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT
        ),
        Err(_) => false,
    }
}

/// Parses a `Retry-After` header value as delta-seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Exponential backoff state for one call's retry sequence.
///
/// Each retry samples its actual delay uniformly between the previous
/// computed delay and the new one, so the first delay falls in
/// `[0, retry_delay]` and later delays in `[prev, min(prev * 2, 60s)]`.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    prev_computed: Duration,
}

impl Backoff {
    pub fn new(retry_delay: Duration) -> Self {
        Self {
            base: retry_delay.max(MIN_RETRY_DELAY),
            prev_computed: Duration::ZERO,
        }
    }

    /// Advances the sequence and returns the jittered delay for the next
    /// retry.
    pub fn next_delay(&mut self) -> Duration {
        let computed = if self.prev_computed.is_zero() {
            self.base
        } else {
            (self.prev_computed * 2).min(MAX_RETRY_DELAY)
        };
        let sampled = jitter_between(self.prev_computed, computed);
        self.prev_computed = computed;
        sampled
    }
}

/// What one transport attempt reported back.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub network_error: Option<HcError>,
    pub status: u32,
}

impl AttemptOutcome {
    pub fn failed(&self) -> bool {
        self.network_error.is_some() || is_retryable_status(self.status)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Report this attempt's outcome to the caller.
    Terminal,
    /// Schedule another attempt after the delay.
    Retry(Duration),
}

/// Decides retry vs. terminal for a finished attempt.
///
/// Retry requires: the call allows it, the attempt failed transiently, and
/// the elapsed time plus the backoff delay still fits inside the timeout
/// window.
pub fn evaluate(
    outcome: &AttemptOutcome,
    retry_allowed: bool,
    started: Instant,
    timeout_window: Duration,
    backoff: &mut Backoff,
) -> RetryDecision {
    if !outcome.failed() || !retry_allowed {
        return RetryDecision::Terminal;
    }
    let delay = backoff.next_delay();
    if started.elapsed() + delay > timeout_window {
        return RetryDecision::Terminal;
    }
    RetryDecision::Retry(delay)
}

/// Uniform sample in `[lo, hi]`.
///
/// Jitter needs no cryptographic quality; a process-global xorshift
/// generator seeded from the clock keeps the dependency surface flat.
fn jitter_between(lo: Duration, hi: Duration) -> Duration {
    if hi <= lo {
        return hi;
    }
    let span = (hi - lo).as_millis() as u64;
    let offset = next_random() % (span + 1);
    lo + Duration::from_millis(offset)
}

static RNG_STATE: AtomicU64 = AtomicU64::new(0);

fn next_random() -> u64 {
    let mut state = RNG_STATE.load(Ordering::Relaxed);
    if state == 0 {
        state = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9e3779b97f4a7c15)
            | 1;
    }
    // xorshift64*
    state ^= state >> 12;
    state ^= state << 25;
    state ^= state >> 27;
    RNG_STATE.store(state, Ordering::Relaxed);
    state.wrapping_mul(0x2545f4914f6cdd1d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status), "{status} should retry");
        }
        for status in [200, 201, 301, 400, 401, 403, 404, 501] {
            assert!(!is_retryable_status(status), "{status} should not retry");
        }
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after(" 5 "), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after(""), None);
    }

    #[test]
    fn test_backoff_bounds() {
        let mut backoff = Backoff::new(Duration::from_secs(2));

        // First delay sampled in [0, 2s].
        let first = backoff.next_delay();
        assert!(first <= Duration::from_secs(2));

        // Upper bound doubles each step: 4s, 8s, ... capped at 60s, and
        // each sample stays inside [prev computed, new computed].
        let mut prev_upper = Duration::from_secs(2);
        for _ in 0..8 {
            let upper = (prev_upper * 2).min(MAX_RETRY_DELAY);
            let delay = backoff.next_delay();
            assert!(delay >= prev_upper, "{delay:?} < {prev_upper:?}");
            assert!(delay <= upper, "{delay:?} > {upper:?}");
            prev_upper = upper;
        }
        assert_eq!(prev_upper, MAX_RETRY_DELAY);
    }

    #[test]
    fn test_backoff_clamps_minimum_delay() {
        let mut backoff = Backoff::new(Duration::from_millis(1));
        backoff.next_delay();
        // Second computed delay doubles from the clamped 2s base.
        let second = backoff.next_delay();
        assert!(second >= Duration::from_secs(2));
        assert!(second <= Duration::from_secs(4));
    }

    fn outcome(network_error: Option<HcError>, status: u32) -> AttemptOutcome {
        AttemptOutcome {
            network_error,
            status,
        }
    }

    #[test]
    fn test_success_is_terminal() {
        let mut backoff = Backoff::new(MIN_RETRY_DELAY);
        let decision = evaluate(
            &outcome(None, 200),
            true,
            Instant::now(),
            Duration::from_secs(20),
            &mut backoff,
        );
        assert_eq!(decision, RetryDecision::Terminal);
    }

    #[test]
    fn test_retry_disallowed_is_terminal() {
        let mut backoff = Backoff::new(MIN_RETRY_DELAY);
        let decision = evaluate(
            &outcome(None, 503),
            false,
            Instant::now(),
            Duration::from_secs(20),
            &mut backoff,
        );
        assert_eq!(decision, RetryDecision::Terminal);
    }

    #[test]
    fn test_transient_failure_retries_inside_window() {
        let mut backoff = Backoff::new(MIN_RETRY_DELAY);
        let decision = evaluate(
            &outcome(None, 503),
            true,
            Instant::now(),
            Duration::from_secs(20),
            &mut backoff,
        );
        assert!(matches!(decision, RetryDecision::Retry(_)));
    }

    #[test]
    fn test_network_error_retries() {
        let mut backoff = Backoff::new(MIN_RETRY_DELAY);
        let decision = evaluate(
            &outcome(Some(HcError::Timeout), 0),
            true,
            Instant::now(),
            Duration::from_secs(20),
            &mut backoff,
        );
        assert!(matches!(decision, RetryDecision::Retry(_)));
    }

    #[test]
    fn test_exhausted_window_is_terminal() {
        let mut backoff = Backoff::new(MIN_RETRY_DELAY);
        let started = Instant::now() - Duration::from_secs(30);
        let decision = evaluate(
            &outcome(None, 503),
            true,
            started,
            Duration::from_secs(20),
            &mut backoff,
        );
        assert_eq!(decision, RetryDecision::Terminal);
    }

    #[test]
    fn test_non_retryable_client_error_is_terminal() {
        let mut backoff = Backoff::new(MIN_RETRY_DELAY);
        let decision = evaluate(
            &outcome(None, 404),
            true,
            Instant::now(),
            Duration::from_secs(20),
            &mut backoff,
        );
        assert_eq!(decision, RetryDecision::Terminal);
    }
}
