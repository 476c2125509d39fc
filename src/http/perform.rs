//! Perform flow: drives one [`HttpCall`] through the transport with
//! retry and the Retry-After fast-fail cache wrapped around it.
//!
//! Each attempt is handed to the installed [`HttpTransport`] as an
//! [`HttpAttempt`]. The transport reports back exactly once by consuming
//! the attempt with [`HttpAttempt::complete`]; the retry policy then
//! either reschedules the work-lane step after a backoff delay or marks
//! the operation terminal. Call-level failure is reported through the
//! call's response fields, not the operation result, so `Ok(())` from the
//! operation means only "the perform has finished".

use crate::base::error::{HcError, HcResult};
use crate::global;
use crate::http::call::HttpCallHandle;
use crate::http::retry::{self, AttemptOutcome, Backoff, RetryDecision};
use crate::http::retry_after_cache::CachedFailure;
use crate::task::{AsyncOp, WorkOutcome};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Pluggable network backend for HTTP calls.
///
/// `perform` must not block: it starts the attempt and returns, later
/// consuming `attempt` exactly once from whatever context finishes the
/// I/O. The attempt's timeout is the single-attempt budget; a transport
/// that exceeds it reports [`HcError::Timeout`].
pub trait HttpTransport: Send + Sync {
    fn perform(&self, call: HttpCallHandle, attempt: HttpAttempt);
}

/// Effective settings for one perform, resolved once at start from the
/// per-call overrides and the process-wide defaults.
#[derive(Debug, Clone, Copy)]
struct ResolvedSettings {
    retry_allowed: bool,
    retry_cache_id: Option<u32>,
    timeout: Duration,
    retry_delay: Duration,
    timeout_window: Duration,
}

struct PerformState {
    started: Instant,
    settings: ResolvedSettings,
    backoff: Mutex<Backoff>,
    attempts: AtomicU32,
}

/// One in-flight transport attempt.
///
/// Consuming `self` in [`complete`](Self::complete) makes double
/// completion unrepresentable.
pub struct HttpAttempt {
    call: HttpCallHandle,
    op: AsyncOp<()>,
    state: Arc<PerformState>,
}

impl HttpAttempt {
    /// The call being performed.
    pub fn call(&self) -> &HttpCallHandle {
        &self.call
    }

    /// Single-attempt time budget the transport must honor.
    pub fn timeout(&self) -> Duration {
        self.state.settings.timeout
    }

    /// Reports the attempt's outcome. The transport writes status, body
    /// and headers onto the call before calling this; `network_error`
    /// carries any transport-level failure.
    pub fn complete(self, network_error: Option<HcError>, platform_error_code: u32) {
        self.call.set_network_error(network_error, platform_error_code);

        let status = self.call.response_status();
        let outcome = AttemptOutcome {
            network_error,
            status,
        };
        let settings = &self.state.settings;

        if outcome.failed() {
            record_retry_after(&self.call, &outcome, settings.retry_cache_id);
        }

        let decision = {
            let mut backoff = self.state.backoff.lock().unwrap();
            retry::evaluate(
                &outcome,
                settings.retry_allowed,
                self.state.started,
                settings.timeout_window,
                &mut backoff,
            )
        };

        match decision {
            RetryDecision::Terminal => {
                let _ = self.op.complete(Ok(()));
            }
            RetryDecision::Retry(delay) => {
                tracing::debug!(
                    call_id = self.call.id(),
                    status,
                    delay_ms = delay.as_millis() as u64,
                    "retrying call"
                );
                self.call.reset_response();
                if self.op.reschedule(delay).is_err() {
                    let _ = self.op.complete(Err(HcError::Canceled));
                }
            }
        }
    }
}

/// Starts the perform. The operation completes on the completion lane
/// once a terminal attempt (or a fast-fail cache hit) has populated the
/// call's response fields.
pub fn perform(call: &HttpCallHandle, op: &AsyncOp<()>) -> HcResult<()> {
    let state = global::state()?;
    call.mark_performed()?;

    let defaults = state.defaults();
    let settings = ResolvedSettings {
        retry_allowed: call.retry_allowed().unwrap_or(defaults.retry_allowed),
        retry_cache_id: call.retry_cache_id(),
        timeout: call.timeout().unwrap_or(defaults.timeout),
        retry_delay: call.retry_delay().unwrap_or(defaults.retry_delay),
        timeout_window: call.timeout_window().unwrap_or(defaults.timeout_window),
    };
    let perform_state = Arc::new(PerformState {
        started: Instant::now(),
        settings,
        backoff: Mutex::new(Backoff::new(settings.retry_delay)),
        attempts: AtomicU32::new(0),
    });

    let call = call.duplicate();
    op.begin(move |op| attempt_step(&call, op, &perform_state))
}

fn attempt_step(
    call: &HttpCallHandle,
    op: &AsyncOp<()>,
    state: &Arc<PerformState>,
) -> WorkOutcome<()> {
    let global = match global::state() {
        Ok(global) => global,
        Err(err) => return WorkOutcome::Completed(Err(err)),
    };

    if let Some(cache_id) = state.settings.retry_cache_id {
        if let Some(cached) = global.retry_after_cache().check(cache_id) {
            tracing::info!(
                call_id = call.id(),
                cache_id,
                status = cached.status,
                "failing fast from Retry-After cache"
            );
            call.apply_cached_failure(&cached);
            return WorkOutcome::Completed(Ok(()));
        }
    }

    let attempt_number = state.attempts.fetch_add(1, Ordering::SeqCst) + 1;
    tracing::debug!(
        call_id = call.id(),
        attempt = attempt_number,
        url = %call.url(),
        "dispatching attempt"
    );

    let attempt = HttpAttempt {
        call: call.duplicate(),
        op: op.clone(),
        state: state.clone(),
    };
    global.http_transport().perform(call.duplicate(), attempt);
    WorkOutcome::Pending
}

fn record_retry_after(call: &HttpCallHandle, outcome: &AttemptOutcome, cache_id: Option<u32>) {
    let Some(cache_id) = cache_id else { return };
    let Some(seconds) = call
        .response_header("Retry-After")
        .and_then(|value| retry::parse_retry_after(&value))
    else {
        return;
    };
    let Ok(global) = global::state() else { return };

    let (error, platform_error_code) = call.network_error();
    global.retry_after_cache().record(
        cache_id,
        CachedFailure {
            error,
            platform_error_code,
            status: outcome.status,
            body: call.response_body(),
            retry_until: Instant::now() + seconds,
        },
    );
}
