//! HTTP call handle: one request/response pair.
//!
//! A call is configured (`set_url`, headers, body, per-call overrides),
//! performed exactly once through [`crate::http::perform::perform`], and
//! read back after completion. Request fields freeze when the perform
//! begins; response fields are written by the transport and become the
//! caller's read-only view of the terminal attempt.

use crate::base::error::{HcError, HcResult};
use crate::base::handle::{next_id, Handle};
use crate::global;
use crate::http::headers::HeaderMap;
use crate::http::retry_after_cache::CachedFailure;
use bytes::Bytes;
use http::Method;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Reference-counted handle to an [`HttpCall`].
pub type HttpCallHandle = Handle<HttpCall>;

#[derive(Debug, Default)]
struct RequestData {
    method: Option<Method>,
    url: String,
    headers: HeaderMap,
    body: Bytes,
    // Per-call overrides; None falls back to the process-wide defaults.
    retry_allowed: Option<bool>,
    retry_cache_id: Option<u32>,
    timeout: Option<Duration>,
    retry_delay: Option<Duration>,
    timeout_window: Option<Duration>,
}

#[derive(Debug, Default)]
struct ResponseData {
    status: u32,
    body: Bytes,
    headers: HeaderMap,
    network_error: Option<HcError>,
    platform_error_code: u32,
}

/// One HTTP request/response pair.
#[derive(Debug)]
pub struct HttpCall {
    id: u64,
    performed: AtomicBool,
    request: Mutex<RequestData>,
    response: Mutex<ResponseData>,
}

impl HttpCall {
    /// Creates a new call handle. Requires global init.
    pub fn create() -> HcResult<HttpCallHandle> {
        global::state()?;
        Ok(Handle::new(Self {
            id: next_id(),
            performed: AtomicBool::new(false),
            request: Mutex::new(RequestData::default()),
            response: Mutex::new(ResponseData::default()),
        }))
    }

    /// Unique id identifying this call across the process.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether `perform` has been invoked on this call.
    pub fn performed(&self) -> bool {
        self.performed.load(Ordering::SeqCst)
    }

    /// Flips the performed flag; fails if it was already set.
    pub(crate) fn mark_performed(&self) -> HcResult<()> {
        if self.performed.swap(true, Ordering::SeqCst) {
            Err(HcError::PerformAlreadyCalled)
        } else {
            Ok(())
        }
    }

    fn ensure_mutable(&self) -> HcResult<()> {
        if self.performed() {
            Err(HcError::InvalidState)
        } else {
            Ok(())
        }
    }

    // ----- request side ---------------------------------------------------

    /// Sets the method and URL. Must be called before perform.
    pub fn set_url(&self, method: &str, url: &str) -> HcResult<()> {
        self.ensure_mutable()?;
        let method = Method::from_str(method).map_err(|_| HcError::InvalidArg)?;
        url::Url::parse(url).map_err(|_| HcError::InvalidArg)?;
        let mut request = self.request.lock().unwrap();
        request.method = Some(method);
        request.url = url.to_owned();
        Ok(())
    }

    pub fn method(&self) -> Option<Method> {
        self.request.lock().unwrap().method.clone()
    }

    pub fn url(&self) -> String {
        self.request.lock().unwrap().url.clone()
    }

    pub fn set_request_body(&self, body: impl Into<Bytes>) -> HcResult<()> {
        self.ensure_mutable()?;
        self.request.lock().unwrap().body = body.into();
        Ok(())
    }

    pub fn set_request_body_string(&self, body: &str) -> HcResult<()> {
        self.set_request_body(Bytes::copy_from_slice(body.as_bytes()))
    }

    pub fn request_body(&self) -> Bytes {
        self.request.lock().unwrap().body.clone()
    }

    pub fn set_request_header(&self, name: &str, value: &str) -> HcResult<()> {
        self.ensure_mutable()?;
        self.request.lock().unwrap().headers.set(name, value)
    }

    pub fn request_header(&self, name: &str) -> Option<String> {
        self.request
            .lock()
            .unwrap()
            .headers
            .get(name)
            .map(str::to_owned)
    }

    pub fn request_headers_len(&self) -> usize {
        self.request.lock().unwrap().headers.len()
    }

    pub fn request_header_at(&self, index: usize) -> Option<(String, String)> {
        self.request
            .lock()
            .unwrap()
            .headers
            .get_at(index)
            .map(|(n, v)| (n.to_owned(), v.to_owned()))
    }

    // ----- per-call overrides ---------------------------------------------

    pub fn set_retry_allowed(&self, retry_allowed: bool) -> HcResult<()> {
        self.ensure_mutable()?;
        self.request.lock().unwrap().retry_allowed = Some(retry_allowed);
        Ok(())
    }

    pub fn retry_allowed(&self) -> Option<bool> {
        self.request.lock().unwrap().retry_allowed
    }

    /// Endpoint id used to key the Retry-After fast-fail cache.
    pub fn set_retry_cache_id(&self, cache_id: u32) -> HcResult<()> {
        self.ensure_mutable()?;
        self.request.lock().unwrap().retry_cache_id = Some(cache_id);
        Ok(())
    }

    pub fn retry_cache_id(&self) -> Option<u32> {
        self.request.lock().unwrap().retry_cache_id
    }

    /// Single-attempt time budget.
    pub fn set_timeout(&self, timeout: Duration) -> HcResult<()> {
        self.ensure_mutable()?;
        self.request.lock().unwrap().timeout = Some(timeout);
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.request.lock().unwrap().timeout
    }

    /// Initial backoff delay; clamped at use to the 2 second minimum.
    pub fn set_retry_delay(&self, retry_delay: Duration) -> HcResult<()> {
        self.ensure_mutable()?;
        self.request.lock().unwrap().retry_delay = Some(retry_delay);
        Ok(())
    }

    pub fn retry_delay(&self) -> Option<Duration> {
        self.request.lock().unwrap().retry_delay
    }

    /// Total elapsed-time budget across all retry attempts.
    pub fn set_timeout_window(&self, timeout_window: Duration) -> HcResult<()> {
        self.ensure_mutable()?;
        self.request.lock().unwrap().timeout_window = Some(timeout_window);
        Ok(())
    }

    pub fn timeout_window(&self) -> Option<Duration> {
        self.request.lock().unwrap().timeout_window
    }

    // ----- response side --------------------------------------------------

    pub fn response_status(&self) -> u32 {
        self.response.lock().unwrap().status
    }

    pub fn response_body(&self) -> Bytes {
        self.response.lock().unwrap().body.clone()
    }

    pub fn response_body_string(&self) -> String {
        String::from_utf8_lossy(&self.response.lock().unwrap().body).into_owned()
    }

    pub fn response_header(&self, name: &str) -> Option<String> {
        self.response
            .lock()
            .unwrap()
            .headers
            .get(name)
            .map(str::to_owned)
    }

    pub fn response_headers_len(&self) -> usize {
        self.response.lock().unwrap().headers.len()
    }

    pub fn response_header_at(&self, index: usize) -> Option<(String, String)> {
        self.response
            .lock()
            .unwrap()
            .headers
            .get_at(index)
            .map(|(n, v)| (n.to_owned(), v.to_owned()))
    }

    /// Network-level error and platform error code of the terminal attempt.
    pub fn network_error(&self) -> (Option<HcError>, u32) {
        let response = self.response.lock().unwrap();
        (response.network_error, response.platform_error_code)
    }

    // Transport-facing setters. Written during an attempt; the values the
    // caller finally observes belong to the terminal attempt.

    pub fn set_response_status(&self, status: u32) {
        self.response.lock().unwrap().status = status;
    }

    pub fn set_response_body(&self, body: impl Into<Bytes>) {
        self.response.lock().unwrap().body = body.into();
    }

    pub fn set_response_header(&self, name: &str, value: &str) -> HcResult<()> {
        self.response.lock().unwrap().headers.set(name, value)
    }

    pub(crate) fn set_network_error(&self, error: Option<HcError>, platform_error_code: u32) {
        let mut response = self.response.lock().unwrap();
        response.network_error = error;
        response.platform_error_code = platform_error_code;
    }

    /// Clears attempt output before a retry re-runs the transport.
    pub(crate) fn reset_response(&self) {
        let mut response = self.response.lock().unwrap();
        *response = ResponseData::default();
    }

    /// Populates the response from a cached Retry-After failure without
    /// touching the network.
    pub(crate) fn apply_cached_failure(&self, cached: &CachedFailure) {
        let mut response = self.response.lock().unwrap();
        response.status = cached.status;
        response.body = cached.body.clone();
        response.network_error = cached.error;
        response.platform_error_code = cached.platform_error_code;
    }
}
