//! Process-wide state: lifetime (`init`/`cleanup`), installed
//! transports, call defaults, WebSocket handlers, and the Retry-After
//! fast-fail cache.
//!
//! Everything hangs off one `Arc<GlobalState>` behind a mutex-guarded
//! slot. Callers snapshot the `Arc` at operation start, so a concurrent
//! `cleanup` fails new work with [`HcError::NotInitialized`] while
//! already-started operations keep their snapshot alive.

use crate::base::error::{HcError, HcResult};
use crate::http::perform::{HttpAttempt, HttpTransport};
use crate::http::retry_after_cache::RetryAfterCache;
use crate::http::HttpCallHandle;
use crate::task::AsyncOp;
use crate::ws::{
    CloseStatus, WebSocketCloseHandler, WebSocketCompletionResult, WebSocketHandle,
    WebSocketMessageHandler, WebSocketTransport,
};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Process-wide call settings, overridable per call.
#[derive(Debug, Clone, Copy)]
pub struct Defaults {
    /// Whether calls retry transient failures.
    pub retry_allowed: bool,
    /// Single-attempt time budget.
    pub timeout: Duration,
    /// Initial backoff delay.
    pub retry_delay: Duration,
    /// Total elapsed-time budget across retries.
    pub timeout_window: Duration,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            retry_allowed: true,
            timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(2),
            timeout_window: Duration::from_secs(20),
        }
    }
}

pub(crate) struct GlobalState {
    http_transport: RwLock<Arc<dyn HttpTransport>>,
    websocket_transport: RwLock<Arc<dyn WebSocketTransport>>,
    defaults: RwLock<Defaults>,
    message_handler: RwLock<Option<WebSocketMessageHandler>>,
    close_handler: RwLock<Option<WebSocketCloseHandler>>,
    retry_after_cache: RetryAfterCache,
}

impl GlobalState {
    fn new() -> Self {
        Self {
            http_transport: RwLock::new(Arc::new(UnsupportedHttpTransport)),
            websocket_transport: RwLock::new(Arc::new(UnsupportedWebSocketTransport)),
            defaults: RwLock::new(Defaults::default()),
            message_handler: RwLock::new(None),
            close_handler: RwLock::new(None),
            retry_after_cache: RetryAfterCache::new(),
        }
    }

    pub(crate) fn http_transport(&self) -> Arc<dyn HttpTransport> {
        self.http_transport.read().unwrap().clone()
    }

    pub(crate) fn websocket_transport(&self) -> Arc<dyn WebSocketTransport> {
        self.websocket_transport.read().unwrap().clone()
    }

    pub(crate) fn defaults(&self) -> Defaults {
        *self.defaults.read().unwrap()
    }

    pub(crate) fn websocket_message_handler(&self) -> Option<WebSocketMessageHandler> {
        self.message_handler.read().unwrap().clone()
    }

    pub(crate) fn websocket_close_handler(&self) -> Option<WebSocketCloseHandler> {
        self.close_handler.read().unwrap().clone()
    }

    pub(crate) fn retry_after_cache(&self) -> &RetryAfterCache {
        &self.retry_after_cache
    }
}

// Transports and handlers are trait objects and closures, so this
// cannot be derived.
impl fmt::Debug for GlobalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalState")
            .field("defaults", &self.defaults())
            .field("message_handler", &self.websocket_message_handler().is_some())
            .field("close_handler", &self.websocket_close_handler().is_some())
            .finish_non_exhaustive()
    }
}

static STATE: Mutex<Option<Arc<GlobalState>>> = Mutex::new(None);

/// Initializes the library. Fails with [`HcError::AlreadyInitialized`]
/// if already initialized.
pub fn init() -> HcResult<()> {
    let mut slot = STATE.lock().unwrap();
    if slot.is_some() {
        return Err(HcError::AlreadyInitialized);
    }
    *slot = Some(Arc::new(GlobalState::new()));
    tracing::debug!("library initialized");
    Ok(())
}

/// Tears down the process-wide state. Idempotent; handles and operations
/// created earlier keep working off their own snapshots, but new work
/// fails with [`HcError::NotInitialized`].
pub fn cleanup() {
    let state = STATE.lock().unwrap().take();
    if state.is_some() {
        tracing::debug!("library cleaned up");
    }
}

pub(crate) fn state() -> HcResult<Arc<GlobalState>> {
    STATE
        .lock()
        .unwrap()
        .as_ref()
        .cloned()
        .ok_or(HcError::NotInitialized)
}

/// Installs the HTTP backend used by subsequent performs.
pub fn set_http_transport(transport: Arc<dyn HttpTransport>) -> HcResult<()> {
    let state = state()?;
    *state.http_transport.write().unwrap() = transport;
    Ok(())
}

/// Returns the installed HTTP backend (the unsupported stand-in until
/// one is installed).
pub fn http_transport() -> HcResult<Arc<dyn HttpTransport>> {
    Ok(state()?.http_transport())
}

/// Installs the WebSocket backend used by subsequent connects.
pub fn set_websocket_transport(transport: Arc<dyn WebSocketTransport>) -> HcResult<()> {
    let state = state()?;
    *state.websocket_transport.write().unwrap() = transport;
    Ok(())
}

/// Returns the installed WebSocket backend.
pub fn websocket_transport() -> HcResult<Arc<dyn WebSocketTransport>> {
    Ok(state()?.websocket_transport())
}

/// Installs the inbound message and close handlers. `None` clears.
pub fn set_websocket_handlers(
    message: Option<WebSocketMessageHandler>,
    close: Option<WebSocketCloseHandler>,
) -> HcResult<()> {
    let state = state()?;
    *state.message_handler.write().unwrap() = message;
    *state.close_handler.write().unwrap() = close;
    Ok(())
}

pub fn defaults() -> HcResult<Defaults> {
    Ok(state()?.defaults())
}

pub fn set_default_retry_allowed(retry_allowed: bool) -> HcResult<()> {
    state()?.defaults.write().unwrap().retry_allowed = retry_allowed;
    Ok(())
}

pub fn set_default_timeout(timeout: Duration) -> HcResult<()> {
    state()?.defaults.write().unwrap().timeout = timeout;
    Ok(())
}

pub fn set_default_retry_delay(retry_delay: Duration) -> HcResult<()> {
    state()?.defaults.write().unwrap().retry_delay = retry_delay;
    Ok(())
}

pub fn set_default_timeout_window(timeout_window: Duration) -> HcResult<()> {
    state()?.defaults.write().unwrap().timeout_window = timeout_window;
    Ok(())
}

/// Clears the Retry-After fast-fail cache.
pub fn clear_retry_after_cache() -> HcResult<()> {
    state()?.retry_after_cache().clear();
    Ok(())
}

/// Stand-in HTTP backend installed until the embedder provides one.
struct UnsupportedHttpTransport;

impl HttpTransport for UnsupportedHttpTransport {
    fn perform(&self, _call: HttpCallHandle, attempt: HttpAttempt) {
        attempt.complete(Some(HcError::FeatureNotPresent), 0);
    }
}

/// Stand-in WebSocket backend installed until the embedder provides one.
struct UnsupportedWebSocketTransport;

impl WebSocketTransport for UnsupportedWebSocketTransport {
    fn connect(&self, websocket: WebSocketHandle, op: AsyncOp<WebSocketCompletionResult>) {
        let _ = op.complete(Ok(WebSocketCompletionResult {
            websocket,
            error: Some(HcError::FeatureNotPresent),
            platform_error_code: 0,
        }));
    }

    fn send_message(
        &self,
        websocket: WebSocketHandle,
        _message: &str,
        op: AsyncOp<WebSocketCompletionResult>,
    ) {
        let _ = op.complete(Ok(WebSocketCompletionResult {
            websocket,
            error: Some(HcError::FeatureNotPresent),
            platform_error_code: 0,
        }));
    }

    fn disconnect(&self, _websocket: WebSocketHandle, _close_status: CloseStatus) -> HcResult<()> {
        Err(HcError::FeatureNotPresent)
    }
}
