//! WebSocket handle state: connection config, flags, and the serialized
//! outgoing queue.

use crate::base::error::{HcError, HcResult};
use crate::base::handle::{next_id, Handle};
use crate::global;
use crate::http::headers::HeaderMap;
use crate::task::AsyncOp;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Reference-counted handle to a [`WebSocket`].
pub type WebSocketHandle = Handle<WebSocket>;

/// Outcome record delivered when a connect or send operation finishes.
///
/// Operation-level `Err` is reserved for usage errors and cancelation;
/// transport failure travels in the `error` field, mirroring the way an
/// HTTP call reports through its response fields.
pub struct WebSocketCompletionResult {
    pub websocket: WebSocketHandle,
    pub error: Option<HcError>,
    pub platform_error_code: u32,
}

#[derive(Debug, Default)]
struct WsConfig {
    uri: String,
    sub_protocol: String,
    proxy_uri: String,
    headers: HeaderMap,
}

pub(super) struct PendingMessage {
    pub(super) message: String,
    pub(super) op: AsyncOp<WebSocketCompletionResult>,
}

#[derive(Default)]
struct Outgoing {
    queue: VecDeque<PendingMessage>,
    in_flight: bool,
}

/// One WebSocket connection.
pub struct WebSocket {
    id: u64,
    config: Mutex<WsConfig>,
    connect_called: AtomicBool,
    connected: AtomicBool,
    outgoing: Mutex<Outgoing>,
}

impl WebSocket {
    /// Creates a new WebSocket handle. Requires global init.
    pub fn create() -> HcResult<WebSocketHandle> {
        global::state()?;
        Ok(Handle::new(Self {
            id: next_id(),
            config: Mutex::new(WsConfig::default()),
            connect_called: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            outgoing: Mutex::new(Outgoing::default()),
        }))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Target URI, set at connect time.
    pub fn uri(&self) -> String {
        self.config.lock().unwrap().uri.clone()
    }

    /// Negotiated sub-protocol request, set at connect time.
    pub fn sub_protocol(&self) -> String {
        self.config.lock().unwrap().sub_protocol.clone()
    }

    pub fn set_proxy_uri(&self, proxy_uri: &str) -> HcResult<()> {
        self.ensure_mutable()?;
        self.config.lock().unwrap().proxy_uri = proxy_uri.to_owned();
        Ok(())
    }

    pub fn proxy_uri(&self) -> String {
        self.config.lock().unwrap().proxy_uri.clone()
    }

    /// Adds a handshake header. Must be called before connect.
    pub fn set_header(&self, name: &str, value: &str) -> HcResult<()> {
        self.ensure_mutable()?;
        self.config.lock().unwrap().headers.set(name, value)
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.config.lock().unwrap().headers.get(name).map(str::to_owned)
    }

    pub fn headers_len(&self) -> usize {
        self.config.lock().unwrap().headers.len()
    }

    pub fn header_at(&self, index: usize) -> Option<(String, String)> {
        self.config
            .lock()
            .unwrap()
            .headers
            .get_at(index)
            .map(|(n, v)| (n.to_owned(), v.to_owned()))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn ensure_mutable(&self) -> HcResult<()> {
        if self.connect_called.load(Ordering::SeqCst) {
            Err(HcError::InvalidState)
        } else {
            Ok(())
        }
    }

    pub(super) fn mark_connect_called(&self, uri: &str, sub_protocol: &str) -> HcResult<()> {
        if self.connect_called.swap(true, Ordering::SeqCst) {
            return Err(HcError::ConnectAlreadyCalled);
        }
        let mut config = self.config.lock().unwrap();
        config.uri = uri.to_owned();
        config.sub_protocol = sub_protocol.to_owned();
        Ok(())
    }

    pub(super) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Appends to the outgoing queue; returns the queue depth after the
    /// push, counting any in-flight message.
    pub(super) fn queue_outgoing(&self, pending: PendingMessage) -> usize {
        let mut outgoing = self.outgoing.lock().unwrap();
        outgoing.queue.push_back(pending);
        outgoing.queue.len() + usize::from(outgoing.in_flight)
    }

    /// Pops the next message and marks it in flight, unless a send is
    /// already in flight.
    pub(super) fn take_next_outgoing(&self) -> Option<PendingMessage> {
        let mut outgoing = self.outgoing.lock().unwrap();
        if outgoing.in_flight {
            return None;
        }
        let pending = outgoing.queue.pop_front()?;
        outgoing.in_flight = true;
        Some(pending)
    }

    pub(super) fn finish_outgoing(&self) {
        self.outgoing.lock().unwrap().in_flight = false;
    }
}

// The outgoing queue holds operation clones, so this cannot be derived.
impl fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocket")
            .field("id", &self.id)
            .field("connect_called", &self.connect_called.load(Ordering::SeqCst))
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
