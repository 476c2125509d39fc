//! WebSocket surface: connect-once lifecycle, serialized sends, and
//! inbound delivery to the process-wide handlers.
//!
//! Outgoing messages are strictly ordered. At most one message is
//! handed to the transport at a time; the next dispatch happens inline
//! when the in-flight send's operation completes, so completion order
//! equals submission order regardless of how long each send takes.

mod close;
mod handle;

pub use close::CloseStatus;
pub use handle::{WebSocket, WebSocketCompletionResult, WebSocketHandle};

use crate::base::error::{HcError, HcResult};
use crate::global;
use crate::task::{AsyncOp, WorkOutcome};
use handle::PendingMessage;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Handler invoked for each inbound text message.
pub type WebSocketMessageHandler = Arc<dyn Fn(&WebSocketHandle, &str) + Send + Sync>;
/// Handler invoked when the connection closes.
pub type WebSocketCloseHandler = Arc<dyn Fn(&WebSocketHandle, CloseStatus) + Send + Sync>;

/// Pluggable network backend for WebSocket connections.
///
/// `connect` and `send_message` must not block: they start the work and
/// later complete `op` with a [`WebSocketCompletionResult`]. Connection
/// config (URI, sub-protocol, proxy, handshake headers) is read from the
/// handle. Inbound traffic is pushed through [`deliver_message`] and
/// [`deliver_close`].
pub trait WebSocketTransport: Send + Sync {
    fn connect(&self, websocket: WebSocketHandle, op: AsyncOp<WebSocketCompletionResult>);
    fn send_message(
        &self,
        websocket: WebSocketHandle,
        message: &str,
        op: AsyncOp<WebSocketCompletionResult>,
    );
    fn disconnect(&self, websocket: WebSocketHandle, close_status: CloseStatus) -> HcResult<()>;
}

/// Starts the connect handshake. A handle connects at most once; the
/// result record's `error` field reports handshake failure.
pub fn connect(
    websocket: &WebSocketHandle,
    uri: &str,
    sub_protocol: &str,
    op: &AsyncOp<WebSocketCompletionResult>,
) -> HcResult<()> {
    global::state()?;
    if uri.is_empty() {
        return Err(HcError::InvalidArg);
    }
    websocket.mark_connect_called(uri, sub_protocol)?;

    let for_hook = websocket.duplicate();
    op.set_internal_hook(move |result| {
        if let Ok(record) = result {
            if record.error.is_none() {
                for_hook.set_connected(true);
            }
        }
    });

    let for_step = websocket.duplicate();
    op.begin(move |op| match global::state() {
        Ok(global) => {
            global
                .websocket_transport()
                .connect(for_step.duplicate(), op.clone());
            WorkOutcome::Pending
        }
        Err(err) => WorkOutcome::Completed(Err(err)),
    })
}

/// Queues a text message for sending. Sends are serialized per handle.
pub fn send_message(
    websocket: &WebSocketHandle,
    message: &str,
    op: &AsyncOp<WebSocketCompletionResult>,
) -> HcResult<()> {
    global::state()?;
    if message.is_empty() {
        return Err(HcError::InvalidArg);
    }
    if !websocket.is_connected() {
        return Err(HcError::NotInitialized);
    }

    let depth = websocket.queue_outgoing(PendingMessage {
        message: message.to_owned(),
        op: op.clone(),
    });
    tracing::trace!(ws_id = websocket.id(), depth, "queued outgoing message");
    pump_outgoing(websocket);
    Ok(())
}

/// Disconnects a connected handle. Synchronous; the close handler fires
/// later when the transport observes the close on the wire.
pub fn disconnect(websocket: &WebSocketHandle, close_status: CloseStatus) -> HcResult<()> {
    let global = global::state()?;
    if !websocket.is_connected() {
        return Err(HcError::NotInitialized);
    }
    global
        .websocket_transport()
        .disconnect(websocket.duplicate(), close_status)?;
    websocket.set_connected(false);
    Ok(())
}

/// Transport entry point: hands an inbound text message to the
/// process-wide message handler. A panicking handler is logged and
/// dropped; delivery continues for later messages.
pub fn deliver_message(websocket: &WebSocketHandle, message: &str) {
    let Ok(global) = global::state() else { return };
    let Some(handler) = global.websocket_message_handler() else {
        return;
    };
    if catch_unwind(AssertUnwindSafe(|| handler(websocket, message))).is_err() {
        tracing::warn!(ws_id = websocket.id(), "message handler panicked");
    }
}

/// Transport entry point: reports the connection closed with `status`.
pub fn deliver_close(websocket: &WebSocketHandle, status: CloseStatus) {
    websocket.set_connected(false);
    let Ok(global) = global::state() else { return };
    let Some(handler) = global.websocket_close_handler() else {
        return;
    };
    if catch_unwind(AssertUnwindSafe(|| handler(websocket, status))).is_err() {
        tracing::warn!(ws_id = websocket.id(), "close handler panicked");
    }
}

/// Dispatches the next queued message if none is in flight. Re-entered
/// from the in-flight operation's completion hook, which is what chains
/// sends one at a time.
fn pump_outgoing(websocket: &WebSocketHandle) {
    let Some(pending) = websocket.take_next_outgoing() else {
        return;
    };

    let for_hook = websocket.duplicate();
    pending.op.set_internal_hook(move |_| {
        for_hook.finish_outgoing();
        pump_outgoing(&for_hook);
    });

    let for_step = websocket.duplicate();
    let message = pending.message;
    let begun = pending.op.begin(move |op| match global::state() {
        Ok(global) => {
            global
                .websocket_transport()
                .send_message(for_step.duplicate(), &message, op.clone());
            WorkOutcome::Pending
        }
        Err(err) => WorkOutcome::Completed(Err(err)),
    });
    if let Err(err) = begun {
        // Completion hook still runs here, unblocking the queue.
        let _ = pending.op.complete(Err(err));
    }
}
