use hcnet::base::error::{HcError, HcResult};
use hcnet::global;
use hcnet::task::{AsyncOp, DispatchMode, Lane, TaskQueue};
use hcnet::ws::{
    self, CloseStatus, WebSocket, WebSocketCompletionResult, WebSocketHandle, WebSocketTransport,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

static TEST_LOCK: Mutex<()> = Mutex::new(());

fn init_guard() -> MutexGuard<'static, ()> {
    let guard = TEST_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    global::cleanup();
    global::init().unwrap();
    guard
}

fn ok_result(websocket: WebSocketHandle) -> WebSocketCompletionResult {
    WebSocketCompletionResult {
        websocket,
        error: None,
        platform_error_code: 0,
    }
}

/// Transport that connects immediately and completes each send on a
/// worker thread after a per-message delay. Delays shrink with each
/// message, so out-of-order completion would be observed if sends were
/// not serialized.
struct SlowSendTransport {
    sent: Arc<Mutex<Vec<String>>>,
    delays: Mutex<Vec<Duration>>,
}

impl SlowSendTransport {
    fn new(delays: Vec<Duration>) -> Arc<Self> {
        Arc::new(Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            delays: Mutex::new(delays),
        })
    }
}

impl WebSocketTransport for SlowSendTransport {
    fn connect(&self, websocket: WebSocketHandle, op: AsyncOp<WebSocketCompletionResult>) {
        let _ = op.complete(Ok(ok_result(websocket)));
    }

    fn send_message(
        &self,
        websocket: WebSocketHandle,
        message: &str,
        op: AsyncOp<WebSocketCompletionResult>,
    ) {
        let delay = {
            let mut delays = self.delays.lock().unwrap();
            if delays.is_empty() {
                Duration::ZERO
            } else {
                delays.remove(0)
            }
        };
        let sent = self.sent.clone();
        let message = message.to_owned();
        thread::spawn(move || {
            thread::sleep(delay);
            sent.lock().unwrap().push(message);
            let _ = op.complete(Ok(ok_result(websocket)));
        });
    }

    fn disconnect(&self, _websocket: WebSocketHandle, _close_status: CloseStatus) -> HcResult<()> {
        Ok(())
    }
}

fn connect_ws(queue: &TaskQueue, uri: &str) -> WebSocketHandle {
    let websocket = WebSocket::create().unwrap();
    let op = AsyncOp::new(queue);
    ws::connect(&websocket, uri, "", &op).unwrap();
    let end = std::time::Instant::now() + Duration::from_secs(2);
    while !op.is_completed() && std::time::Instant::now() < end {
        queue.dispatch(Lane::Work, Duration::from_millis(20));
    }
    let record = op.get_result().unwrap();
    assert!(record.error.is_none());
    assert!(websocket.is_connected());
    websocket
}

#[test]
fn test_connect_sets_connected() {
    let _guard = init_guard();
    global::set_websocket_transport(SlowSendTransport::new(vec![])).unwrap();
    let queue = TaskQueue::new(DispatchMode::Manual, DispatchMode::Manual);

    let websocket = connect_ws(&queue, "wss://example.com/chat");
    assert_eq!(websocket.uri(), "wss://example.com/chat");
    global::cleanup();
}

#[test]
fn test_connect_twice_rejected() {
    let _guard = init_guard();
    global::set_websocket_transport(SlowSendTransport::new(vec![])).unwrap();
    let queue = TaskQueue::new(DispatchMode::Manual, DispatchMode::Manual);

    let websocket = connect_ws(&queue, "wss://example.com/chat");
    let op = AsyncOp::new(&queue);
    assert_eq!(
        ws::connect(&websocket, "wss://example.com/other", "", &op).unwrap_err(),
        HcError::ConnectAlreadyCalled
    );
    global::cleanup();
}

#[test]
fn test_sends_complete_in_submission_order() {
    let _guard = init_guard();
    // First message slowest, third fastest. Serialized dispatch must
    // still deliver M1, M2, M3.
    let transport = SlowSendTransport::new(vec![
        Duration::from_millis(120),
        Duration::from_millis(40),
        Duration::ZERO,
    ]);
    global::set_websocket_transport(transport.clone()).unwrap();
    let queue = TaskQueue::new(DispatchMode::Auto, DispatchMode::Auto);

    let websocket = {
        let websocket = WebSocket::create().unwrap();
        let op = AsyncOp::new(&queue);
        ws::connect(&websocket, "wss://example.com/chat", "", &op).unwrap();
        let end = std::time::Instant::now() + Duration::from_secs(2);
        while !websocket.is_connected() && std::time::Instant::now() < end {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(websocket.is_connected());
        websocket
    };

    let ops: Vec<_> = ["M1", "M2", "M3"]
        .iter()
        .map(|message| {
            let op = AsyncOp::new(&queue);
            ws::send_message(&websocket, message, &op).unwrap();
            op
        })
        .collect();

    let end = std::time::Instant::now() + Duration::from_secs(5);
    while std::time::Instant::now() < end && !ops.iter().all(|op| op.is_completed()) {
        thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(*transport.sent.lock().unwrap(), vec!["M1", "M2", "M3"]);
    global::cleanup();
}

#[test]
fn test_send_requires_connection() {
    let _guard = init_guard();
    global::set_websocket_transport(SlowSendTransport::new(vec![])).unwrap();
    let queue = TaskQueue::new(DispatchMode::Manual, DispatchMode::Manual);

    let websocket = WebSocket::create().unwrap();
    let op = AsyncOp::new(&queue);
    assert_eq!(
        ws::send_message(&websocket, "hello", &op).unwrap_err(),
        HcError::NotInitialized
    );
    global::cleanup();
}

#[test]
fn test_empty_message_rejected() {
    let _guard = init_guard();
    global::set_websocket_transport(SlowSendTransport::new(vec![])).unwrap();
    let queue = TaskQueue::new(DispatchMode::Manual, DispatchMode::Manual);

    let websocket = connect_ws(&queue, "wss://example.com/chat");
    let op = AsyncOp::new(&queue);
    assert_eq!(
        ws::send_message(&websocket, "", &op).unwrap_err(),
        HcError::InvalidArg
    );
    global::cleanup();
}

#[test]
fn test_disconnect_clears_connected() {
    let _guard = init_guard();
    global::set_websocket_transport(SlowSendTransport::new(vec![])).unwrap();
    let queue = TaskQueue::new(DispatchMode::Manual, DispatchMode::Manual);

    let websocket = connect_ws(&queue, "wss://example.com/chat");
    ws::disconnect(&websocket, CloseStatus::NORMAL).unwrap();
    assert!(!websocket.is_connected());
    assert_eq!(
        ws::disconnect(&websocket, CloseStatus::NORMAL).unwrap_err(),
        HcError::NotInitialized
    );
    global::cleanup();
}

#[test]
fn test_inbound_delivery_and_panicking_handler() {
    let _guard = init_guard();
    global::set_websocket_transport(SlowSendTransport::new(vec![])).unwrap();
    let queue = TaskQueue::new(DispatchMode::Manual, DispatchMode::Manual);
    let websocket = connect_ws(&queue, "wss://example.com/chat");

    let received = Arc::new(Mutex::new(Vec::<String>::new()));
    let closes = Arc::new(AtomicUsize::new(0));
    {
        let received = received.clone();
        let closes = closes.clone();
        global::set_websocket_handlers(
            Some(Arc::new(move |_ws, message: &str| {
                if message == "boom" {
                    panic!("handler failure");
                }
                received.lock().unwrap().push(message.to_owned());
            })),
            Some(Arc::new(move |_ws, _status| {
                closes.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .unwrap();
    }

    ws::deliver_message(&websocket, "first");
    // Panicking handler is swallowed; later messages still arrive.
    ws::deliver_message(&websocket, "boom");
    ws::deliver_message(&websocket, "second");
    assert_eq!(*received.lock().unwrap(), vec!["first", "second"]);

    ws::deliver_close(&websocket, CloseStatus::GOING_AWAY);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert!(!websocket.is_connected());
    global::cleanup();
}
