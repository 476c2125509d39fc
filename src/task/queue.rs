//! Two-lane asynchronous task queue.
//!
//! A queue owns two ordered lanes: the *work* lane, where transport and
//! retry steps execute, and the *completion* lane, where results are
//! delivered to the caller's chosen thread. Each lane dispatches either
//! automatically on a dedicated background thread or manually when the
//! caller pumps it with [`TaskQueue::dispatch`].

use crate::base::error::{HcError, HcResult};
use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How a lane makes progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// The queue owns a dedicated thread that drains the lane as tasks
    /// fall due.
    Auto,
    /// Nothing runs until the caller invokes [`TaskQueue::dispatch`].
    Manual,
}

/// The two task lanes of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Work,
    Completion,
}

/// Why a task callback is being invoked.
///
/// Canceled tasks are never silently discarded; their callback still runs
/// exactly once with [`TaskStatus::Canceled`] so held resources (pending
/// operations, duplicated handles) are released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Ready,
    Canceled,
}

type TaskFn = Box<dyn FnOnce(TaskStatus) + Send>;

struct Entry {
    due: Instant,
    seq: u64,
    canceled: Arc<AtomicBool>,
    run: TaskFn,
}

impl Entry {
    fn status(&self) -> TaskStatus {
        if self.canceled.load(Ordering::SeqCst) {
            TaskStatus::Canceled
        } else {
            TaskStatus::Ready
        }
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Due-instant first, then submission order. Seqs are unique, so two
        // entries never compare equal.
        self.due.cmp(&other.due).then(self.seq.cmp(&other.seq))
    }
}

struct LaneInner {
    heap: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
    closed: bool,
}

struct LaneState {
    mode: DispatchMode,
    inner: Mutex<LaneInner>,
    cond: Condvar,
}

impl LaneState {
    fn new(mode: DispatchMode) -> Self {
        Self {
            mode,
            inner: Mutex::new(LaneInner {
                heap: BinaryHeap::new(),
                next_seq: 0,
                closed: false,
            }),
            cond: Condvar::new(),
        }
    }
}

struct QueueShared {
    work: LaneState,
    completion: LaneState,
    handles: AtomicUsize,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl QueueShared {
    fn lane(&self, lane: Lane) -> &LaneState {
        match lane {
            Lane::Work => &self.work,
            Lane::Completion => &self.completion,
        }
    }
}

/// Handle to a shared two-lane task queue.
///
/// Cloning produces another handle to the same queue; the queue closes when
/// [`TaskQueue::close`] is called or the last handle drops, at which point
/// every outstanding task is signaled as canceled and the lane threads are
/// joined.
pub struct TaskQueue {
    shared: Arc<QueueShared>,
}

impl TaskQueue {
    pub fn new(work_mode: DispatchMode, completion_mode: DispatchMode) -> Self {
        let shared = Arc::new(QueueShared {
            work: LaneState::new(work_mode),
            completion: LaneState::new(completion_mode),
            handles: AtomicUsize::new(1),
            threads: Mutex::new(Vec::new()),
        });

        let mut threads = Vec::new();
        if work_mode == DispatchMode::Auto {
            threads.push(spawn_lane_thread(&shared, Lane::Work));
        }
        if completion_mode == DispatchMode::Auto {
            threads.push(spawn_lane_thread(&shared, Lane::Completion));
        }
        *shared.threads.lock().unwrap() = threads;

        Self { shared }
    }

    /// Submits a task to a lane, to run no earlier than `delay` from now.
    ///
    /// Tasks within one lane run in submission order among those due. Fails
    /// with [`HcError::InvalidState`] once the queue is closed.
    pub fn submit(
        &self,
        lane: Lane,
        delay: Duration,
        task: impl FnOnce(TaskStatus) + Send + 'static,
    ) -> HcResult<TaskTicket> {
        let state = self.shared.lane(lane);
        let canceled = Arc::new(AtomicBool::new(false));
        {
            let mut inner = state.inner.lock().unwrap();
            if inner.closed {
                return Err(HcError::InvalidState);
            }
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.heap.push(Reverse(Entry {
                due: Instant::now() + delay,
                seq,
                canceled: canceled.clone(),
                run: Box::new(task),
            }));
        }
        state.cond.notify_all();
        Ok(TaskTicket {
            canceled,
            shared: Arc::downgrade(&self.shared),
            lane,
        })
    }

    /// Manually pumps one task from a lane.
    ///
    /// Runs at most one task, waiting up to `timeout` for one to become
    /// due. Returns whether a task was processed; `false` means no runnable
    /// task remained within the timeout.
    pub fn dispatch(&self, lane: Lane, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        match wait_for_entry(self.shared.lane(lane), Some(deadline)) {
            Some(entry) => {
                let status = entry.status();
                (entry.run)(status);
                true
            }
            None => false,
        }
    }

    /// Closes the queue.
    ///
    /// Every task still pending in either lane is signaled with
    /// [`TaskStatus::Canceled`], automatic lane threads drain and exit, and
    /// further submissions fail. Safe to call more than once.
    pub fn close(&self) {
        close_shared(&self.shared);
    }

    pub fn work_mode(&self) -> DispatchMode {
        self.shared.work.mode
    }

    pub fn completion_mode(&self) -> DispatchMode {
        self.shared.completion.mode
    }
}

impl Clone for TaskQueue {
    fn clone(&self) -> Self {
        self.shared.handles.fetch_add(1, Ordering::SeqCst);
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        if self.shared.handles.fetch_sub(1, Ordering::SeqCst) == 1 {
            close_shared(&self.shared);
        }
    }
}

/// Cancellation ticket for a submitted task.
///
/// Canceling marks the task so the queue skips its body; the task callback
/// still fires once with [`TaskStatus::Canceled`].
#[derive(Debug)]
pub struct TaskTicket {
    canceled: Arc<AtomicBool>,
    shared: Weak<QueueShared>,
    lane: Lane,
}

impl TaskTicket {
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        if let Some(shared) = self.shared.upgrade() {
            shared.lane(self.lane).cond.notify_all();
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

fn spawn_lane_thread(shared: &Arc<QueueShared>, lane: Lane) -> JoinHandle<()> {
    let shared = Arc::clone(shared);
    thread::Builder::new()
        .name(format!("hcnet-queue-{:?}", lane).to_lowercase())
        .spawn(move || run_lane(shared, lane))
        .expect("failed to spawn queue lane thread")
}

fn run_lane(shared: Arc<QueueShared>, lane: Lane) {
    let state = shared.lane(lane);
    loop {
        match wait_for_entry(state, None) {
            Some(entry) => {
                let status = entry.status();
                (entry.run)(status);
            }
            None => break, // closed and drained
        }
    }
    tracing::debug!(?lane, "queue lane thread exiting");
}

/// Pops the next runnable entry from a lane.
///
/// With `deadline: None` (automatic threads) this blocks until a task is
/// due or the lane is closed and empty. With a deadline (manual dispatch)
/// it gives up once the deadline passes. Closed lanes yield any remaining
/// entries so they can be signaled as canceled by the caller.
fn wait_for_entry(state: &LaneState, deadline: Option<Instant>) -> Option<Entry> {
    let mut inner = state.inner.lock().unwrap();
    loop {
        let now = Instant::now();
        let next_due = inner.heap.peek().map(|Reverse(e)| e.due);

        if let Some(due) = next_due {
            // Closed lanes and canceled tasks run immediately regardless of
            // their requested delay; the callback sees Canceled.
            let runnable = due <= now
                || inner.closed
                || inner
                    .heap
                    .peek()
                    .map(|Reverse(e)| e.canceled.load(Ordering::SeqCst))
                    .unwrap_or(false);
            if runnable {
                let Reverse(entry) = inner.heap.pop().unwrap();
                if inner.closed {
                    entry.canceled.store(true, Ordering::SeqCst);
                }
                return Some(entry);
            }
        } else if inner.closed {
            return None;
        }

        let wait_until = match (next_due, deadline) {
            (Some(due), Some(dl)) => due.min(dl),
            (Some(due), None) => due,
            (None, Some(dl)) => dl,
            (None, None) => {
                inner = state.cond.wait(inner).unwrap();
                continue;
            }
        };
        if let Some(dl) = deadline {
            if now >= dl {
                return None;
            }
        }
        let wait = wait_until.saturating_duration_since(now);
        if wait.is_zero() {
            // Deadline reached with nothing due.
            if deadline.is_some() {
                return None;
            }
            continue;
        }
        let (guard, _timed_out) = state.cond.wait_timeout(inner, wait).unwrap();
        inner = guard;
    }
}

fn close_shared(shared: &Arc<QueueShared>) {
    for lane in [Lane::Work, Lane::Completion] {
        let state = shared.lane(lane);
        let drained: Vec<Entry> = {
            let mut inner = state.inner.lock().unwrap();
            if inner.closed && inner.heap.is_empty() {
                continue;
            }
            inner.closed = true;
            match state.mode {
                // Manual lanes have no thread to drain them.
                DispatchMode::Manual => inner.heap.drain().map(|Reverse(e)| e).collect(),
                DispatchMode::Auto => Vec::new(),
            }
        };
        state.cond.notify_all();
        for entry in drained {
            (entry.run)(TaskStatus::Canceled);
        }
    }

    let threads = std::mem::take(&mut *shared.threads.lock().unwrap());
    let current = thread::current().id();
    for handle in threads {
        if handle.thread().id() != current {
            let _ = handle.join();
        }
        // A task closing its own queue cannot join its own lane thread;
        // the thread exits on its own once the lane drains.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn manual_queue() -> TaskQueue {
        TaskQueue::new(DispatchMode::Manual, DispatchMode::Manual)
    }

    #[test]
    fn test_manual_fifo_order() {
        let queue = manual_queue();
        let (tx, rx) = mpsc::channel();
        for i in 0..5 {
            let tx = tx.clone();
            queue
                .submit(Lane::Work, Duration::ZERO, move |_| {
                    tx.send(i).unwrap();
                })
                .unwrap();
        }
        while queue.dispatch(Lane::Work, Duration::ZERO) {}
        let order: Vec<i32> = rx.try_iter().collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_dispatch_returns_false_when_empty() {
        let queue = manual_queue();
        assert!(!queue.dispatch(Lane::Work, Duration::ZERO));
        queue
            .submit(Lane::Work, Duration::ZERO, |_| {})
            .unwrap();
        assert!(queue.dispatch(Lane::Work, Duration::ZERO));
        assert!(!queue.dispatch(Lane::Work, Duration::ZERO));
    }

    #[test]
    fn test_lanes_are_independent() {
        let queue = manual_queue();
        let (tx, rx) = mpsc::channel();
        let tx2 = tx.clone();
        queue
            .submit(Lane::Completion, Duration::ZERO, move |_| {
                tx2.send("completion").unwrap();
            })
            .unwrap();
        queue
            .submit(Lane::Work, Duration::ZERO, move |_| {
                tx.send("work").unwrap();
            })
            .unwrap();

        // Drain work first, then completion; each lane only sees its own.
        while queue.dispatch(Lane::Work, Duration::ZERO) {}
        assert_eq!(rx.try_recv().unwrap(), "work");
        while queue.dispatch(Lane::Completion, Duration::ZERO) {}
        assert_eq!(rx.try_recv().unwrap(), "completion");
    }

    #[test]
    fn test_delayed_task_not_due_early() {
        let queue = manual_queue();
        queue
            .submit(Lane::Work, Duration::from_millis(200), |_| {})
            .unwrap();
        assert!(!queue.dispatch(Lane::Work, Duration::ZERO));
        // Waiting long enough makes it due.
        assert!(queue.dispatch(Lane::Work, Duration::from_secs(2)));
    }

    #[test]
    fn test_delay_ordering_overrides_submission() {
        let queue = manual_queue();
        let (tx, rx) = mpsc::channel();
        let tx1 = tx.clone();
        queue
            .submit(Lane::Work, Duration::from_millis(100), move |_| {
                tx1.send("slow").unwrap();
            })
            .unwrap();
        queue
            .submit(Lane::Work, Duration::ZERO, move |_| {
                tx.send("fast").unwrap();
            })
            .unwrap();
        assert!(queue.dispatch(Lane::Work, Duration::from_secs(1)));
        assert!(queue.dispatch(Lane::Work, Duration::from_secs(1)));
        assert_eq!(rx.try_recv().unwrap(), "fast");
        assert_eq!(rx.try_recv().unwrap(), "slow");
    }

    #[test]
    fn test_canceled_task_signaled_once() {
        let queue = manual_queue();
        let (tx, rx) = mpsc::channel();
        let ticket = queue
            .submit(Lane::Work, Duration::ZERO, move |status| {
                tx.send(status).unwrap();
            })
            .unwrap();
        ticket.cancel();
        assert!(queue.dispatch(Lane::Work, Duration::ZERO));
        assert_eq!(rx.try_recv().unwrap(), TaskStatus::Canceled);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_submit_after_close_fails() {
        let queue = manual_queue();
        queue.close();
        let err = queue
            .submit(Lane::Work, Duration::ZERO, |_| {})
            .unwrap_err();
        assert_eq!(err, HcError::InvalidState);
    }

    #[test]
    fn test_close_drains_pending_as_canceled() {
        let queue = manual_queue();
        let (tx, rx) = mpsc::channel();
        queue
            .submit(Lane::Work, Duration::from_secs(60), move |status| {
                tx.send(status).unwrap();
            })
            .unwrap();
        queue.close();
        assert_eq!(rx.try_recv().unwrap(), TaskStatus::Canceled);
        // Idempotent.
        queue.close();
    }

    #[test]
    fn test_auto_work_lane_runs_tasks() {
        let queue = TaskQueue::new(DispatchMode::Auto, DispatchMode::Manual);
        let (tx, rx) = mpsc::channel();
        queue
            .submit(Lane::Work, Duration::ZERO, move |status| {
                tx.send(status).unwrap();
            })
            .unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            TaskStatus::Ready
        );
        queue.close();
    }

    #[test]
    fn test_auto_lane_respects_delay() {
        let queue = TaskQueue::new(DispatchMode::Auto, DispatchMode::Manual);
        let (tx, rx) = mpsc::channel();
        let submitted = Instant::now();
        queue
            .submit(Lane::Work, Duration::from_millis(150), move |_| {
                tx.send(Instant::now()).unwrap();
            })
            .unwrap();
        let ran_at = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(ran_at.duration_since(submitted) >= Duration::from_millis(150));
        queue.close();
    }

    #[test]
    fn test_clone_shares_queue() {
        let queue = manual_queue();
        let clone = queue.clone();
        let (tx, rx) = mpsc::channel();
        clone
            .submit(Lane::Work, Duration::ZERO, move |_| {
                tx.send(()).unwrap();
            })
            .unwrap();
        assert!(queue.dispatch(Lane::Work, Duration::ZERO));
        assert!(rx.try_recv().is_ok());
    }
}
