//! Asynchronous operation lifecycle.
//!
//! An [`AsyncOp`] identifies one invocation of an asynchronous verb (HTTP
//! perform, WebSocket connect, WebSocket send). The verb supplies a do-work
//! provider; the op schedules it onto the owning queue's work lane, collects
//! the result, and delivers the completion callback on the completion lane.
//!
//! State machine: `Created → Scheduled → Executing → Completed`, where the
//! provider may keep the op in `Executing` by rescheduling itself with a
//! delay — the hook the retry engine uses to back off without blocking a
//! thread.

use crate::base::error::{HcError, HcResult};
use crate::base::handle::next_id;
use crate::task::queue::{Lane, TaskQueue, TaskStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a do-work step decided.
pub enum WorkOutcome<R> {
    /// The operation is done; deliver this result.
    Completed(HcResult<R>),
    /// Run the do-work step again after the delay (retry backoff).
    Reschedule(Duration),
    /// An external party (a transport) will call [`AsyncOp::complete`]
    /// later.
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Scheduled,
    Executing,
    Completed,
}

type CompletionFn<R> = Box<dyn FnOnce(&AsyncOp<R>) + Send>;
type ProviderFn<R> = Box<dyn FnMut(&AsyncOp<R>) -> WorkOutcome<R> + Send>;
type HookFn<R> = Box<dyn FnOnce(&HcResult<R>) + Send>;

struct OpInner<R> {
    id: u64,
    queue: TaskQueue,
    canceled: AtomicBool,
    phase: Mutex<Phase>,
    provider: Mutex<Option<ProviderFn<R>>>,
    completion: Mutex<Option<CompletionFn<R>>>,
    hook: Mutex<Option<HookFn<R>>>,
    result: Mutex<Option<HcResult<R>>>,
}

/// One asynchronous verb invocation bound to a queue.
///
/// Cheap to clone; all clones observe the same operation. The stored result
/// is taken by exactly one [`AsyncOp::get_result`] call.
pub struct AsyncOp<R> {
    inner: Arc<OpInner<R>>,
}

impl<R> Clone for AsyncOp<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Send + 'static> AsyncOp<R> {
    pub fn new(queue: &TaskQueue) -> Self {
        Self::build(queue, None)
    }

    /// Creates an op whose completion callback runs on the queue's
    /// completion lane once the result is ready.
    pub fn with_completion(
        queue: &TaskQueue,
        completion: impl FnOnce(&AsyncOp<R>) + Send + 'static,
    ) -> Self {
        Self::build(queue, Some(Box::new(completion)))
    }

    fn build(queue: &TaskQueue, completion: Option<CompletionFn<R>>) -> Self {
        Self {
            inner: Arc::new(OpInner {
                id: next_id(),
                queue: queue.clone(),
                canceled: AtomicBool::new(false),
                phase: Mutex::new(Phase::Created),
                provider: Mutex::new(None),
                completion: Mutex::new(completion),
                hook: Mutex::new(None),
                result: Mutex::new(None),
            }),
        }
    }

    /// Correlation id, unique across the process.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.inner.queue
    }

    /// Binds the do-work provider and schedules the first step onto the
    /// work lane.
    ///
    /// Valid only once per op; a second `begin` fails with
    /// [`HcError::InvalidState`].
    pub fn begin(
        &self,
        provider: impl FnMut(&AsyncOp<R>) -> WorkOutcome<R> + Send + 'static,
    ) -> HcResult<()> {
        {
            let mut phase = self.inner.phase.lock().unwrap();
            if *phase != Phase::Created {
                return Err(HcError::InvalidState);
            }
            *phase = Phase::Scheduled;
        }
        *self.inner.provider.lock().unwrap() = Some(Box::new(provider));
        self.submit_step(Duration::ZERO)
    }

    /// Marks the op canceled. A step that has not yet executed
    /// short-circuits into completion with [`HcError::Canceled`].
    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::SeqCst)
    }

    pub fn is_completed(&self) -> bool {
        *self.inner.phase.lock().unwrap() == Phase::Completed
    }

    /// Completes the op from outside the do-work step (the path transports
    /// use after [`WorkOutcome::Pending`]). Exactly-once: completing an
    /// already-completed op fails with [`HcError::InvalidState`].
    pub fn complete(&self, result: HcResult<R>) -> HcResult<()> {
        {
            let mut phase = self.inner.phase.lock().unwrap();
            if *phase == Phase::Completed {
                return Err(HcError::InvalidState);
            }
            // The hook and the result store land before the phase flip is
            // observable: `is_completed()` implies the result is in the
            // slot. Hooks must not touch this op's phase or result.
            if let Some(hook) = self.inner.hook.lock().unwrap().take() {
                hook(&result);
            }
            *self.inner.result.lock().unwrap() = Some(result);
            *phase = Phase::Completed;
        }

        if let Some(completion) = self.inner.completion.lock().unwrap().take() {
            let op = self.clone();
            let submitted =
                self.inner
                    .queue
                    .submit(Lane::Completion, Duration::ZERO, move |_| {
                        completion(&op);
                    });
            if submitted.is_err() {
                tracing::warn!(id = self.inner.id, "completion dropped; queue closed");
            }
        }
        Ok(())
    }

    /// Takes the operation's result.
    ///
    /// Fails with [`HcError::Pending`] before completion and with
    /// [`HcError::InvalidState`] once the result has already been taken.
    pub fn get_result(&self) -> HcResult<R> {
        if !self.is_completed() {
            return Err(HcError::Pending);
        }
        match self.inner.result.lock().unwrap().take() {
            Some(result) => result,
            None => Err(HcError::InvalidState),
        }
    }

    /// Engine-internal: observe the result inline at completion time,
    /// before the completion callback is queued.
    pub(crate) fn set_internal_hook(&self, hook: impl FnOnce(&HcResult<R>) + Send + 'static) {
        *self.inner.hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Engine-internal: re-submit the do-work step after `delay` while
    /// remaining in the executing phase.
    pub(crate) fn reschedule(&self, delay: Duration) -> HcResult<()> {
        self.submit_step(delay)
    }

    fn submit_step(&self, delay: Duration) -> HcResult<()> {
        let op = self.clone();
        self.inner
            .queue
            .submit(Lane::Work, delay, move |status| op.step(status))
            .map(|_ticket| ())
    }

    fn step(&self, status: TaskStatus) {
        if status == TaskStatus::Canceled || self.is_canceled() {
            let _ = self.complete(Err(HcError::Canceled));
            return;
        }
        {
            let mut phase = self.inner.phase.lock().unwrap();
            if *phase == Phase::Completed {
                return;
            }
            *phase = Phase::Executing;
        }

        let provider = self.inner.provider.lock().unwrap().take();
        let Some(mut provider) = provider else {
            return;
        };
        match provider(self) {
            WorkOutcome::Completed(result) => {
                let _ = self.complete(result);
            }
            WorkOutcome::Reschedule(delay) => {
                *self.inner.provider.lock().unwrap() = Some(provider);
                if self.submit_step(delay).is_err() {
                    let _ = self.complete(Err(HcError::Canceled));
                }
            }
            WorkOutcome::Pending => {
                *self.inner.provider.lock().unwrap() = Some(provider);
            }
        }
    }
}
