//! Asynchronous task dispatch.
//!
//! The heart of the engine: a two-lane [`queue::TaskQueue`] (work and
//! completion, each automatic or caller-pumped) and the [`op::AsyncOp`]
//! lifecycle that rides on it. All transport invocations and retry backoff
//! steps flow through the work lane; results surface on the completion lane.

pub mod op;
pub mod queue;

pub use op::{AsyncOp, WorkOutcome};
pub use queue::{DispatchMode, Lane, TaskQueue, TaskStatus, TaskTicket};
