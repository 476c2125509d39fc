//! # hcnet
//!
//! A portable HTTP and WebSocket client core.
//!
//! `hcnet` owns the client-side plumbing around the network: refcounted
//! call and connection handles, a two-lane task queue driving async
//! operations, retry with jittered exponential backoff, a Retry-After
//! fast-fail cache, and serialized WebSocket sends. The network I/O
//! itself is pluggable: embedders install [`http::HttpTransport`] and
//! [`ws::WebSocketTransport`] backends at startup.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hcnet::http::HttpCall;
//! use hcnet::task::{AsyncOp, DispatchMode, TaskQueue};
//!
//! hcnet::global::init().unwrap();
//! hcnet::global::set_http_transport(my_transport).unwrap();
//!
//! let queue = TaskQueue::new(DispatchMode::Auto, DispatchMode::Auto);
//! let call = HttpCall::create().unwrap();
//! call.set_url("GET", "https://example.com").unwrap();
//!
//! let op = AsyncOp::with_completion(&queue, |op| {
//!     // runs on the completion lane once the terminal attempt lands
//! });
//! hcnet::http::perform(&call, &op).unwrap();
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error codes and refcounted handles
//! - [`task`] - Two-lane task queue and async operations
//! - [`http`] - HTTP call handle, retry policy, fast-fail cache
//! - [`ws`] - WebSocket handle with serialized sends
//! - [`global`] - Library lifetime, transports, and call defaults

pub mod base;
pub mod global;
pub mod http;
pub mod task;
pub mod ws;

pub use base::error::{HcError, HcResult};
