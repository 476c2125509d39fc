//! HTTP call surface: handle, headers, perform flow, retry policy, and
//! the Retry-After fast-fail cache.

pub mod call;
pub mod headers;
pub mod perform;
pub mod retry;
pub mod retry_after_cache;

pub use call::{HttpCall, HttpCallHandle};
pub use headers::HeaderMap;
pub use perform::{perform, HttpAttempt, HttpTransport};
pub use retry_after_cache::{CachedFailure, RetryAfterCache};
