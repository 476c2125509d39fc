//! Base types and error handling.
//!
//! Provides the foundational pieces shared by every other module:
//! - [`error::HcError`]: the uniform result-code domain
//! - [`handle::Handle`]: reference-counted opaque handles with
//!   duplicate/close semantics

pub mod error;
pub mod handle;
