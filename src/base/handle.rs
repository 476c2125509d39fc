//! Reference-counted opaque handles.
//!
//! Call and WebSocket objects are shared between the caller, the task queue
//! and the active transport. Ownership is expressed as an explicit
//! duplicate/close pair over a shared allocation: `duplicate` hands out a
//! second handle to the same value, `close` releases one reference, and the
//! value drops exactly once when the final reference goes away.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates the next process-unique object id.
///
/// Ids are monotonically increasing and never reused; 0 is reserved as the
/// "invalid" sentinel.
pub fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// A reference-counted handle to a shared engine object.
///
/// Unlike a bare `Arc`, handles are not `Clone`; new references are minted
/// only through [`Handle::duplicate`], mirroring the explicit handle
/// discipline of the public API. Dropping a handle without calling
/// [`Handle::close`] still releases its reference, so early returns and
/// panics cannot leak the underlying object.
#[derive(Debug)]
pub struct Handle<T> {
    inner: Arc<T>,
}

impl<T> Handle<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }

    /// Increments the reference count and returns a new handle to the same
    /// underlying object.
    pub fn duplicate(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Releases this reference. Returns `true` when this was the last
    /// reference and the underlying object has been freed.
    pub fn close(self) -> bool {
        Arc::strong_count(&self.inner) == 1
        // self drops here, releasing the reference counted above
    }

    /// Current number of live references. Test and diagnostic use.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Whether two handles refer to the same underlying object.
    pub fn same_object(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            // A second drop of the same allocation would trip the swap.
            assert!(!self.0.swap(true, Ordering::SeqCst), "double free");
        }
    }

    #[test]
    fn test_duplicate_keeps_value_alive() {
        let dropped = Arc::new(AtomicBool::new(false));
        let h1 = Handle::new(DropFlag(dropped.clone()));
        let h2 = h1.duplicate();
        assert_eq!(h1.ref_count(), 2);

        assert!(!h2.close());
        assert!(!dropped.load(Ordering::SeqCst));

        assert!(h1.close());
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_releases_reference() {
        let dropped = Arc::new(AtomicBool::new(false));
        {
            let h1 = Handle::new(DropFlag(dropped.clone()));
            let _h2 = h1.duplicate();
            // Neither handle closed explicitly.
        }
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_same_object() {
        let h1 = Handle::new(7u32);
        let h2 = h1.duplicate();
        let other = Handle::new(7u32);
        assert!(h1.same_object(&h2));
        assert!(!h1.same_object(&other));
    }

    #[test]
    fn test_next_id_monotonic() {
        let a = next_id();
        let b = next_id();
        assert!(b > a);
        assert_ne!(a, 0);
    }
}
