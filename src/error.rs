//! The one error this crate's core legitimately owns.
//!
//! Allocation failure during `push` is fatal, and we let the host's normal
//! allocation-failure mechanism handle it -- for `push` itself that
//! mechanism is Rust's own: `Box::new` aborts the process via
//! `handle_alloc_error` on OOM. [`Queue::try_push`](crate::Queue::try_push)
//! exists for callers who want a failing result instead of process
//! termination.

use std::fmt;

use crate::node::Node;

/// Returned by [`Queue::try_push`](crate::Queue::try_push) when the
/// allocator could not supply memory for the pushed value or its successor
/// node. The value is handed back so the caller can retry, drop it, or
/// escalate.
pub struct TryPushError<T> {
    pub(crate) value: T,
    pub(crate) kind: AllocKind,
}

/// Which of the two allocations `push` needs failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocKind {
    #[error("allocation of the pushed value failed")]
    Value,
    #[error("allocation of the successor node failed")]
    SuccessorNode,
}

impl<T> TryPushError<T> {
    /// The value that could not be enqueued.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Which allocation failed.
    pub fn kind(&self) -> AllocKind {
        self.kind
    }
}

impl<T> fmt::Debug for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TryPushError").field("kind", &self.kind).finish_non_exhaustive()
    }
}

impl<T> fmt::Display for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue push failed: {}", self.kind)
    }
}

impl<T> std::error::Error for TryPushError<T> {}

/// Allocates room for a `U` without going through `Box::new`'s
/// abort-on-OOM path, so callers above us can turn failure into a `Result`.
/// Returns the raw, uninitialized-but-for-`value` pointer on success.
pub(crate) fn try_alloc<U>(value: U) -> Result<*mut U, U> {
    use std::alloc::{alloc, Layout};

    let layout = Layout::new::<U>();
    if layout.size() == 0 {
        // Zero-sized `U`: any non-null, aligned pointer works; skip the
        // allocator entirely the way `Box` does internally.
        return Ok(std::ptr::NonNull::<U>::dangling().as_ptr());
    }
    // SAFETY: `layout` has non-zero size.
    let raw = unsafe { alloc(layout) } as *mut U;
    if raw.is_null() {
        return Err(value);
    }
    // SAFETY: `raw` was just allocated with `U`'s layout and is non-null.
    unsafe { raw.write(value) };
    Ok(raw)
}

pub(crate) fn try_alloc_node<T>() -> Result<*mut Node<T>, ()> {
    try_alloc(Node::new_dummy()).map_err(|_| ())
}

/// Undoes a successful `try_alloc::<U>`, reading the value back out first.
///
/// # Safety
/// `ptr` must have come from `try_alloc::<U>` and not been freed or shared
/// since.
pub(crate) unsafe fn undo_alloc<U>(ptr: *mut U) -> U {
    use std::alloc::{dealloc, Layout};

    let value = ptr.read();
    let layout = Layout::new::<U>();
    if layout.size() != 0 {
        dealloc(ptr as *mut u8, layout);
    }
    value
}
