//! The head/tail push/pop state machine and the queue facade built on top
//! of it.

use std::ptr;

#[cfg(not(loom))]
use std::sync::atomic::Ordering;
#[cfg(loom)]
use loom::sync::atomic::Ordering;

use crate::counted_ptr::{AtomicCountedPtr, CountedPtr};
use crate::error::{try_alloc, try_alloc_node, undo_alloc, AllocKind, TryPushError};
use crate::node::Node;

/// A lock-free, unbounded, multi-producer multi-consumer FIFO queue.
///
/// Values are moved onto the heap by [`push`](Queue::push) and transferred
/// back out, exactly once, by [`pop`](Queue::pop). The queue is never empty
/// of nodes -- there is always at least one sentinel -- though it may of
/// course hold zero values.
///
/// # Destruction
///
/// Dropping a `Queue` drains it by popping until empty and then frees the
/// final sentinel. This is **not** safe to run concurrently with any other
/// thread still calling `push` or `pop` on the same queue: the protocol that
/// makes `push`/`pop` safe under concurrency does not extend to `Drop`.
/// Callers must ensure quiescence (e.g. by joining producer/consumer threads
/// first).
pub struct Queue<T> {
    head: AtomicCountedPtr<T>,
    tail: AtomicCountedPtr<T>,
}

unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> {
    /// Builds an empty queue, allocating its single initial sentinel node.
    pub fn new() -> Self {
        let dummy = Box::into_raw(Box::new(Node::new_dummy()));
        // Referenced by both `head` and `tail` from the start; each gets an
        // external count of 1, matching the node's two reserved
        // `external_counters` units.
        let initial = CountedPtr::new(dummy, 1);
        tracing::trace!("queue constructed");
        Queue {
            head: AtomicCountedPtr::new(initial),
            tail: AtomicCountedPtr::new(initial),
        }
    }

    /// Moves `value` onto the heap and transfers ownership into the queue.
    ///
    /// Never blocks and never fails except through allocation failure, which
    /// aborts the process -- use [`try_push`](Self::try_push) if you need a
    /// recoverable alternative.
    pub fn push(&self, value: T) {
        let new_data = Box::into_raw(Box::new(value));
        let new_next_node = Box::into_raw(Box::new(Node::new_dummy()));
        self.push_prepared(new_data, new_next_node);
    }

    /// Identical contract to [`push`](Self::push), but a failure to
    /// allocate the pushed value or its successor node returns `Err`
    /// (carrying `value` back) instead of aborting the process.
    ///
    /// No partial effects are ever visible: both allocations happen before
    /// the first shared-state mutation, so a failed allocation never leaves
    /// the queue touched.
    pub fn try_push(&self, value: T) -> Result<(), TryPushError<T>> {
        let new_data = match try_alloc(value) {
            Ok(ptr) => ptr,
            Err(value) => {
                tracing::error!("push abandoned: could not allocate value cell");
                return Err(TryPushError { value, kind: AllocKind::Value });
            }
        };
        let new_next_node = match try_alloc_node::<T>() {
            Ok(ptr) => ptr,
            Err(()) => {
                tracing::error!("push abandoned: could not allocate successor node");
                // SAFETY: `new_data` was just allocated by `try_alloc` above
                // and has not been shared with any other thread.
                let value = unsafe { undo_alloc(new_data) };
                return Err(TryPushError { value, kind: AllocKind::SuccessorNode });
            }
        };
        self.push_prepared(new_data, new_next_node);
        Ok(())
    }

    /// Runs the claim/install/link/publish loop given an already-allocated
    /// value cell and successor node. Cannot fail: both allocations already
    /// happened, so only CAS contention stands between here and a
    /// successful link.
    fn push_prepared(&self, new_data: *mut T, new_next_node: *mut Node<T>) {
        // The successor dummy starts out claimed once: it is about to be
        // named both by its predecessor's `next` link and, once the tail
        // exchange below runs, by `tail` itself.
        let new_next = CountedPtr::new(new_next_node, 1);

        let mut old_tail = self.tail.load(Ordering::Acquire);
        loop {
            old_tail = Node::increase_external_count(&self.tail, old_tail);
            let old_tail_node = unsafe { old_tail.deref() };

            let install = old_tail_node.data().compare_exchange(
                ptr::null_mut(),
                new_data,
                Ordering::Release,
                Ordering::Relaxed,
            );

            if install.is_ok() {
                // We are the unique linker for this node: the CAS above can
                // succeed for at most one thread, ever.
                unsafe { old_tail_node.set_next_once(new_next) };
                let old_tail = self.tail.exchange(new_next, Ordering::Release);
                Node::free_external_counter(old_tail);
                return;
            }

            Node::release_ref(old_tail.ptr());
        }
    }

    /// Removes and returns the value at the front of the queue, or `None` if
    /// the queue was observed empty.
    ///
    /// A racing `push` that has installed its value but not yet finished
    /// linking may cause a momentary false-empty result. This is permitted,
    /// not a bug: the value is still observably in flight and a subsequent
    /// `pop` will see it once the link completes.
    pub fn pop(&self) -> Option<T> {
        let mut old_head = self.head.load(Ordering::Acquire);
        loop {
            old_head = Node::increase_external_count(&self.head, old_head);
            let head_ptr = old_head.ptr();
            // SAFETY: the claim just taken above keeps `head_ptr` alive for
            // the rest of this loop iteration.
            let head_node = unsafe { old_head.deref() };

            if head_ptr == self.tail.load(Ordering::Acquire).ptr() {
                Node::release_ref(head_ptr);
                return None;
            }

            // SAFETY: `head_ptr != tail`, so this node has already been
            // fully linked; the Acquire claim above pairs with the Release
            // tail-exchange in `push_prepared` that published `next`, so
            // this read observes it.
            let next = unsafe { head_node.next() };

            match self.head.compare_exchange(old_head, next, Ordering::Acquire, Ordering::Relaxed) {
                Ok(_) => {
                    let value_ptr = head_node.data().swap(ptr::null_mut(), Ordering::Acquire);
                    Node::free_external_counter(old_head);
                    debug_assert!(
                        !value_ptr.is_null(),
                        "every node strictly before tail must already hold data"
                    );
                    // SAFETY: `value_ptr` was produced by exactly one
                    // `push`'s `Box::into_raw`, and the CAS above is the
                    // sole linearization point handing it to a consumer.
                    return Some(unsafe { *Box::from_raw(value_ptr) });
                }
                Err(actual) => {
                    Node::release_ref(head_ptr);
                    old_head = actual;
                }
            }
        }
    }

    /// A momentary, non-linearizable snapshot of "head and tail name the
    /// same node." Like `pop`, this may spuriously report non-empty under
    /// a push that is mid-flight, and may spuriously report empty relative
    /// to a push that has installed data but not yet linked forward. Safe
    /// and cheap: it only compares addresses, never dereferences them.
    pub fn is_empty(&self) -> bool {
        let head = self.head.load(Ordering::Acquire).ptr();
        let tail = self.tail.load(Ordering::Acquire).ptr();
        head == tail
    }
}

impl<T> Drop for Queue<T> {
    /// Drains the queue and frees the final sentinel. Requires the caller
    /// to guarantee quiescence -- see the struct-level docs.
    fn drop(&mut self) {
        while self.pop().is_some() {}
        let head = self.head.load(Ordering::Relaxed);
        debug_assert_eq!(head.ptr(), self.tail.load(Ordering::Relaxed).ptr());
        // SAFETY: we have drained every value and no other thread may touch
        // this queue during `Drop` (documented precondition). The one
        // remaining node is whatever `head`/`tail` currently name; since
        // neither slot has moved away from it, its reference count was
        // never reconciled down to zero by the claim/release protocol, so
        // we free it directly instead of going through that protocol.
        unsafe { drop(Box::from_raw(head.ptr())) };
        tracing::trace!("queue destructed");
    }
}
