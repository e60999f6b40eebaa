//! Storage cells and the split reference-counting scheme that reclaims
//! them.
//!
//! Each [`Node`] carries three fields: a `data` pointer, a packed `count`,
//! and a `next` link written exactly once. Reclamation reconciles two
//! counters -- an *external* one that travels with whichever
//! `head`/`tail`/`next` slot currently names the node, and an *internal* one
//! resident in the node itself -- so that a node is freed exactly when both
//! read zero.

use std::cell::UnsafeCell;
use std::ptr;

#[cfg(not(loom))]
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};
#[cfg(loom)]
use loom::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

use crate::counted_ptr::{AtomicCountedPtr, CountedPtr, NODE_ALIGN};

/// `internal_count` is 30 bits, `external_counters` is 2 bits, packed into a
/// single `u32` -- sufficient because at most two slots (`head`, `tail`)
/// can ever name a node.
#[derive(Clone, Copy, PartialEq, Eq)]
struct NodeCount {
    internal_count: i32,
    external_counters: u8,
}

const EXTERNAL_BITS: u32 = 2;
const EXTERNAL_MASK: u32 = (1 << EXTERNAL_BITS) - 1;

impl NodeCount {
    #[inline]
    fn pack(self) -> u32 {
        debug_assert!(self.external_counters <= 2);
        ((self.internal_count as u32) << EXTERNAL_BITS) | (self.external_counters as u32 & EXTERNAL_MASK)
    }

    #[inline]
    fn unpack(word: u32) -> Self {
        let external_counters = (word & EXTERNAL_MASK) as u8;
        // Sign-extend the 30-bit internal_count back to i32.
        let internal_count = (word as i32) >> EXTERNAL_BITS;
        NodeCount { internal_count, external_counters }
    }
}

/// One cell of the queue's linked list: a dummy (sentinel) when `data` is
/// null, a real, fully-linked node otherwise.
#[repr(align(128))]
pub(crate) struct Node<T> {
    data: AtomicPtr<T>,
    count: AtomicU32,
    /// Written exactly once, by the single producer that links this node in
    /// as a tail's successor; every other reader only observes it after a
    /// happens-before edge supplied by the tail exchange that published it.
    next: UnsafeCell<CountedPtr<T>>,
}

unsafe impl<T: Send> Send for Node<T> {}
unsafe impl<T: Send> Sync for Node<T> {}

const _: () = assert!(std::mem::align_of::<Node<()>>() >= NODE_ALIGN);

impl<T> Node<T> {
    /// A freshly allocated node, referenced by exactly the two slots
    /// (predecessor's `next` link, and whichever of `head`/`tail` will come
    /// to name it) any node starts its life nameable from.
    pub(crate) fn new_dummy() -> Self {
        Node {
            data: AtomicPtr::new(ptr::null_mut()),
            count: AtomicU32::new(
                NodeCount { internal_count: 0, external_counters: 2 }.pack(),
            ),
            next: UnsafeCell::new(CountedPtr::null()),
        }
    }

    #[inline]
    pub(crate) fn data(&self) -> &AtomicPtr<T> {
        &self.data
    }

    /// # Safety
    /// Must only be called once per node, by the thread that holds the
    /// unique "linker" role (the one whose `data`-install CAS just
    /// succeeded), before the node is published through `tail`.
    #[inline]
    pub(crate) unsafe fn set_next_once(&self, value: CountedPtr<T>) {
        *self.next.get() = value;
    }

    /// # Safety
    /// Must only be called after establishing a happens-before relationship
    /// with the `set_next_once` call that published this node (i.e. after
    /// claiming the node through an `AtomicCountedPtr` load/CAS with
    /// `Acquire`).
    #[inline]
    pub(crate) unsafe fn next(&self) -> CountedPtr<T> {
        *self.next.get()
    }

    /// Claim this slot: bump its external count and hand back the refreshed
    /// `CountedPtr`. Loops until the CAS succeeds.
    pub(crate) fn increase_external_count(
        slot: &AtomicCountedPtr<T>,
        mut old_counter: CountedPtr<T>,
    ) -> CountedPtr<T> {
        loop {
            let new_counter = old_counter.with_count(old_counter.count() + 1);
            match slot.compare_exchange(
                old_counter,
                new_counter,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return new_counter,
                Err(actual) => old_counter = actual,
            }
        }
    }

    /// Release a claim that did *not* cause the owning slot to move on
    /// (e.g. a losing `data`-install CAS, or an empty-queue observation).
    /// Folds the claim into `internal_count`; frees the node if that was
    /// the last reference.
    pub(crate) fn release_ref(node: *mut Node<T>) {
        // SAFETY: the caller holds (and is releasing) an outstanding
        // external claim, so the node cannot have been freed yet.
        let this = unsafe { &*node };
        let mut old_counter = this.count.load(Ordering::Relaxed);
        loop {
            let mut new = NodeCount::unpack(old_counter);
            new.internal_count -= 1;
            match this.count.compare_exchange_weak(
                old_counter,
                new.pack(),
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    if new.internal_count == 0 && new.external_counters == 0 {
                        // SAFETY: both counters are zero; no other claim can
                        // still observe `node`.
                        drop(unsafe { Box::from_raw(node) });
                    }
                    return;
                }
                Err(actual) => old_counter = actual,
            }
        }
    }

    /// Reconcile a slot's accumulated external count into its node's
    /// internal count once that slot has moved on to name a different node.
    pub(crate) fn free_external_counter(old_node_ptr: CountedPtr<T>) {
        let node = old_node_ptr.ptr();
        debug_assert!(!node.is_null());
        let count_increase = old_node_ptr.count() as i32 - 2;
        // SAFETY: the slot has just been replaced (we were handed its old
        // value), so this node is still alive -- at minimum the
        // `external_counters` unit we are about to release keeps it so.
        let this = unsafe { &*node };
        let mut old_counter = this.count.load(Ordering::Relaxed);
        loop {
            let mut new = NodeCount::unpack(old_counter);
            new.external_counters -= 1;
            new.internal_count += count_increase;
            match this.count.compare_exchange_weak(
                old_counter,
                new.pack(),
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    if new.internal_count == 0 && new.external_counters == 0 {
                        // SAFETY: both counters are zero; no other claim can
                        // still observe `node`.
                        drop(unsafe { Box::from_raw(node) });
                    }
                    return;
                }
                Err(actual) => old_counter = actual,
            }
        }
    }
}
