//! A lock-free, unbounded, multi-producer multi-consumer FIFO queue.
//!
//! The queue is a Michael-Scott-style linked list in which every node
//! carries a *split reference counter*: an external claim count that travels
//! with whichever `head`/`tail` slot currently names the node, and an
//! internal count resident in the node itself. The two are reconciled on
//! every slot advance, which is what lets nodes be reclaimed without a
//! garbage collector, hazard pointers, or epoch-based reclamation -- the
//! entire design is built from atomic compare-and-swap loops on shared
//! memory, never a mutex.
//!
//! ```
//! use splitq::Queue;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let queue = Arc::new(Queue::new());
//! let producer = {
//!     let queue = queue.clone();
//!     thread::spawn(move || {
//!         for i in 0..100 {
//!             queue.push(i);
//!         }
//!     })
//! };
//! producer.join().unwrap();
//!
//! let mut seen = Vec::new();
//! while let Some(v) = queue.pop() {
//!     seen.push(v);
//! }
//! assert_eq!(seen, (0..100).collect::<Vec<_>>());
//! ```

mod counted_ptr;
mod error;
mod node;
mod queue;

pub use error::{AllocKind, TryPushError};
pub use queue::Queue;
