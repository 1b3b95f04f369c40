#![forbid(unsafe_code)]

//! Update batching for virtualized lists.
//!
//! A virtualized list exposes one expensive operation: recompute the visible
//! rows. Logical operations such as reconfiguring columns, resizing, or bulk
//! data changes tend to request that recomputation many times in a row, and
//! forwarding every request produces redundant intermediate renders.
//!
//! This crate provides:
//!
//! - [`Recompute`]: the one operation a target must expose.
//! - [`BatchingFacade`]: wraps a target, owns the interception state and
//!   exposes [`BatchingFacade::batch`].
//! - [`UpdateTrigger`]: the call surface that replaces direct calls to
//!   [`Recompute::recompute`]. Outside a batch it passes straight through;
//!   inside a batch it queues the arguments.
//! - [`Recorder`]: handed to the batched operation; enqueues work manually
//!   into the same queue.
//! - [`BatchConfig`]: nesting and failure policies.
//! - [`BatchStats`]: counters for deferred, replayed and discarded calls.
//!
//! # Example
//!
//! ```
//! use gridbatch::{BatchingFacade, Dispatch, Recompute};
//!
//! #[derive(Default)]
//! struct Rows {
//!     recomputed: Vec<(usize, usize)>,
//! }
//!
//! impl Recompute for Rows {
//!     type Args = (usize, usize);
//!
//!     fn recompute(&mut self, range: (usize, usize)) {
//!         self.recomputed.push(range);
//!     }
//! }
//!
//! let facade = BatchingFacade::wrap(Rows::default());
//! let trigger = facade.trigger();
//!
//! facade
//!     .batch(|_| {
//!         assert_eq!(trigger.update((0, 5)), Ok(Dispatch::Deferred));
//!         assert_eq!(trigger.update((3, 8)), Ok(Dispatch::Deferred));
//!     })
//!     .unwrap();
//!
//! assert_eq!(facade.target().borrow().recomputed, vec![(0, 5), (3, 8)]);
//! ```
//!
//! # Invariants
//!
//! 1. The facade is active for exactly the dynamic extent of a batch and
//!    inactive everywhere else, including after an error or a panic.
//! 2. Deferred calls replay strictly in the order they were issued, after the
//!    outermost batched operation has returned.
//! 3. Every deferred call replays exactly once; identical calls are not merged.
//! 4. Replay evaluates against the target's state at replay time.
//!
//! # Threading
//!
//! All types here are `!Send` and `!Sync`. The target is shared through
//! `Rc<RefCell<_>>` and exclusive access is checked at runtime; a conflicting
//! borrow surfaces as [`BatchError::TargetBusy`].

pub mod config;
pub mod error;
pub mod facade;
pub mod stats;

pub use config::{BatchConfig, FailurePolicy, NestingPolicy};
pub use error::BatchError;
pub use facade::{BatchingFacade, Dispatch, Recorder, UpdateTrigger};
pub use stats::BatchStats;

/// The expensive update operation of a batching target.
///
/// For a virtualized list this recomputes the visible rows. Calling it
/// directly always performs the full recomputation; route calls through an
/// [`UpdateTrigger`] to make them subject to batching.
pub trait Recompute {
    /// Arguments of one recompute request.
    type Args;

    /// Recompute the target's visible state for `args`.
    fn recompute(&mut self, args: Self::Args);
}
