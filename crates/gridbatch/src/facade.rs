//! The batching facade, its trigger handle and the batch recorder.
//!
//! ```text
//!   caller ──update(args)──► UpdateTrigger ──┬── inactive ──► T::recompute(args)
//!                                            │
//!                                            └── active ────► queue.push(args)
//!
//!   batch(op):  depth += 1 ─► op(&Recorder) ─► depth -= 1 ─► outermost? replay queue in order
//! ```
//!
//! # Invariants
//!
//! 1. `is_active()` is true exactly while a batched operation is running.
//!    The depth counter is restored by a drop guard, so a panicking
//!    operation cannot leave the facade intercepting.
//! 2. The queue is only drained by the outermost batch, after its operation
//!    returned, in FIFO order.
//! 3. Replay holds one mutable borrow of the target for the whole flush.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Operation returns `Err` | caller logic | Depth restored; queue handled per [`FailurePolicy`]; error propagated |
//! | Operation panics | caller logic | Depth restored; calls it queued discarded; panic propagates |
//! | Nested `batch()` | reentrant caller | Merged, or [`BatchError::NestedBatch`] under [`NestingPolicy::Reject`] |
//! | Recompute panics during replay | target logic | Unreplayed calls counted as discarded; panic propagates |
//! | Target borrowed | recompute re-triggering itself, outstanding `Ref` | [`BatchError::TargetBusy`] |

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug_span, trace, warn};

use crate::Recompute;
use crate::config::{BatchConfig, FailurePolicy, NestingPolicy};
use crate::error::BatchError;
use crate::stats::BatchStats;

/// How an [`UpdateTrigger::update`] call was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// No batch was active; the target recomputed before `update` returned.
    Immediate,
    /// A batch was active; the call was queued for replay.
    Deferred,
}

/// State shared between a facade and its triggers.
struct Shared<T: Recompute> {
    target: Rc<RefCell<T>>,
    depth: Cell<usize>,
    queue: RefCell<Vec<T::Args>>,
    stats: Cell<BatchStats>,
    config: BatchConfig,
}

impl<T: Recompute> Shared<T> {
    fn is_active(&self) -> bool {
        self.depth.get() > 0
    }

    fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    fn count(&self, f: impl FnOnce(&mut BatchStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    fn dispatch(&self, args: T::Args) -> Result<Dispatch, BatchError> {
        if self.is_active() {
            self.queue.borrow_mut().push(args);
            self.count(|s| s.intercepted += 1);
            trace!(pending = self.pending(), "recompute deferred");
            return Ok(Dispatch::Deferred);
        }

        let Ok(mut target) = self.target.try_borrow_mut() else {
            warn!("recompute requested while the target is borrowed");
            return Err(BatchError::TargetBusy);
        };
        target.recompute(args);
        drop(target);
        self.count(|s| s.passed_through += 1);
        Ok(Dispatch::Immediate)
    }

    /// Drop every queued call past `mark`.
    fn truncate(&self, mark: usize) {
        let dropped = {
            let mut queue = self.queue.borrow_mut();
            let mark = mark.min(queue.len());
            queue.split_off(mark)
        };
        if !dropped.is_empty() {
            self.count(|s| s.discarded += dropped.len() as u64);
            warn!(dropped = dropped.len(), "deferred recomputes discarded");
        }
    }

    /// Replay the whole queue against the target, oldest first.
    fn flush(&self) -> Result<usize, BatchError> {
        let queued = std::mem::take(&mut *self.queue.borrow_mut());
        if queued.is_empty() {
            return Ok(0);
        }

        let replayed = queued.len();
        let _span = debug_span!("batch_flush", queued = replayed).entered();

        let Ok(mut target) = self.target.try_borrow_mut() else {
            self.count(|s| s.discarded += replayed as u64);
            warn!(
                dropped = replayed,
                "target borrowed at flush; deferred recomputes discarded"
            );
            return Err(BatchError::TargetBusy);
        };
        let mut guard = ReplayGuard {
            shared: self,
            remaining: replayed,
        };
        for args in queued {
            target.recompute(args);
            guard.remaining -= 1;
            self.count(|s| s.replayed += 1);
        }
        Ok(replayed)
    }
}

/// Counts calls left unreplayed when a recompute unwinds mid-flush.
struct ReplayGuard<'a, T: Recompute> {
    shared: &'a Shared<T>,
    remaining: usize,
}

impl<T: Recompute> Drop for ReplayGuard<'_, T> {
    fn drop(&mut self) {
        if self.remaining > 0 {
            let dropped = self.remaining;
            self.shared.count(|s| s.discarded += dropped as u64);
            warn!(
                dropped,
                "recompute panicked during flush; remaining recomputes discarded"
            );
        }
    }
}

/// Restores the batch depth when a batched operation unwinds.
struct DepthGuard<'a, T: Recompute> {
    shared: &'a Shared<T>,
    mark: usize,
    armed: bool,
}

impl<'a, T: Recompute> DepthGuard<'a, T> {
    fn enter(shared: &'a Shared<T>) -> Self {
        shared.depth.set(shared.depth.get() + 1);
        shared.count(|s| s.batches += 1);
        Self {
            shared,
            mark: shared.pending(),
            armed: true,
        }
    }

    /// Leave the batch normally. Returns the queue length at entry.
    fn release(mut self) -> usize {
        self.armed = false;
        self.shared.depth.set(self.shared.depth.get() - 1);
        self.mark
    }
}

impl<T: Recompute> Drop for DepthGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.depth.set(self.shared.depth.get() - 1);
            self.shared.count(|s| s.failed += 1);
            self.shared.truncate(self.mark);
        }
    }
}

/// Wraps one target's recompute operation and batches calls to it.
///
/// Construct one facade per target and route every recompute request through
/// [`trigger()`](Self::trigger). Outside [`batch()`](Self::batch) the trigger
/// recomputes immediately; inside, it queues the arguments and the facade
/// replays them once the operation has returned.
///
/// The facade does not own the target's lifetime: the target is shared
/// through `Rc<RefCell<T>>` and stays usable directly.
pub struct BatchingFacade<T: Recompute> {
    shared: Rc<Shared<T>>,
}

impl<T: Recompute> BatchingFacade<T> {
    /// Wrap a shared target with the default configuration.
    #[must_use]
    pub fn new(target: Rc<RefCell<T>>) -> Self {
        Self::with_config(target, BatchConfig::default())
    }

    /// Wrap a shared target with an explicit configuration.
    #[must_use]
    pub fn with_config(target: Rc<RefCell<T>>, config: BatchConfig) -> Self {
        Self {
            shared: Rc::new(Shared {
                target,
                depth: Cell::new(0),
                queue: RefCell::new(Vec::new()),
                stats: Cell::new(BatchStats::default()),
                config,
            }),
        }
    }

    /// Take ownership of `target` and wrap it.
    #[must_use]
    pub fn wrap(target: T) -> Self {
        Self::new(Rc::new(RefCell::new(target)))
    }

    /// The intercepting call surface for the target's recompute.
    #[must_use]
    pub fn trigger(&self) -> UpdateTrigger<T> {
        UpdateTrigger {
            shared: Rc::clone(&self.shared),
        }
    }

    /// The wrapped target.
    #[must_use]
    pub fn target(&self) -> &Rc<RefCell<T>> {
        &self.shared.target
    }

    /// Whether a batch is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Number of batches currently running (nested batches included).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.shared.depth.get()
    }

    /// Number of calls waiting for replay.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.pending()
    }

    /// Lifetime counters.
    #[must_use]
    pub fn stats(&self) -> BatchStats {
        self.shared.stats.get()
    }

    /// The configuration this facade was built with.
    #[must_use]
    pub fn config(&self) -> &BatchConfig {
        &self.shared.config
    }

    /// Run `operation` with recompute requests deferred, then replay them.
    ///
    /// Every trigger call made while `operation` runs, directly or from code
    /// it calls, is queued instead of executed. When the outermost batch
    /// returns, the queue is replayed in issue order against the target's
    /// current state. The value returned by `operation` is passed through.
    ///
    /// # Errors
    ///
    /// - [`BatchError::NestedBatch`] if a batch is already running and the
    ///   nesting policy is [`NestingPolicy::Reject`]. `operation` does not run.
    /// - [`BatchError::TargetBusy`] if the target is borrowed at replay time.
    ///   The queue is discarded.
    pub fn batch<R>(&self, operation: impl FnOnce(&Recorder<'_, T>) -> R) -> Result<R, BatchError> {
        self.try_batch(|recorder| Ok(operation(recorder)))
    }

    /// Fallible form of [`batch()`](Self::batch).
    ///
    /// If `operation` returns `Err`, the facade becomes inactive before the
    /// error is returned, and the calls it queued are handled according to
    /// the configured [`FailurePolicy`].
    ///
    /// # Errors
    ///
    /// The operation's own error, or a [`BatchError`] converted into `E`
    /// under the conditions listed on [`batch()`](Self::batch).
    pub fn try_batch<R, E>(
        &self,
        operation: impl FnOnce(&Recorder<'_, T>) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<BatchError>,
    {
        let shared = &*self.shared;
        let outer_depth = shared.depth.get();
        if outer_depth > 0 && shared.config.nesting == NestingPolicy::Reject {
            warn!(depth = outer_depth, "nested batch rejected");
            return Err(BatchError::NestedBatch.into());
        }

        let _span = debug_span!("batch", depth = outer_depth + 1).entered();
        let guard = DepthGuard::enter(shared);
        let outcome = operation(&Recorder {
            shared: &self.shared,
        });
        let mark = guard.release();
        let outermost = outer_depth == 0;

        match outcome {
            Ok(value) => {
                if outermost {
                    shared.flush()?;
                }
                Ok(value)
            }
            Err(err) => {
                shared.count(|s| s.failed += 1);
                match shared.config.on_failure {
                    FailurePolicy::Discard => shared.truncate(mark),
                    FailurePolicy::Flush if outermost => {
                        if let Err(flush_err) = shared.flush() {
                            warn!(%flush_err, "flush after failed batch");
                        }
                    }
                    FailurePolicy::Flush => {}
                }
                Err(err)
            }
        }
    }
}

impl<T: Recompute> std::fmt::Debug for BatchingFacade<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchingFacade")
            .field("depth", &self.depth())
            .field("pending", &self.pending())
            .field("config", self.config())
            .finish()
    }
}

/// A facade is itself a batching target: recompute requests route through
/// its trigger. Wrapping one facade in another therefore replays each queued
/// call exactly once against the innermost target.
impl<T: Recompute> Recompute for BatchingFacade<T> {
    type Args = T::Args;

    fn recompute(&mut self, args: T::Args) {
        if let Err(err) = self.shared.dispatch(args) {
            warn!(%err, "wrapped facade dropped a recompute");
        }
    }
}

/// Cloneable handle that replaces direct calls to [`Recompute::recompute`].
///
/// Hand clones to every piece of code that would otherwise recompute the
/// target directly (column setters, resize handlers, data loaders).
pub struct UpdateTrigger<T: Recompute> {
    shared: Rc<Shared<T>>,
}

impl<T: Recompute> UpdateTrigger<T> {
    /// Request a recompute.
    ///
    /// Queues `args` while a batch is active; otherwise recomputes the
    /// target before returning.
    ///
    /// # Errors
    ///
    /// [`BatchError::TargetBusy`] if no batch is active and the target is
    /// already borrowed.
    pub fn update(&self, args: T::Args) -> Result<Dispatch, BatchError> {
        self.shared.dispatch(args)
    }

    /// Whether calls are currently being deferred.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Number of calls waiting for replay.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.pending()
    }
}

impl<T: Recompute> Clone for UpdateTrigger<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T: Recompute> std::fmt::Debug for UpdateTrigger<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateTrigger")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Handed to a batched operation.
///
/// [`defer()`](Self::defer) appends to the same queue the trigger feeds, so
/// manual and intercepted calls can be mixed and replay in issue order.
pub struct Recorder<'a, T: Recompute> {
    shared: &'a Rc<Shared<T>>,
}

impl<T: Recompute> Recorder<'_, T> {
    /// Queue a recompute for replay when the batch ends.
    pub fn defer(&self, args: T::Args) {
        self.shared.queue.borrow_mut().push(args);
        self.shared.count(|s| s.recorded += 1);
    }

    /// Mutate the target while the batch is running.
    ///
    /// Trigger calls made inside `f` are deferred as usual, so `f` can hold
    /// the mutable borrow while requesting recomputes.
    ///
    /// # Errors
    ///
    /// [`BatchError::TargetBusy`] if the target is already borrowed.
    pub fn with_target<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, BatchError> {
        let mut target = self
            .shared
            .target
            .try_borrow_mut()
            .map_err(|_| BatchError::TargetBusy)?;
        Ok(f(&mut target))
    }

    /// A trigger for the facade running this batch.
    #[must_use]
    pub fn trigger(&self) -> UpdateTrigger<T> {
        UpdateTrigger {
            shared: Rc::clone(self.shared),
        }
    }

    /// Number of calls queued so far, including those of enclosing batches.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.pending()
    }

    /// Nesting depth of the running batch; 1 for an outermost batch.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.shared.depth.get()
    }
}

impl<T: Recompute> std::fmt::Debug for Recorder<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("depth", &self.depth())
            .field("pending", &self.pending())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    /// Records `(args, generation)` for every recompute.
    #[derive(Default)]
    struct Log {
        calls: Vec<(u32, u32)>,
        generation: u32,
    }

    impl Recompute for Log {
        type Args = u32;

        fn recompute(&mut self, args: u32) {
            self.calls.push((args, self.generation));
        }
    }

    fn calls(facade: &BatchingFacade<Log>) -> Vec<u32> {
        facade
            .target()
            .borrow()
            .calls
            .iter()
            .map(|(args, _)| *args)
            .collect()
    }

    #[derive(Debug, PartialEq)]
    enum OpError {
        Batch(BatchError),
        Failed,
    }

    impl From<BatchError> for OpError {
        fn from(err: BatchError) -> Self {
            Self::Batch(err)
        }
    }

    #[test]
    fn passes_through_outside_batch() {
        let facade = BatchingFacade::wrap(Log::default());
        let trigger = facade.trigger();

        assert_eq!(trigger.update(7), Ok(Dispatch::Immediate));
        assert_eq!(calls(&facade), vec![7]);
        assert_eq!(facade.stats().passed_through, 1);
        assert!(!facade.is_active());
    }

    #[test]
    fn defers_until_operation_returns() {
        let facade = BatchingFacade::wrap(Log::default());
        let trigger = facade.trigger();

        facade
            .batch(|_| {
                assert_eq!(trigger.update(1), Ok(Dispatch::Deferred));
                assert_eq!(trigger.update(2), Ok(Dispatch::Deferred));
                assert!(facade.target().borrow().calls.is_empty());
                assert_eq!(facade.pending(), 2);
                assert!(trigger.is_active());
            })
            .unwrap();

        assert_eq!(calls(&facade), vec![1, 2]);
        assert_eq!(facade.pending(), 0);
    }

    #[test]
    fn replays_in_issue_order_without_merging() {
        let facade = BatchingFacade::wrap(Log::default());
        let trigger = facade.trigger();

        facade
            .batch(|_| {
                for args in [5, 3, 5, 9, 3] {
                    trigger.update(args).unwrap();
                }
            })
            .unwrap();

        assert_eq!(calls(&facade), vec![5, 3, 5, 9, 3]);
        assert_eq!(facade.stats().replayed, 5);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let facade = BatchingFacade::wrap(Log::default());
        let value = facade.batch(|_| 42).unwrap();

        assert_eq!(value, 42);
        assert!(calls(&facade).is_empty());
        let stats = facade.stats();
        assert_eq!(stats.batches, 1);
        assert_eq!(stats.replayed, 0);
    }

    #[test]
    fn inactive_after_success() {
        let facade = BatchingFacade::wrap(Log::default());
        let trigger = facade.trigger();

        facade.batch(|_| trigger.update(1).unwrap()).unwrap();
        assert!(!facade.is_active());
        assert_eq!(trigger.update(2), Ok(Dispatch::Immediate));
        assert_eq!(calls(&facade), vec![1, 2]);
    }

    #[test]
    fn failed_operation_discards_by_default() {
        let facade = BatchingFacade::wrap(Log::default());
        let trigger = facade.trigger();

        let result: Result<(), OpError> = facade.try_batch(|_| {
            trigger.update(1)?;
            trigger.update(2)?;
            Err(OpError::Failed)
        });

        assert_eq!(result, Err(OpError::Failed));
        assert!(!facade.is_active());
        assert!(calls(&facade).is_empty());
        assert_eq!(facade.stats().discarded, 2);
        assert_eq!(facade.stats().failed, 1);

        assert_eq!(trigger.update(3), Ok(Dispatch::Immediate));
        assert_eq!(calls(&facade), vec![3]);
    }

    #[test]
    fn failed_operation_flushes_under_flush_policy() {
        let config = BatchConfig::new().with_failure_policy(FailurePolicy::Flush);
        let facade = BatchingFacade::with_config(Rc::new(RefCell::new(Log::default())), config);
        let trigger = facade.trigger();

        let result: Result<(), OpError> = facade.try_batch(|_| {
            trigger.update(1)?;
            Err(OpError::Failed)
        });

        assert_eq!(result, Err(OpError::Failed));
        assert_eq!(calls(&facade), vec![1]);
        assert!(!facade.is_active());
    }

    #[test]
    fn panicking_operation_resets_state() {
        let facade = BatchingFacade::wrap(Log::default());
        let trigger = facade.trigger();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            facade.batch(|_| {
                trigger.update(1).unwrap();
                panic!("operation failed");
            })
        }));

        assert!(outcome.is_err());
        assert!(!facade.is_active());
        assert_eq!(facade.pending(), 0);
        assert_eq!(facade.stats().discarded, 1);
        assert_eq!(facade.stats().failed, 1);
        assert!(calls(&facade).is_empty());

        assert_eq!(trigger.update(2), Ok(Dispatch::Immediate));
        assert_eq!(calls(&facade), vec![2]);
    }

    #[test]
    fn recorder_and_trigger_share_one_queue() {
        let facade = BatchingFacade::wrap(Log::default());
        let trigger = facade.trigger();

        facade
            .batch(|rec| {
                trigger.update(1).unwrap();
                rec.defer(2);
                rec.trigger().update(3).unwrap();
                rec.defer(4);
                assert_eq!(rec.pending(), 4);
                assert_eq!(rec.depth(), 1);
            })
            .unwrap();

        assert_eq!(calls(&facade), vec![1, 2, 3, 4]);
        let stats = facade.stats();
        assert_eq!(stats.intercepted, 2);
        assert_eq!(stats.recorded, 2);
    }

    #[test]
    fn replay_sees_state_at_flush_time() {
        let facade = BatchingFacade::wrap(Log::default());
        let trigger = facade.trigger();

        facade
            .batch(|rec| {
                trigger.update(1).unwrap();
                rec.with_target(|log| {
                    log.generation = 3;
                    trigger.update(2).unwrap();
                })
                .unwrap();
            })
            .unwrap();

        assert_eq!(facade.target().borrow().calls, vec![(1, 3), (2, 3)]);
    }

    #[test]
    fn nested_batches_merge_into_one_flush() {
        let facade = BatchingFacade::wrap(Log::default());
        let trigger = facade.trigger();

        facade
            .batch(|_| {
                trigger.update(1).unwrap();
                facade
                    .batch(|rec| {
                        assert_eq!(rec.depth(), 2);
                        trigger.update(2).unwrap();
                    })
                    .unwrap();
                assert!(facade.is_active());
                assert!(facade.target().borrow().calls.is_empty());
                trigger.update(3).unwrap();
            })
            .unwrap();

        assert_eq!(calls(&facade), vec![1, 2, 3]);
        assert_eq!(facade.stats().batches, 2);
    }

    #[test]
    fn failed_nested_batch_discards_only_its_own_calls() {
        let facade = BatchingFacade::wrap(Log::default());
        let trigger = facade.trigger();

        facade
            .batch(|_| {
                trigger.update(1).unwrap();
                let inner: Result<(), OpError> = facade.try_batch(|_| {
                    trigger.update(2)?;
                    Err(OpError::Failed)
                });
                assert_eq!(inner, Err(OpError::Failed));
                assert!(facade.is_active());
                trigger.update(3).unwrap();
            })
            .unwrap();

        assert_eq!(calls(&facade), vec![1, 3]);
    }

    #[test]
    fn nested_batch_rejected_under_reject_policy() {
        let config = BatchConfig::new().with_nesting(NestingPolicy::Reject);
        let facade = BatchingFacade::with_config(Rc::new(RefCell::new(Log::default())), config);
        let trigger = facade.trigger();
        let ran = Cell::new(false);

        facade
            .batch(|_| {
                trigger.update(1).unwrap();
                let nested = facade.batch(|_| ran.set(true));
                assert_eq!(nested, Err(BatchError::NestedBatch));
                assert_eq!(facade.depth(), 1);
                trigger.update(2).unwrap();
            })
            .unwrap();

        assert!(!ran.get());
        assert_eq!(calls(&facade), vec![1, 2]);
    }

    #[test]
    fn busy_target_rejects_pass_through() {
        let facade = BatchingFacade::wrap(Log::default());
        let trigger = facade.trigger();

        let held = facade.target().borrow_mut();
        assert_eq!(trigger.update(1), Err(BatchError::TargetBusy));
        drop(held);
        assert_eq!(trigger.update(1), Ok(Dispatch::Immediate));
    }

    #[test]
    fn busy_target_at_flush_discards_queue() {
        let facade = BatchingFacade::wrap(Log::default());
        let trigger = facade.trigger();

        let target = Rc::clone(facade.target());
        let held = target.borrow();
        let result = facade.batch(|_| {
            trigger.update(1).unwrap();
            trigger.update(2).unwrap();
        });
        drop(held);

        assert_eq!(result, Err(BatchError::TargetBusy));
        assert!(!facade.is_active());
        assert_eq!(facade.pending(), 0);
        assert_eq!(facade.stats().discarded, 2);
        assert!(calls(&facade).is_empty());
    }

    #[test]
    fn wrapping_a_facade_executes_each_call_once() {
        let inner = BatchingFacade::wrap(Log::default());
        let outer = BatchingFacade::wrap(inner);
        let trigger = outer.trigger();

        outer
            .batch(|_| {
                trigger.update(1).unwrap();
                trigger.update(2).unwrap();
            })
            .unwrap();

        let inner = outer.target().borrow();
        assert_eq!(calls(&inner), vec![1, 2]);
        assert_eq!(inner.stats().passed_through, 2);
        assert_eq!(outer.stats().replayed, 2);
    }

    #[test]
    fn two_facades_over_one_target_replay_independently() {
        let target = Rc::new(RefCell::new(Log::default()));
        let first = BatchingFacade::new(Rc::clone(&target));
        let second = BatchingFacade::new(Rc::clone(&target));
        let (t1, t2) = (first.trigger(), second.trigger());

        first
            .batch(|_| {
                t1.update(1).unwrap();
                assert_eq!(t2.update(2), Ok(Dispatch::Immediate));
            })
            .unwrap();

        let seen: Vec<u32> = target.borrow().calls.iter().map(|(a, _)| *a).collect();
        assert_eq!(seen, vec![2, 1]);
    }

    #[test]
    fn stats_balance_after_mixed_outcomes() {
        let facade = BatchingFacade::wrap(Log::default());
        let trigger = facade.trigger();

        facade
            .batch(|rec| {
                trigger.update(1).unwrap();
                rec.defer(2);
            })
            .unwrap();
        let _: Result<(), OpError> = facade.try_batch(|_| {
            trigger.update(3)?;
            Err(OpError::Failed)
        });
        trigger.update(4).unwrap();

        let stats = facade.stats();
        assert_eq!(stats.queued(), stats.replayed + stats.discarded);
        assert_eq!(stats.executed(), 3);
        assert_eq!(stats.batches, 2);
    }

    /// Panics when asked to recompute `2`.
    #[derive(Default)]
    struct Fragile {
        calls: Vec<u32>,
    }

    impl Recompute for Fragile {
        type Args = u32;

        fn recompute(&mut self, args: u32) {
            assert_ne!(args, 2, "row recompute failed");
            self.calls.push(args);
        }
    }

    #[test]
    fn panicking_replay_counts_remainder_as_discarded() {
        let facade = BatchingFacade::wrap(Fragile::default());
        let trigger = facade.trigger();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            facade.batch(|_| {
                for args in [1, 2, 3] {
                    trigger.update(args).unwrap();
                }
            })
        }));

        assert!(outcome.is_err());
        assert!(!facade.is_active());
        assert_eq!(facade.pending(), 0);
        assert_eq!(facade.target().borrow().calls, vec![1]);

        let stats = facade.stats();
        assert_eq!(stats.replayed, 1);
        assert_eq!(stats.discarded, 2);
        assert_eq!(stats.queued(), stats.replayed + stats.discarded);

        assert_eq!(trigger.update(4), Ok(Dispatch::Immediate));
        assert_eq!(facade.target().borrow().calls, vec![1, 4]);
    }

    #[test]
    fn debug_format() {
        let facade = BatchingFacade::wrap(Log::default());
        let debug = format!("{facade:?}");
        assert!(debug.contains("depth: 0"));
        assert!(debug.contains("pending: 0"));
        let debug = format!("{:?}", facade.trigger());
        assert!(debug.contains("active: false"));
    }
}
