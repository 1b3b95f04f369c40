//! Errors raised by the batching facade.

/// Errors from batching operations.
///
/// The facade adds no failure modes of its own beyond guarding its
/// invariants. Failures of the batched operation itself propagate unchanged
/// through [`BatchingFacade::try_batch`](crate::BatchingFacade::try_batch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchError {
    /// `batch()` was called while a batch was already running on the same
    /// facade and the nesting policy is [`Reject`](crate::NestingPolicy::Reject).
    NestedBatch,
    /// The target was already borrowed when the facade needed exclusive
    /// access to recompute it.
    TargetBusy,
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NestedBatch => write!(f, "a batch is already in progress on this facade"),
            Self::TargetBusy => write!(f, "batching target is already borrowed"),
        }
    }
}

impl std::error::Error for BatchError {}
