//! Policies for the facade's open behaviors: nested batches and failing
//! operations.
//!
//! # Defaults
//!
//! | Knob | Default | Effect |
//! |------|---------|--------|
//! | [`NestingPolicy`] | `Merge` | Nested batches join the outer one; one flush at the outermost exit |
//! | [`FailurePolicy`] | `Discard` | Calls queued by a failing operation are dropped |
//!
//! A panicking operation always discards what it queued, regardless of
//! [`FailurePolicy`]. Replay never runs during unwinding.

/// What `batch()` does when called while a batch is already running on the
/// same facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum NestingPolicy {
    /// Run the nested operation as part of the outer batch. Its calls land in
    /// the shared queue and replay when the outermost batch returns.
    #[default]
    Merge,
    /// Refuse with [`BatchError::NestedBatch`](crate::BatchError::NestedBatch)
    /// without running the nested operation.
    Reject,
}

/// What happens to queued calls when the batched operation returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FailurePolicy {
    /// Drop the calls queued by the failing operation.
    #[default]
    Discard,
    /// Keep them. At the outermost level they replay before the error is
    /// returned; in a nested batch they replay with the outer batch.
    Flush,
}

/// Configuration for a [`BatchingFacade`](crate::BatchingFacade).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BatchConfig {
    /// Behavior of nested `batch()` calls.
    pub nesting: NestingPolicy,
    /// Behavior of queued calls when the operation fails.
    pub on_failure: FailurePolicy,
}

impl BatchConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the nesting policy.
    #[must_use]
    pub fn with_nesting(mut self, nesting: NestingPolicy) -> Self {
        self.nesting = nesting;
        self
    }

    /// Set the failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, on_failure: FailurePolicy) -> Self {
        self.on_failure = on_failure;
        self
    }
}
