//! Counters describing what a facade has done over its lifetime.

/// Lifetime counters for one [`BatchingFacade`](crate::BatchingFacade).
///
/// Every queued call ends up counted exactly once in `replayed` or
/// `discarded`, so once no batch is running:
/// `intercepted + recorded == replayed + discarded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatchStats {
    /// `batch()` calls whose operation ran (nested ones included).
    pub batches: u64,
    /// Batched operations that returned an error or panicked.
    pub failed: u64,
    /// Trigger calls queued because a batch was active.
    pub intercepted: u64,
    /// Calls queued manually through a [`Recorder`](crate::Recorder).
    pub recorded: u64,
    /// Queued calls that reached the target during a flush.
    pub replayed: u64,
    /// Queued calls dropped without reaching the target.
    pub discarded: u64,
    /// Trigger calls executed immediately because no batch was active.
    pub passed_through: u64,
}

impl BatchStats {
    /// Calls queued so far by either path.
    #[must_use]
    pub fn queued(&self) -> u64 {
        self.intercepted + self.recorded
    }

    /// Calls that actually reached the target's recompute.
    #[must_use]
    pub fn executed(&self) -> u64 {
        self.replayed + self.passed_through
    }
}
