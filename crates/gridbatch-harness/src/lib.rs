#![forbid(unsafe_code)]

//! Test harness for gridbatch.
//!
//! - [`VirtualList`]: a minimal virtualized list whose recompute records what
//!   it would have rendered, along with the list state at that moment.
//! - [`ListController`]: drives a [`VirtualList`] the way a host component
//!   does, requesting a recompute after every mutation.
//! - [`RecordingTarget`]: records raw recompute arguments.
//! - [`Step`], [`arb_steps`], [`run_steps`]: scripted batch operations for
//!   property tests.

use std::cell::RefCell;
use std::rc::Rc;

use gridbatch::{BatchError, BatchingFacade, Recompute, Recorder, UpdateTrigger};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// VirtualList
// ---------------------------------------------------------------------------

/// Half-open range of row indices `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

impl RowRange {
    /// Create a range; `end` is raised to `start` if smaller.
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Restrict the range to the first `rows` rows.
    #[must_use]
    pub fn clamp(self, rows: usize) -> Self {
        Self::new(self.start.min(rows), self.end.min(rows))
    }
}

/// What one recompute produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Render {
    /// The requested range.
    pub requested: RowRange,
    /// The range after clamping to the rows present at recompute time.
    pub rendered: RowRange,
    /// Column count at recompute time.
    pub columns: usize,
    /// Row count at recompute time.
    pub rows: usize,
}

/// Virtualized list fixture.
#[derive(Debug, Clone, Default)]
pub struct VirtualList {
    pub rows: Vec<String>,
    pub columns: Vec<String>,
    pub first_visible: usize,
    pub viewport_height: usize,
    pub renders: Vec<Render>,
}

impl VirtualList {
    #[must_use]
    pub fn new(viewport_height: usize) -> Self {
        Self {
            viewport_height,
            ..Self::default()
        }
    }

    /// The rows that should be on screen right now.
    #[must_use]
    pub fn visible_range(&self) -> RowRange {
        RowRange::new(
            self.first_visible,
            self.first_visible.saturating_add(self.viewport_height),
        )
    }
}

impl Recompute for VirtualList {
    type Args = RowRange;

    fn recompute(&mut self, requested: RowRange) {
        let render = Render {
            requested,
            rendered: requested.clamp(self.rows.len()),
            columns: self.columns.len(),
            rows: self.rows.len(),
        };
        tracing::trace!(?render, "virtual list recompute");
        self.renders.push(render);
    }
}

/// Host-side driver for a [`VirtualList`]: every mutation requests a
/// recompute of the visible rows through the facade's trigger.
#[derive(Debug, Clone)]
pub struct ListController {
    list: Rc<RefCell<VirtualList>>,
    trigger: UpdateTrigger<VirtualList>,
}

impl ListController {
    #[must_use]
    pub fn new(facade: &BatchingFacade<VirtualList>) -> Self {
        Self {
            list: Rc::clone(facade.target()),
            trigger: facade.trigger(),
        }
    }

    /// Replace the column set.
    pub fn set_columns(&self, columns: &[&str]) -> Result<(), BatchError> {
        self.mutate(|list| list.columns = columns.iter().map(ToString::to_string).collect())
    }

    /// Append rows.
    pub fn append_rows(&self, rows: impl IntoIterator<Item = String>) -> Result<(), BatchError> {
        self.mutate(|list| list.rows.extend(rows))
    }

    /// Change the viewport height.
    pub fn resize(&self, viewport_height: usize) -> Result<(), BatchError> {
        self.mutate(|list| list.viewport_height = viewport_height)
    }

    /// Scroll so that `first` is the first visible row.
    pub fn scroll_to(&self, first: usize) -> Result<(), BatchError> {
        self.mutate(|list| list.first_visible = first)
    }

    fn mutate(&self, f: impl FnOnce(&mut VirtualList)) -> Result<(), BatchError> {
        let range = {
            let mut list = self
                .list
                .try_borrow_mut()
                .map_err(|_| BatchError::TargetBusy)?;
            f(&mut list);
            list.visible_range()
        };
        self.trigger.update(range).map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// RecordingTarget
// ---------------------------------------------------------------------------

/// Records every argument passed to [`Recompute::recompute`].
#[derive(Debug, Clone)]
pub struct RecordingTarget<A> {
    pub calls: Vec<A>,
}

impl<A> Default for RecordingTarget<A> {
    fn default() -> Self {
        Self { calls: Vec::new() }
    }
}

impl<A> Recompute for RecordingTarget<A> {
    type Args = A;

    fn recompute(&mut self, args: A) {
        self.calls.push(args);
    }
}

// ---------------------------------------------------------------------------
// Scripted operations
// ---------------------------------------------------------------------------

/// One action performed inside a batched operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Request a recompute through the trigger.
    Trigger(u32),
    /// Queue a recompute through the recorder.
    Defer(u32),
    /// Run a nested batch with its own steps.
    Nested(Vec<Step>),
}

/// Strategy for scripts of up to `max_len` top-level steps with at most two
/// levels of nesting.
pub fn arb_steps(max_len: usize) -> impl Strategy<Value = Vec<Step>> {
    let leaf = prop_oneof![
        3 => any::<u32>().prop_map(Step::Trigger),
        1 => any::<u32>().prop_map(Step::Defer),
    ];
    let step = leaf.prop_recursive(2, 16, 4, |inner| {
        prop_oneof![
            4 => inner.clone(),
            1 => prop::collection::vec(inner, 0..4).prop_map(Step::Nested),
        ]
    });
    prop::collection::vec(step, 0..max_len)
}

/// Apply `steps` inside the running batch. Returns the arguments in the
/// order they were issued.
pub fn run_steps(
    facade: &BatchingFacade<RecordingTarget<u32>>,
    recorder: &Recorder<'_, RecordingTarget<u32>>,
    steps: &[Step],
) -> Result<Vec<u32>, BatchError> {
    let trigger = recorder.trigger();
    let mut issued = Vec::new();
    for step in steps {
        match step {
            Step::Trigger(args) => {
                trigger.update(*args)?;
                issued.push(*args);
            }
            Step::Defer(args) => {
                recorder.defer(*args);
                issued.push(*args);
            }
            Step::Nested(inner) => {
                let nested = facade.try_batch(|rec| run_steps(facade, rec, inner))?;
                issued.extend(nested);
            }
        }
    }
    Ok(issued)
}
