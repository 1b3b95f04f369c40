#![no_main]

//! Drive a facade with arbitrary scripts of triggers, manual deferrals,
//! nested batches and failing operations, and check that every call the
//! target sees arrives in issue order exactly once.

use std::cell::RefCell;
use std::rc::Rc;

use arbitrary::Arbitrary;
use gridbatch::{
    BatchConfig, BatchError, BatchingFacade, FailurePolicy, NestingPolicy, Recompute, Recorder,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Op {
    Trigger(u16),
    Defer(u16),
    Nested(Vec<Op>),
    Fail,
}

#[derive(Debug, Arbitrary)]
struct Input {
    reject_nested: bool,
    flush_on_failure: bool,
    batches: Vec<Vec<Op>>,
}

#[derive(Default)]
struct Sink {
    seen: Vec<u16>,
}

impl Recompute for Sink {
    type Args = u16;

    fn recompute(&mut self, args: u16) {
        self.seen.push(args);
    }
}

struct Failed;

impl From<BatchError> for Failed {
    fn from(_: BatchError) -> Self {
        Failed
    }
}

/// Returns the calls that must reach the target for this operation.
fn run(
    facade: &BatchingFacade<Sink>,
    rec: &Recorder<'_, Sink>,
    ops: &[Op],
    kept: &mut Vec<u16>,
) -> Result<(), Failed> {
    let trigger = rec.trigger();
    let flush = facade.config().on_failure == FailurePolicy::Flush;
    for op in ops {
        match op {
            Op::Trigger(v) => {
                trigger.update(*v)?;
                kept.push(*v);
            }
            Op::Defer(v) => {
                rec.defer(*v);
                kept.push(*v);
            }
            Op::Nested(inner) => {
                let mark = kept.len();
                let result = facade.try_batch(|nested| run(facade, nested, inner, kept));
                if result.is_err() && !flush {
                    kept.truncate(mark);
                }
            }
            Op::Fail => return Err(Failed),
        }
    }
    Ok(())
}

fuzz_target!(|input: Input| {
    let config = BatchConfig::new()
        .with_nesting(if input.reject_nested {
            NestingPolicy::Reject
        } else {
            NestingPolicy::Merge
        })
        .with_failure_policy(if input.flush_on_failure {
            FailurePolicy::Flush
        } else {
            FailurePolicy::Discard
        });
    let facade = BatchingFacade::with_config(Rc::new(RefCell::new(Sink::default())), config);

    let mut expected = Vec::new();
    for ops in input.batches.iter().take(32) {
        let mut kept = Vec::new();
        let result = facade.try_batch(|rec| run(&facade, rec, ops, &mut kept));
        if result.is_ok() || input.flush_on_failure {
            expected.extend(kept);
        }
        assert!(!facade.is_active());
        assert_eq!(facade.pending(), 0);
    }

    assert_eq!(facade.target().borrow().seen, expected);
    let stats = facade.stats();
    assert_eq!(stats.queued(), stats.replayed + stats.discarded);
});
