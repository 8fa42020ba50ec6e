//! Trial-cycle recovery from state changes
//!
//! Some logger builds write a faulty trial counter. When that happens the
//! trial number can be rebuilt from the state-change stream: every record
//! whose old-state code marks the end-of-trial state closes a cycle, and
//! each record belongs to cycle `1 + number of trial ends before it`.

use super::Sample;

/// Old-state code that marks the end of a trial in the state machine.
pub const TRIAL_END_STATE: f64 = 6.0;

/// Assign a 1-based trial cycle to every state-change record.
///
/// `states` is the state-change channel where each sample's value is the
/// old-state code. Records after the last completed trial fall into the
/// (unfinished) next cycle.
#[must_use]
pub fn assign_trial_cycles(states: &[Sample]) -> Vec<u32> {
    let mut cycle = 1;
    let mut cycles = Vec::with_capacity(states.len());
    for sample in states {
        cycles.push(cycle);
        if sample.value == TRIAL_END_STATE {
            cycle += 1;
        }
    }
    cycles
}
