//! Raw log record streams
//!
//! Common tabular representation shared by every log format adapter: a map
//! from event-channel name (wheel position, lick, reward, state change, ...)
//! to an ordered sequence of samples, plus the free-text comments found in
//! the source file.
//!
//! Invariant: within one channel, sample times are non-decreasing after
//! stitching and extrapolation.

pub mod extrapolate;
pub mod format;
pub mod stitch;
pub mod trials;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One log event on a channel.
///
/// `measured` marks an anchor record: a sample whose `time` was stamped by
/// the rig clock directly. Unmeasured samples carry a provisional,
/// loosely-synced time until [`extrapolate::extrapolate_time`] recomputes it
/// from the surrounding anchors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Time in milliseconds on the session clock
    pub time: f64,
    /// Channel payload (wheel tick count, state code, reward size, ...)
    pub value: f64,
    /// True when `time` was directly measured by the rig clock
    pub measured: bool,
}

impl Sample {
    /// Anchor sample with a directly measured time.
    #[must_use]
    pub const fn measured(time: f64, value: f64) -> Self {
        Self {
            time,
            value,
            measured: true,
        }
    }

    /// Sample with only a provisional (loosely-synced or ordinal) time.
    #[must_use]
    pub const fn unmeasured(time: f64, value: f64) -> Self {
        Self {
            time,
            value,
            measured: false,
        }
    }
}

/// Event-channel name → ordered samples.
///
/// `BTreeMap` keeps channel iteration order deterministic, which makes the
/// saved columnar tables and the stitch/extrapolate passes reproducible.
pub type LogData = BTreeMap<String, Vec<Sample>>;

/// Free-text annotation from a log file.
///
/// Order is preserved relative to the source run: comments are emitted in
/// file order and tagged with the run index once runs are combined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Run the comment came from (0 for a single-run session)
    pub run: usize,
    /// 1-based line number in the source log
    pub line: usize,
    /// Comment text with the marker stripped
    pub text: String,
}

impl Comment {
    /// Create a comment for run 0. The run index is rewritten when runs are
    /// combined.
    #[must_use]
    pub fn new(line: usize, text: impl Into<String>) -> Self {
        Self {
            run: 0,
            line,
            text: text.into(),
        }
    }
}

/// Overlay `rig` channels onto `stim` channels.
///
/// Riglog entries take precedence on a name collision; the merge is a plain
/// overlay, matching the historical dict-merge behavior. Collisions are rare
/// (formats use disjoint channel vocabularies) but real, so each clobbered
/// channel is logged at warn level.
#[must_use]
pub fn overlay(stim: LogData, rig: LogData) -> LogData {
    let mut merged = stim;
    for (channel, samples) in rig {
        if merged.contains_key(&channel) {
            tracing::warn!(channel = %channel, "riglog channel shadows stimlog channel of the same name");
        }
        merged.insert(channel, samples);
    }
    merged
}
