//! Anchor-based time extrapolation
//!
//! Hardware-stamped records (anchors) carry trustworthy times; everything
//! else carries a provisional, loosely-synced time. This pass recomputes
//! every non-anchor time from the surrounding anchors so the whole stream
//! shares one clock:
//!
//! - between two anchors: linear interpolation by index position,
//! - before the first / after the last anchor: extrapolation at the rate of
//!   the nearest two anchors (flat when the channel has a single anchor),
//! - zero-anchor channels keep their provisional times.
//!
//! The pass is total (no time is ever left unset) and idempotent: anchors
//! are never touched and non-anchors are pure functions of the anchors, so
//! reapplying it changes nothing.

use super::{LogData, Sample};

/// Recompute non-anchor times for every channel of a merged stream.
#[must_use]
pub fn extrapolate_time(mut data: LogData) -> LogData {
    for samples in data.values_mut() {
        extrapolate_channel(samples);
    }
    data
}

fn extrapolate_channel(samples: &mut [Sample]) {
    let anchors: Vec<(usize, f64)> = samples
        .iter()
        .enumerate()
        .filter(|(_, s)| s.measured)
        .map(|(i, s)| (i, s.time))
        .collect();
    if anchors.is_empty() {
        return;
    }

    // Local rate (ms per record) near the first and last anchors, used for
    // extrapolation past either end. A single anchor gives a flat rate.
    let lead_rate = pair_rate(anchors.first(), anchors.get(1));
    let tail_rate = pair_rate(anchors.get(anchors.len().wrapping_sub(2)), anchors.last());

    let (first_idx, first_time) = anchors[0];
    let (last_idx, last_time) = anchors[anchors.len() - 1];

    // `cursor` tracks the anchor interval containing the current index.
    let mut cursor = 0;
    for (k, sample) in samples.iter_mut().enumerate() {
        if sample.measured {
            continue;
        }
        sample.time = if k < first_idx {
            first_time - lead_rate * index_delta(first_idx, k)
        } else if k > last_idx {
            last_time + tail_rate * index_delta(k, last_idx)
        } else {
            while anchors[cursor + 1].0 < k {
                cursor += 1;
            }
            let (i, ti) = anchors[cursor];
            let (j, tj) = anchors[cursor + 1];
            ti + (tj - ti) * index_delta(k, i) / index_delta(j, i)
        };
    }
}

fn pair_rate(a: Option<&(usize, f64)>, b: Option<&(usize, f64)>) -> f64 {
    match (a, b) {
        (Some(&(ia, ta)), Some(&(ib, tb))) if ib > ia => (tb - ta) / index_delta(ib, ia),
        _ => 0.0,
    }
}

#[allow(clippy::cast_precision_loss)]
fn index_delta(hi: usize, lo: usize) -> f64 {
    (hi - lo) as f64
}
