//! Multi-run log stitching
//!
//! A session recorded in several runs produces one log pair per run, each
//! with its clock restarting near zero. Stitching concatenates the per-run
//! streams channel by channel, shifting every run after the first by the
//! cumulative duration of all prior runs *of that channel*, so the merged
//! stream is continuous and non-decreasing.
//!
//! A channel absent from some run still appears in the merged stream; the
//! runs lacking it simply contribute nothing (and no offset, since an empty
//! run has zero duration for that channel).

use std::collections::BTreeSet;

use super::{LogData, Sample};

/// Duration of one run's channel: the last sample time, clocks restarting
/// near zero each run. Empty channels last nothing.
fn channel_duration(samples: &[Sample]) -> f64 {
    samples.last().map_or(0.0, |s| s.time)
}

/// Merge per-run streams of one log kind into a single continuous stream.
///
/// Runs must be supplied in run order. Per-run streams are assumed
/// non-decreasing in time per channel (the format adapters emit them in file
/// order); the merged stream is then non-decreasing by construction.
#[must_use]
pub fn stitch_runs(runs: &[LogData]) -> LogData {
    let channels: BTreeSet<&String> = runs.iter().flat_map(|r| r.keys()).collect();

    let mut merged = LogData::new();
    for channel in channels {
        let mut offset = 0.0;
        let mut stream: Vec<Sample> = Vec::new();
        for run in runs {
            let Some(samples) = run.get(channel) else {
                continue;
            };
            stream.extend(samples.iter().map(|s| Sample {
                time: s.time + offset,
                ..*s
            }));
            offset += channel_duration(samples);
        }
        merged.insert(channel.clone(), stream);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(channel: &str, times: &[f64]) -> LogData {
        let mut data = LogData::new();
        data.insert(
            channel.to_string(),
            times.iter().map(|&t| Sample::measured(t, 0.0)).collect(),
        );
        data
    }

    #[test]
    fn test_single_run_unchanged() {
        let merged = stitch_runs(&[run("wheel", &[0.0, 10.0, 20.0])]);
        let times: Vec<f64> = merged["wheel"].iter().map(|s| s.time).collect();
        assert_eq!(times, vec![0.0, 10.0, 20.0]);
    }

    #[test]
    fn test_offsets_are_prefix_sums_of_durations() {
        let runs = [
            run("wheel", &[0.0, 100.0]),
            run("wheel", &[0.0, 50.0]),
            run("wheel", &[0.0, 25.0]),
        ];
        let merged = stitch_runs(&runs);
        let times: Vec<f64> = merged["wheel"].iter().map(|s| s.time).collect();
        // run 2 shifted by d1=100, run 3 by d1+d2=150
        assert_eq!(times, vec![0.0, 100.0, 100.0, 150.0, 150.0, 175.0]);
    }

    #[test]
    fn test_channel_absent_in_middle_run() {
        let runs = [
            run("lick", &[0.0, 40.0]),
            run("wheel", &[0.0, 10.0]),
            run("lick", &[0.0, 5.0]),
        ];
        let merged = stitch_runs(&runs);
        // lick appears with samples from runs 1 and 3 only; run 2 contributes
        // neither samples nor offset for lick
        let times: Vec<f64> = merged["lick"].iter().map(|s| s.time).collect();
        assert_eq!(times, vec![0.0, 40.0, 40.0, 45.0]);
        assert_eq!(merged["wheel"].len(), 2);
    }

    #[test]
    fn test_measured_flags_survive_stitching() {
        let mut r1 = LogData::new();
        r1.insert(
            "vstim".to_string(),
            vec![Sample::measured(0.0, 1.0), Sample::unmeasured(5.0, 2.0)],
        );
        let mut r2 = LogData::new();
        r2.insert("vstim".to_string(), vec![Sample::unmeasured(1.0, 3.0)]);

        let merged = stitch_runs(&[r1, r2]);
        assert!(merged["vstim"][0].measured);
        assert!(!merged["vstim"][1].measured);
        assert!(!merged["vstim"][2].measured);
        assert_eq!(merged["vstim"][2].time, 6.0);
    }

    #[test]
    fn test_empty_input() {
        assert!(stitch_runs(&[]).is_empty());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn sorted_times() -> impl Strategy<Value = Vec<f64>> {
            prop::collection::vec(0.0f64..10_000.0, 1..50).prop_map(|mut v| {
                v.sort_by(f64::total_cmp);
                v
            })
        }

        proptest! {
            /// Merged stream is non-decreasing whenever per-run streams are.
            #[test]
            fn prop_stitched_stream_monotone(
                runs_times in prop::collection::vec(sorted_times(), 1..6)
            ) {
                let runs: Vec<LogData> = runs_times.iter().map(|t| run("wheel", t)).collect();
                let merged = stitch_runs(&runs);
                let times: Vec<f64> = merged["wheel"].iter().map(|s| s.time).collect();
                for pair in times.windows(2) {
                    prop_assert!(pair[0] <= pair[1]);
                }
            }

            /// No samples are lost or invented.
            #[test]
            fn prop_sample_count_preserved(
                runs_times in prop::collection::vec(sorted_times(), 1..6)
            ) {
                let total: usize = runs_times.iter().map(Vec::len).sum();
                let runs: Vec<LogData> = runs_times.iter().map(|t| run("wheel", t)).collect();
                let merged = stitch_runs(&runs);
                prop_assert_eq!(merged["wheel"].len(), total);
            }

            /// Each run's block starts exactly at the prior runs' summed durations.
            #[test]
            fn prop_block_offsets_are_prefix_durations(
                runs_times in prop::collection::vec(sorted_times(), 2..5)
            ) {
                let runs: Vec<LogData> = runs_times.iter().map(|t| run("wheel", t)).collect();
                let merged = stitch_runs(&runs);

                let mut cursor = 0;
                let mut expected_offset = 0.0;
                for times in &runs_times {
                    let first = merged["wheel"][cursor].time;
                    prop_assert!((first - (times[0] + expected_offset)).abs() < 1e-9);
                    cursor += times.len();
                    expected_offset += times.last().copied().unwrap_or(0.0);
                }
            }
        }
    }
}
