//! End-to-end ingestion: fixture session on disk → read → reconcile →
//! save → reload → database bookkeeping.

use std::fs;
use std::path::Path;

use serde_json::json;

use rig_ingest::config::Config;
use rig_ingest::db::{row, SESSIONS_TABLE};
use rig_ingest::session::{LogVersion, Session, SessionData};

const PROT: &str = "\
controller = DetectionController
stimDuration = 1.5
nTrials = 300

sf\ttf\tcontrast
0.04\t1\t0.5
0.08\t2\t1
0.08\t2\t0.5
";

const STIMLOG: &str = "\
# CODES: vstim=10,stateMachine=20
# animal settled quickly
10,100.0,98.0,1
10,116.0,114.0,2
10,132.0,,3
20,140.0,138.0,6
";

const RIGLOG: &str = "\
# CODES: wheel=2,lick=3,reward=4
2,10.0,9.5,100
2,20.0,19.5,104
3,25.0,24.5,1
4,30.0,29.5,5
";

const VSTIMLOG: &str = "\
# CODES: vstim=10,wheel=2
# legacy single-log recorder
10,100.0,98.0,1
10,116.0,114.0,2
10,132.0,,3
2,10.0,9.5,100
2,20.0,19.5,104
";

fn fixture(runs: usize) -> (tempfile::TempDir, Config) {
    let root = tempfile::tempdir().unwrap();
    let config = Config {
        presentation_path: root.path().join("presentation"),
        analysis_path: root.path().join("analysis"),
        database_path: root.path().join("db"),
        weight_sheet: None,
    };
    let session = config.presentation_path.join("230615_KC045_detect_AB");
    fs::create_dir_all(&session).unwrap();
    fs::write(session.join("detect_level3.txt"), PROT).unwrap();

    let write_pair = |dir: &Path| {
        fs::write(dir.join("detect.stimlog"), STIMLOG).unwrap();
        fs::write(dir.join("detect.riglog"), RIGLOG).unwrap();
    };
    if runs <= 1 {
        write_pair(&session);
    } else {
        for i in 0..runs {
            let run = session.join(format!("run{i:03}"));
            fs::create_dir_all(&run).unwrap();
            write_pair(&run);
        }
    }
    (root, config)
}

#[test]
fn full_pipeline_single_run() {
    let (_root, config) = fixture(1);
    let mut session = Session::new(&config, "230615_KC045_detect_AB", false, false).unwrap();

    // metadata derived from directory convention and protocol file
    assert_eq!(session.meta().animalid, "KC045");
    assert_eq!(session.meta().user, "AB");
    assert_eq!(session.meta().baredate, "230615");
    assert_eq!(session.meta().level, "3");
    assert!(!session.meta().opto);
    assert_eq!(session.meta().sf_values, vec![0.04, 0.08]);
    assert_eq!(session.meta().tf_values, vec![1.0, 2.0]);
    assert_eq!(session.log_version(), LogVersion::Stimpy);

    // nothing saved yet
    assert!(!session.is_saved());

    // read, reconcile, save
    let raw = session.read_data().unwrap();
    assert_eq!(raw.runs.len(), 1);
    let run = &raw.runs[0];
    for channel in ["vstim", "stateMachine", "wheel", "lick", "reward"] {
        assert!(run.data.contains_key(channel), "missing channel {channel}");
    }
    // streams are time-ordered after reconciliation
    for samples in run.data.values() {
        for pair in samples.windows(2) {
            assert!(pair[0].time <= pair[1].time);
        }
    }
    assert_eq!(run.comments.len(), 1);
    assert_eq!(run.comments[0].text, "animal settled quickly");

    let tables = SessionData::new(raw.runs.iter().map(|r| r.data.clone()).collect());
    session.save_data(&tables).unwrap();
    assert!(session.is_saved());

    // reload reconstructs the same tables
    assert_eq!(session.load_data().unwrap(), tables);
}

#[test]
fn full_pipeline_pyvstim_session() {
    let (_root, config) = {
        let root = tempfile::tempdir().unwrap();
        let config = Config {
            presentation_path: root.path().join("presentation"),
            analysis_path: root.path().join("analysis"),
            database_path: root.path().join("db"),
            weight_sheet: None,
        };
        let session = config.presentation_path.join("230615_KC045_detect_AB");
        fs::create_dir_all(&session).unwrap();
        fs::write(session.join("detect_level3.txt"), PROT).unwrap();
        fs::write(session.join("detect.vstimlog"), VSTIMLOG).unwrap();
        (root, config)
    };
    let mut session = Session::new(&config, "230615_KC045_detect_AB", false, false).unwrap();
    assert_eq!(session.log_version(), LogVersion::PyVStim);

    let raw = session.read_data().unwrap();
    assert_eq!(raw.runs.len(), 1, "one combined log reads as one run");
    let run = &raw.runs[0];
    assert!(run.data.contains_key("vstim"));
    assert!(run.data.contains_key("wheel"));
    // unmeasured sample re-timed past the surrounding anchors
    assert!(!run.data["vstim"][2].measured);
    assert_eq!(run.data["vstim"][2].time, 130.0);
    assert_eq!(run.comments[0].text, "legacy single-log recorder");

    let tables = SessionData::new(raw.runs.iter().map(|r| r.data.clone()).collect());
    session.save_data(&tables).unwrap();
    assert!(session.is_saved());
    assert_eq!(session.load_data().unwrap(), tables);
}

#[test]
fn full_pipeline_multi_run() {
    let (_root, config) = fixture(3);
    let mut session = Session::new(&config, "230615_KC045_detect_AB", false, false).unwrap();

    let raw = session.read_data().unwrap();
    assert_eq!(raw.runs.len(), 3);

    let tables = SessionData::new(raw.runs.iter().map(|r| r.data.clone()).collect());
    session.save_data(&tables).unwrap();
    assert!(session.is_saved());
    assert_eq!(session.paths().data_paths.len(), 3);

    // dropping one run's save file flips is_saved and names the gap
    fs::remove_file(&session.paths().data_paths[2]).unwrap();
    assert!(!session.is_saved());
}

#[test]
fn database_bookkeeping_roundtrip() {
    let (_root, config) = fixture(1);
    let mut session = Session::new(&config, "230615_KC045_detect_AB", false, false).unwrap();

    assert_eq!(session.overall_session_no().unwrap(), 1);
    assert_eq!(session.get_latest_trial_count(), 0);

    session
        .save_to_db(row(&[("paradigm", json!("detection")), ("trial_count", json!(120))]))
        .unwrap();

    // reopening the same session sees the persisted state
    let mut reopened = Session::new(&config, "230615_KC045_detect_AB", true, false).unwrap();
    assert_eq!(reopened.overall_session_no().unwrap(), 2);
    let rows = reopened
        .db()
        .get_entries(
            &row(&[("sessionId", json!(reopened.meta().session_id))]),
            SESSIONS_TABLE,
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["paradigm"], json!("detection"));
}

#[test]
fn session_log_appends_on_reload() {
    let (_root, config) = fixture(1);
    {
        let mut session =
            Session::new(&config, "230615_KC045_detect_AB", false, false).unwrap();
        session.read_data().unwrap();
    }
    let log_path = config
        .analysis_path
        .join("230615_KC045_detect_AB")
        .join("session.log");
    let first_len = fs::read_to_string(&log_path).unwrap().len();

    {
        let _session = Session::new(&config, "230615_KC045_detect_AB", true, false).unwrap();
    }
    let second_len = fs::read_to_string(&log_path).unwrap().len();
    assert!(second_len > first_len, "append mode must accumulate");
}

#[test]
fn mat_mirror_written_alongside_parquet() {
    let (_root, config) = fixture(1);
    let mut session = Session::new(&config, "230615_KC045_detect_AB", false, true).unwrap();
    let raw = session.read_data().unwrap();
    let tables = SessionData::new(raw.runs.iter().map(|r| r.data.clone()).collect());
    session.save_data(&tables).unwrap();

    let mat = session.paths().data_paths[0].with_extension("mat");
    assert!(mat.is_file());
    assert!(fs::metadata(&mat).unwrap().len() > 0);
}
