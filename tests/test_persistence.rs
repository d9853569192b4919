use std::collections::BTreeMap;
use std::fs;

use gepa_rs::{
    Candidate, GepaState, PersistError, SCHEMA_VERSION, STATE_FILE, STOP_SENTINEL, load_state,
    save_state, stop_requested,
};

fn sample_state() -> GepaState {
    let seed = Candidate::new([("instruction", "answer"), ("style", "short")]);
    let mut state = GepaState::new(seed.clone(), &[0.4, 0.9], &[0, 1]).expect("seed state");
    let mut child = seed;
    child.set("instruction", "answer carefully");
    state
        .add_program(
            child,
            vec![0],
            BTreeMap::from([(0, 0.9), (1, 0.6)]),
            Some(1),
        )
        .expect("child program");
    state
}

#[test]
fn save_load_round_trip_is_structural_identity() {
    let dir = tempfile::tempdir().expect("temp dir");
    let state = sample_state();

    save_state(dir.path(), &state).expect("save");
    let loaded = load_state(dir.path())
        .expect("load")
        .expect("snapshot present");
    assert_eq!(loaded, state);
}

#[test]
fn missing_snapshot_is_none() {
    let dir = tempfile::tempdir().expect("temp dir");
    assert!(load_state(dir.path()).expect("load").is_none());
}

#[test]
fn unknown_schema_version_is_rejected() {
    let dir = tempfile::tempdir().expect("temp dir");
    let state = sample_state();
    save_state(dir.path(), &state).expect("save");

    // Doctor the version field.
    let path = dir.path().join(STATE_FILE);
    let text = fs::read_to_string(&path).expect("read snapshot");
    let doctored = text.replacen(
        &format!("\"version\":{SCHEMA_VERSION}"),
        "\"version\":99",
        1,
    );
    assert_ne!(text, doctored, "version field must be present to doctor");
    fs::write(&path, doctored).expect("write doctored snapshot");

    match load_state(dir.path()) {
        Err(PersistError::UnsupportedVersion { found, supported }) => {
            assert_eq!(found, 99);
            assert_eq!(supported, SCHEMA_VERSION);
        }
        other => panic!("expected UnsupportedVersion, got {other:?}"),
    }
}

#[test]
fn corrupt_snapshot_is_a_decode_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    fs::write(dir.path().join(STATE_FILE), b"not json").expect("write garbage");
    assert!(matches!(
        load_state(dir.path()),
        Err(PersistError::Decode { .. })
    ));
}

#[test]
fn stop_sentinel_probe() {
    let dir = tempfile::tempdir().expect("temp dir");
    assert!(!stop_requested(dir.path()));
    fs::write(dir.path().join(STOP_SENTINEL), b"").expect("touch sentinel");
    assert!(stop_requested(dir.path()));
}
