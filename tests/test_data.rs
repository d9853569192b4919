use std::fs;

use gepa_rs::{DataLoader, load_jsonl};

#[test]
fn load_jsonl_reads_one_value_per_line() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("train.jsonl");
    fs::write(
        &path,
        "{\"question\": \"2+2?\", \"answer\": \"4\"}\n\n{\"question\": \"3+3?\", \"answer\": \"6\"}\n",
    )
    .expect("write jsonl");

    let loader = load_jsonl(&path).expect("load");
    assert_eq!(loader.size(), 2, "blank lines are skipped");
    assert_eq!(loader.all_ids(), vec![0, 1]);

    let fetched = loader.fetch(&[1]).expect("fetch");
    assert_eq!(fetched[0]["answer"], "6");
}

#[test]
fn load_jsonl_rejects_malformed_lines() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("bad.jsonl");
    fs::write(&path, "{\"ok\": true}\nnot json\n").expect("write jsonl");
    assert!(load_jsonl(&path).is_err());
}

#[test]
fn load_jsonl_missing_file_is_an_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    assert!(load_jsonl(&dir.path().join("absent.jsonl")).is_err());
}
