use std::fs;
use std::time::Duration;

use dhtbench::BenchConfig;
use tempfile::TempDir;

#[test]
fn zero_timeout_means_no_limit() {
    let config = BenchConfig {
        timeout_ms: 0,
        ..BenchConfig::default()
    };
    assert_eq!(config.timeout(), None);
    assert_eq!(BenchConfig::default().timeout(), Some(Duration::from_secs(30)));
}

#[test]
fn files_only_name_what_they_change() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bench.json");
    fs::write(&path, r#"{"timeout_ms": 1500, "passes": 5}"#).unwrap();

    let config = BenchConfig::from_file(&path).unwrap();

    assert_eq!(config.timeout(), Some(Duration::from_millis(1500)));
    assert_eq!(config.passes, 5);
    assert_eq!(config.key_count, BenchConfig::default().key_count);
}

#[test]
fn bad_files_are_rejected() {
    let dir = TempDir::new().unwrap();
    let unknown = dir.path().join("unknown.json");
    fs::write(&unknown, r#"{"timeout": 10}"#).unwrap();
    let zero_passes = dir.path().join("zero.json");
    fs::write(&zero_passes, r#"{"passes": 0}"#).unwrap();

    assert!(BenchConfig::from_file(&unknown).is_err());
    assert!(BenchConfig::from_file(&zero_passes).is_err());
}
