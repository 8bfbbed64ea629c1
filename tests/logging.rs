use std::{fs, thread::sleep, time::Duration};

use serial_test::serial;
use tempfile::tempdir;

// The subscriber is process-global, so everything that depends on the first
// `init` lives in this one test.
#[test]
#[serial]
fn writes_log_file_once_initialised() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bridge.log");
    let unused = dir.path().join("second.log");

    engine_bridge::logging::init(true, Some(path.clone()));
    tracing::warn!("engine pump test line");

    // A second init is a no-op and must not open another file.
    engine_bridge::logging::init(true, Some(unused.clone()));
    tracing::warn!("after second init");

    sleep(Duration::from_millis(100));

    assert!(path.exists(), "log file was not created");
    let contents = fs::read_to_string(&path).unwrap();
    assert!(contents.contains("engine pump test line"));
    assert!(contents.contains("after second init"));
    assert!(!unused.exists(), "second init should not create a file");
}
