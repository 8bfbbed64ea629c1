use engine_bridge::settings::PipelineSettings;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn missing_file_loads_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");

    let settings = PipelineSettings::load(path.to_str().unwrap()).unwrap();
    assert_eq!(settings, PipelineSettings::default());
    assert_eq!(settings.ring_depth(), 2);
    assert_eq!(settings.request_timeout(), None);
    assert_eq!(settings.screenshot_timeout(), Some(Duration::from_millis(1000)));
}

#[test]
fn partial_file_fills_in_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{ "ring_depth": 64, "request_timeout_ms": 250 }"#).unwrap();

    let settings = PipelineSettings::load(path.to_str().unwrap()).unwrap();
    assert_eq!(settings.ring_depth, 64);
    assert_eq!(settings.ring_depth(), 32);
    assert_eq!(settings.request_timeout(), Some(Duration::from_millis(250)));
    assert_eq!(settings.target_fps, 60);
    assert_eq!(settings.shutdown_join_timeout(), Duration::from_millis(2000));
}

#[test]
fn malformed_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "{ ring_depth: ").unwrap();

    assert!(PipelineSettings::load(path.to_str().unwrap()).is_err());
}

#[test]
fn save_then_load_keeps_values() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let path = path.to_str().unwrap();

    let settings = PipelineSettings {
        ring_depth: 4,
        target_fps: 30,
        request_timeout_ms: Some(500),
        screenshot_timeout_ms: None,
        debug_logging: true,
        log_file: Some("bridge.log".into()),
        ..PipelineSettings::default()
    };
    settings.save(path).unwrap();

    let loaded = PipelineSettings::load(path).unwrap();
    assert_eq!(loaded, settings);
    assert_eq!(loaded.screenshot_timeout(), None);
    assert_eq!(loaded.tick_interval(), Duration::from_micros(33_333));
}
