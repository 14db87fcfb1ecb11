use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use zonewatch::config::EngineConfig;
use zonewatch::{DeviceHint, HeaderPolicy, Point};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "ZONEWATCH_CONFIG",
        "ZONEWATCH_SOURCE_URL",
        "ZONEWATCH_DETECTOR",
        "ZONEWATCH_MODEL_PATH",
        "ZONEWATCH_CONFIDENCE",
        "ZONEWATCH_DEVICE",
        "ZONEWATCH_MAX_CAPACITY",
        "ZONEWATCH_ALARM",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "source": {
            "url": "rtsp://camera-1/stream",
            "target_fps": 15,
            "width": 1280,
            "height": 720
        },
        "detector": {
            "backend": "marker",
            "confidence": 0.55,
            "device": "cpu"
        },
        "intrusion": {
            "zone": {"name": "loading bay", "polygon": [[700, 0], [1280, 0], [1280, 720], [700, 720]]},
            "capture_dir": "bay/captures",
            "log_path": "bay/intrusion_log.csv",
            "capture_interval_secs": 10,
            "tone": {"frequency_hz": 900}
        },
        "crowd": {
            "zones": [
                {"name": "lobby", "polygon": [[0, 0], [640, 0], [640, 720], [0, 720]]},
                {"name": "hall", "polygon": [[640, 0], [1280, 0], [1280, 720], [640, 720]]}
            ],
            "max_capacity": 40,
            "count_log_interval_secs": 120
        },
        "alarm": {"enabled": true},
        "logs": {"header_policy": "lenient"}
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("ZONEWATCH_CONFIG", file.path());
    std::env::set_var("ZONEWATCH_DEVICE", "cuda:0");
    std::env::set_var("ZONEWATCH_MAX_CAPACITY", "35");
    std::env::set_var("ZONEWATCH_ALARM", "off");

    let cfg = EngineConfig::load(None).expect("load config");

    assert_eq!(cfg.source.url, "rtsp://camera-1/stream");
    assert_eq!(cfg.source.target_fps, 15);
    assert_eq!((cfg.source.width, cfg.source.height), (1280, 720));
    assert_eq!(cfg.detector.backend, "marker");
    assert_eq!(cfg.detector.settings.confidence_threshold, 0.55);
    assert_eq!(cfg.detector.settings.device, DeviceHint::Cuda(0));

    assert_eq!(cfg.intrusion.zone.name(), "loading bay");
    assert!(cfg.intrusion.zone.contains(Point::new(700, 360)));
    assert!(!cfg.intrusion.zone.contains(Point::new(699, 360)));
    assert_eq!(cfg.intrusion.settings.capture_dir, PathBuf::from("bay/captures"));
    assert_eq!(cfg.intrusion.log_path, PathBuf::from("bay/intrusion_log.csv"));
    assert_eq!(cfg.intrusion.settings.capture_interval, Duration::from_secs(10));
    assert_eq!(cfg.intrusion.settings.tone.frequency_hz, 900);
    assert_eq!(cfg.intrusion.settings.tone.duration_ms, 700);

    assert_eq!(cfg.crowd.zones.len(), 2);
    assert!(cfg.crowd.zones.get("hall").is_some());
    assert_eq!(cfg.crowd.settings.max_capacity, 35);
    assert_eq!(cfg.crowd.settings.count_log_interval, Duration::from_secs(120));
    assert_eq!(cfg.crowd.settings.snapshot_interval, Duration::from_secs(30));

    assert!(!cfg.alarm_enabled);
    assert_eq!(cfg.header_policy, HeaderPolicy::Lenient);

    clear_env();
}

#[test]
fn explicit_path_wins_over_environment_path() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut chosen = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut chosen, br#"{"crowd": {"max_capacity": 7}}"#).expect("write");
    std::env::set_var("ZONEWATCH_CONFIG", "/nonexistent/zonewatch.json");

    let cfg = EngineConfig::load(Some(chosen.path())).expect("load config");
    assert_eq!(cfg.crowd.settings.max_capacity, 7);

    clear_env();
}

#[test]
fn defaults_apply_without_a_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = EngineConfig::load(None).expect("load config");
    assert_eq!(cfg.source.url, "stub://camera0");
    assert_eq!(cfg.detector.backend, "marker");
    assert_eq!(cfg.intrusion.zone.name(), "Restricted");
    assert!(cfg.intrusion.zone.contains(Point::new(320, 240)));
    assert!(!cfg.intrusion.zone.contains(Point::new(100, 240)));
    assert_eq!(cfg.crowd.settings.max_capacity, 20);
    assert!(cfg.alarm_enabled);

    clear_env();
}

#[test]
fn invalid_env_numbers_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("ZONEWATCH_CONFIDENCE", "very");
    assert!(EngineConfig::load(None).is_err());
    std::env::set_var("ZONEWATCH_CONFIDENCE", "1.7");
    assert!(EngineConfig::load(None).is_err());
    std::env::remove_var("ZONEWATCH_CONFIDENCE");

    std::env::set_var("ZONEWATCH_MAX_CAPACITY", "-3");
    assert!(EngineConfig::load(None).is_err());
    std::env::set_var("ZONEWATCH_MAX_CAPACITY", "0");
    assert!(EngineConfig::load(None).is_err());

    clear_env();
}

#[test]
fn malformed_zone_in_file_fails_load() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(
        &mut file,
        br#"{"intrusion": {"zone": {"name": "gate", "polygon": [[0, 0], [10, 0]]}}}"#,
    )
    .expect("write config");
    std::env::set_var("ZONEWATCH_CONFIG", file.path());

    let err = EngineConfig::load(None).unwrap_err();
    let typed = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<zonewatch::EngineError>())
        .expect("typed zone error");
    assert_eq!(typed.code(), "MALFORMED_ZONE_CONFIG");

    clear_env();
}

fn load_json(json: &str) -> anyhow::Result<EngineConfig> {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    EngineConfig::load(Some(file.path()))
}

#[test]
fn oversized_intervals_are_config_errors() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let err = load_json(r#"{"crowd": {"count_log_interval_secs": 1e20}}"#).unwrap_err();
    assert!(err.to_string().contains("crowd.count_log_interval_secs"));
    assert!(load_json(r#"{"intrusion": {"capture_interval_secs": 1e300}}"#).is_err());
    assert!(load_json(r#"{"crowd": {"count_log_interval_secs": 86400}}"#).is_ok());

    clear_env();
}

#[test]
fn snapshot_intervals_below_one_second_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let err = load_json(r#"{"intrusion": {"capture_interval_secs": 0.5}}"#).unwrap_err();
    assert!(err.to_string().contains("intrusion.capture_interval_secs"));
    assert!(load_json(r#"{"crowd": {"snapshot_interval_secs": 0.2}}"#).is_err());

    // count rows carry no file name, so sub-second cadence is fine
    let cfg = load_json(r#"{"crowd": {"count_log_interval_secs": 0.5}}"#).expect("load config");
    assert_eq!(cfg.crowd.settings.count_log_interval, Duration::from_millis(500));
    assert!(load_json(r#"{"intrusion": {"capture_interval_secs": 1}}"#).is_ok());

    clear_env();
}
