use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use weapon_watch::config::WatchConfig;
use weapon_watch::CameraSelector;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "WEAPON_WATCH_CONFIG",
        "WEAPON_WATCH_CAMERA",
        "WEAPON_WATCH_MODEL",
        "WEAPON_WATCH_FALLBACK_MODEL",
        "WEAPON_WATCH_COOLDOWN_SECS",
        "WEAPON_WATCH_SKIP_FRAMES",
        "WEAPON_WATCH_KEYWORDS",
        "WEAPON_WATCH_ALERT_DIR",
        "WEAPON_WATCH_SNAPSHOT_DIR",
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
        "camera": { "device": "2", "width": 800, "height": 600, "target_fps": 15 },
        "model": { "path": "models/yolov8s.onnx", "fallback_path": "models/yolov8n.onnx", "max_detections": 50 },
        "policy": {
            "keywords": ["knife", "gun"],
            "class_ids": [43],
            "match_class_ids": false,
            "confidence_floors": [{ "class_id": 0, "min_confidence": 0.6 }],
            "cooldown_secs": 30
        },
        "monitor": { "skip_frames": 3, "read_retry_ms": 250, "max_frames": 1000 },
        "snapshots": { "enabled": false, "interval": 10 },
        "alerts": { "dir": "alerts" },
        "control": { "command_file": "cmd.txt", "stop_file": "stop.txt", "poll_interval_ms": 500 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("WEAPON_WATCH_CONFIG", file.path());
    std::env::set_var("WEAPON_WATCH_CAMERA", "stub://porch");
    std::env::set_var("WEAPON_WATCH_COOLDOWN_SECS", "90");
    std::env::set_var("WEAPON_WATCH_KEYWORDS", "Rifle, axe ,");

    let cfg = WatchConfig::load().expect("load config");

    assert_eq!(cfg.camera.selector, CameraSelector::Synthetic("porch".into()));
    assert_eq!((cfg.camera.width, cfg.camera.height), (800, 600));
    assert_eq!(cfg.camera.target_fps, 15);
    assert_eq!(cfg.model.path, Some(PathBuf::from("models/yolov8s.onnx")));
    assert_eq!(
        cfg.model.fallback_path,
        Some(PathBuf::from("models/yolov8n.onnx"))
    );
    assert_eq!(cfg.model.detector.max_detections, 50);
    assert_eq!(cfg.model.detector.confidence_threshold, 0.2);
    assert_eq!(cfg.policy.keywords, vec!["rifle", "axe"]);
    assert_eq!(cfg.policy.class_ids, vec![43]);
    assert!(!cfg.policy.match_class_ids);
    assert_eq!(cfg.policy.confidence_floors[0].min_confidence, 0.6);
    assert_eq!(cfg.policy.cooldown, Duration::from_secs(90));
    assert_eq!(cfg.monitor.skip_frames, 3);
    assert_eq!(cfg.monitor.read_retry_pause, Duration::from_millis(250));
    assert_eq!(cfg.monitor.max_frames, Some(1000));
    assert!(!cfg.snapshots.enabled);
    assert_eq!(cfg.snapshots.interval, 10);
    assert_eq!(cfg.alert_dir, PathBuf::from("alerts"));
    assert_eq!(cfg.control.command_file, PathBuf::from("cmd.txt"));
    assert_eq!(cfg.control.stop_file, PathBuf::from("stop.txt"));
    assert_eq!(cfg.control.poll_interval, Duration::from_millis(500));

    clear_env();
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = WatchConfig::load().expect("load config");
    assert_eq!(cfg.camera.selector, CameraSelector::Auto);
    assert_eq!(cfg.policy.keywords.len(), 15);
    assert_eq!(cfg.policy.class_ids, vec![0, 43, 45, 56, 67]);
    assert!(cfg.policy.match_class_ids);
    assert_eq!(cfg.monitor.frame_width, 320);
    assert_eq!(cfg.monitor.housekeeping_interval, Duration::from_secs(15));
    assert!(cfg.snapshots.enabled);
    assert_eq!(cfg.control.command_file, PathBuf::from("control_commands.txt"));
}

#[test]
fn model_can_be_disabled_from_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("WEAPON_WATCH_MODEL", "none");
    let cfg = WatchConfig::load().expect("load config");
    assert_eq!(cfg.model.path, None);

    clear_env();
}

#[test]
fn rejects_invalid_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("WEAPON_WATCH_COOLDOWN_SECS", "soon");
    assert!(WatchConfig::load().is_err());
    clear_env();

    std::env::set_var("WEAPON_WATCH_SKIP_FRAMES", "0");
    assert!(WatchConfig::load().is_err());
    clear_env();

    std::env::set_var("WEAPON_WATCH_CAMERA", "/dev/video0");
    assert!(WatchConfig::load().is_err());
    clear_env();
}

#[test]
fn rejects_unknown_sections() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{ "email": { "to": "x" } }"#).expect("write");
    std::env::set_var("WEAPON_WATCH_CONFIG", file.path());
    assert!(WatchConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_misspelled_keys_inside_sections() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    std::io::Write::write_all(&mut file, b"[policy]\ncooldown_sec = 5\n").expect("write");
    std::env::set_var("WEAPON_WATCH_CONFIG", file.path());
    let err = WatchConfig::load().expect_err("typo must be rejected");
    assert!(format!("{:#}", err).contains("cooldown_sec"));

    clear_env();
}
