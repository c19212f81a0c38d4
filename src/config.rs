use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::control::{DEFAULT_COMMAND_FILE, DEFAULT_POLL_INTERVAL, DEFAULT_STOP_FILE};
use crate::detect::DetectorSettings;
use crate::ingest::{CameraConfig, CameraSelector};
use crate::monitor::MonitorSettings;
use crate::policy::{ConfidenceFloor, PolicySettings};

const DEFAULT_MODEL_PATH: &str = "yolov8n.onnx";
const DEFAULT_ALERT_DIR: &str = ".";
const DEFAULT_SNAPSHOT_DIR: &str = "output_frames";
const DEFAULT_SNAPSHOT_INTERVAL: u64 = 5;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct WatchConfigFile {
    camera: Option<CameraConfigFile>,
    model: Option<ModelConfigFile>,
    policy: Option<PolicyConfigFile>,
    monitor: Option<MonitorConfigFile>,
    snapshots: Option<SnapshotConfigFile>,
    alerts: Option<AlertConfigFile>,
    control: Option<ControlConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    path: Option<String>,
    fallback_path: Option<String>,
    confidence_threshold: Option<f32>,
    max_detections: Option<usize>,
    input_size: Option<u32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PolicyConfigFile {
    keywords: Option<Vec<String>>,
    class_ids: Option<Vec<u32>>,
    match_class_ids: Option<bool>,
    confidence_floors: Option<Vec<ConfidenceFloor>>,
    cooldown_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MonitorConfigFile {
    frame_width: Option<u32>,
    frame_height: Option<u32>,
    skip_frames: Option<u64>,
    housekeeping_secs: Option<u64>,
    fps_log_every: Option<u64>,
    read_retry_ms: Option<u64>,
    max_consecutive_read_failures: Option<u32>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SnapshotConfigFile {
    enabled: Option<bool>,
    dir: Option<PathBuf>,
    interval: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AlertConfigFile {
    dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ControlConfigFile {
    command_file: Option<PathBuf>,
    stop_file: Option<PathBuf>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub camera: CameraConfig,
    pub model: ModelSettings,
    pub policy: PolicySettings,
    pub monitor: MonitorSettings,
    pub snapshots: SnapshotSettings,
    pub alert_dir: PathBuf,
    pub control: ControlSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    /// Primary model. `None` runs the stub backend.
    pub path: Option<PathBuf>,
    /// Tried once when the primary fails to load.
    pub fallback_path: Option<PathBuf>,
    pub detector: DetectorSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSettings {
    pub enabled: bool,
    pub dir: PathBuf,
    pub interval: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlSettings {
    pub command_file: PathBuf,
    pub stop_file: PathBuf,
    pub poll_interval: Duration,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from(DEFAULT_MODEL_PATH)),
            fallback_path: None,
            detector: DetectorSettings::default(),
        }
    }
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(DEFAULT_SNAPSHOT_DIR),
            interval: DEFAULT_SNAPSHOT_INTERVAL,
        }
    }
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            command_file: PathBuf::from(DEFAULT_COMMAND_FILE),
            stop_file: PathBuf::from(DEFAULT_STOP_FILE),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            model: ModelSettings::default(),
            policy: PolicySettings::default(),
            monitor: MonitorSettings::default(),
            snapshots: SnapshotSettings::default(),
            alert_dir: PathBuf::from(DEFAULT_ALERT_DIR),
            control: ControlSettings::default(),
        }
    }
}

impl WatchConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("WEAPON_WATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: WatchConfigFile) -> Result<Self> {
        let camera_file = file.camera.unwrap_or_default();
        let camera_defaults = CameraConfig::default();
        let camera = CameraConfig {
            selector: match camera_file.device {
                Some(device) => device.parse()?,
                None => camera_defaults.selector,
            },
            width: camera_file.width.unwrap_or(camera_defaults.width),
            height: camera_file.height.unwrap_or(camera_defaults.height),
            target_fps: camera_file.target_fps.unwrap_or(camera_defaults.target_fps),
        };

        let model_file = file.model.unwrap_or_default();
        let model_defaults = ModelSettings::default();
        let detector_defaults = model_defaults.detector;
        let model = ModelSettings {
            path: match model_file.path {
                Some(path) => model_path(&path),
                None => model_defaults.path,
            },
            fallback_path: model_file.fallback_path.as_deref().and_then(model_path),
            detector: DetectorSettings {
                confidence_threshold: model_file
                    .confidence_threshold
                    .unwrap_or(detector_defaults.confidence_threshold),
                max_detections: model_file
                    .max_detections
                    .unwrap_or(detector_defaults.max_detections),
                input_size: model_file.input_size.unwrap_or(detector_defaults.input_size),
                iou_threshold: model_file
                    .iou_threshold
                    .unwrap_or(detector_defaults.iou_threshold),
            },
        };

        let policy_file = file.policy.unwrap_or_default();
        let policy_defaults = PolicySettings::default();
        let policy = PolicySettings {
            keywords: policy_file.keywords.unwrap_or(policy_defaults.keywords),
            class_ids: policy_file.class_ids.unwrap_or(policy_defaults.class_ids),
            match_class_ids: policy_file
                .match_class_ids
                .unwrap_or(policy_defaults.match_class_ids),
            confidence_floors: policy_file
                .confidence_floors
                .unwrap_or(policy_defaults.confidence_floors),
            cooldown: policy_file
                .cooldown_secs
                .map(Duration::from_secs)
                .unwrap_or(policy_defaults.cooldown),
        };

        let monitor_file = file.monitor.unwrap_or_default();
        let monitor_defaults = MonitorSettings::default();
        let monitor = MonitorSettings {
            frame_width: monitor_file.frame_width.unwrap_or(monitor_defaults.frame_width),
            frame_height: monitor_file
                .frame_height
                .unwrap_or(monitor_defaults.frame_height),
            skip_frames: monitor_file.skip_frames.unwrap_or(monitor_defaults.skip_frames),
            housekeeping_interval: monitor_file
                .housekeeping_secs
                .map(Duration::from_secs)
                .unwrap_or(monitor_defaults.housekeeping_interval),
            fps_log_every: monitor_file
                .fps_log_every
                .unwrap_or(monitor_defaults.fps_log_every),
            read_retry_pause: monitor_file
                .read_retry_ms
                .map(Duration::from_millis)
                .unwrap_or(monitor_defaults.read_retry_pause),
            max_consecutive_read_failures: monitor_file
                .max_consecutive_read_failures
                .unwrap_or(monitor_defaults.max_consecutive_read_failures),
            max_frames: monitor_file.max_frames.or(monitor_defaults.max_frames),
        };

        let snapshot_file = file.snapshots.unwrap_or_default();
        let snapshot_defaults = SnapshotSettings::default();
        let snapshots = SnapshotSettings {
            enabled: snapshot_file.enabled.unwrap_or(snapshot_defaults.enabled),
            dir: snapshot_file.dir.unwrap_or(snapshot_defaults.dir),
            interval: snapshot_file.interval.unwrap_or(snapshot_defaults.interval),
        };

        let alert_dir = file
            .alerts
            .and_then(|alerts| alerts.dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ALERT_DIR));

        let control_file = file.control.unwrap_or_default();
        let control_defaults = ControlSettings::default();
        let control = ControlSettings {
            command_file: control_file
                .command_file
                .unwrap_or(control_defaults.command_file),
            stop_file: control_file.stop_file.unwrap_or(control_defaults.stop_file),
            poll_interval: control_file
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(control_defaults.poll_interval),
        };

        Ok(Self {
            camera,
            model,
            policy,
            monitor,
            snapshots,
            alert_dir,
            control,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(camera) = non_empty_env("WEAPON_WATCH_CAMERA") {
            self.camera.selector = camera
                .parse()
                .context("WEAPON_WATCH_CAMERA is not a valid camera")?;
        }
        if let Some(model) = non_empty_env("WEAPON_WATCH_MODEL") {
            self.model.path = model_path(&model);
        }
        if let Some(model) = non_empty_env("WEAPON_WATCH_FALLBACK_MODEL") {
            self.model.fallback_path = model_path(&model);
        }
        if let Some(cooldown) = non_empty_env("WEAPON_WATCH_COOLDOWN_SECS") {
            let seconds: u64 = cooldown.parse().map_err(|_| {
                anyhow!("WEAPON_WATCH_COOLDOWN_SECS must be an integer number of seconds")
            })?;
            self.policy.cooldown = Duration::from_secs(seconds);
        }
        if let Some(skip) = non_empty_env("WEAPON_WATCH_SKIP_FRAMES") {
            self.monitor.skip_frames = skip
                .parse()
                .map_err(|_| anyhow!("WEAPON_WATCH_SKIP_FRAMES must be a positive integer"))?;
        }
        if let Some(keywords) = non_empty_env("WEAPON_WATCH_KEYWORDS") {
            let parsed = split_csv(&keywords);
            if !parsed.is_empty() {
                self.policy.keywords = parsed;
            }
        }
        if let Some(dir) = non_empty_env("WEAPON_WATCH_ALERT_DIR") {
            self.alert_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty_env("WEAPON_WATCH_SNAPSHOT_DIR") {
            self.snapshots.dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        self.policy.keywords = self
            .policy
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        let class_signal = self.policy.match_class_ids && !self.policy.class_ids.is_empty();
        if self.policy.keywords.is_empty() && !class_signal {
            return Err(anyhow!(
                "policy needs at least one keyword or an enabled class id allow-list"
            ));
        }
        for floor in &self.policy.confidence_floors {
            check_unit("policy confidence floor", floor.min_confidence)?;
        }

        let detector = &self.model.detector;
        check_unit("model confidence_threshold", detector.confidence_threshold)?;
        check_unit("model iou_threshold", detector.iou_threshold)?;
        if detector.max_detections == 0 {
            return Err(anyhow!("model max_detections must be greater than zero"));
        }
        if detector.input_size == 0 || detector.input_size % 32 != 0 {
            return Err(anyhow!(
                "model input_size must be a positive multiple of 32, got {}",
                detector.input_size
            ));
        }

        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        if self.monitor.frame_width == 0 || self.monitor.frame_height == 0 {
            return Err(anyhow!("monitor frame size must be non-zero"));
        }
        if self.monitor.skip_frames == 0 {
            return Err(anyhow!("skip_frames must be greater than zero"));
        }
        if self.snapshots.interval == 0 {
            return Err(anyhow!("snapshot interval must be greater than zero"));
        }
        if self.control.poll_interval.is_zero() {
            return Err(anyhow!("control poll interval must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<WatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

/// `""` and `"none"` disable the model.
pub fn model_path(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn check_unit(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(anyhow!("{} must be within 0..=1, got {}", name, value))
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_deployment() {
        let cfg = WatchConfig::default();
        assert_eq!(cfg.camera.selector, CameraSelector::Auto);
        assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
        assert_eq!(cfg.camera.target_fps, 10);
        assert_eq!(cfg.model.path, Some(PathBuf::from("yolov8n.onnx")));
        assert_eq!(cfg.model.detector.confidence_threshold, 0.2);
        assert_eq!(cfg.model.detector.max_detections, 20);
        assert_eq!(cfg.policy.cooldown, Duration::from_secs(60));
        assert_eq!(cfg.monitor.skip_frames, 5);
        assert_eq!(cfg.snapshots.dir, PathBuf::from("output_frames"));
        assert_eq!(cfg.control.stop_file, PathBuf::from("stop_signal.txt"));
    }

    #[test]
    fn model_path_none_disables_model() {
        assert_eq!(model_path("none"), None);
        assert_eq!(model_path("  "), None);
        assert_eq!(model_path("m.onnx"), Some(PathBuf::from("m.onnx")));
        assert_eq!(model_path(""), None);
        assert_eq!(model_path(" NONE "), None);
        assert_eq!(model_path(" m.onnx "), Some(PathBuf::from("m.onnx")));
    }

    #[test]
    fn validation_rejects_empty_policy() {
        let mut cfg = WatchConfig::default();
        cfg.policy.keywords = vec![" ".to_string()];
        cfg.policy.match_class_ids = false;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_rejects_bad_thresholds() {
        let mut cfg = WatchConfig::default();
        cfg.model.detector.confidence_threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = WatchConfig::default();
        cfg.model.detector.input_size = 100;
        assert!(cfg.validate().is_err());

        let mut cfg = WatchConfig::default();
        cfg.monitor.skip_frames = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn misspelled_nested_keys_are_rejected() {
        assert!(toml::from_str::<WatchConfigFile>("cooldown_sec = 5").is_err());
        assert!(toml::from_str::<WatchConfigFile>("[policy]\ncooldown_sec = 5").is_err());
        assert!(toml::from_str::<WatchConfigFile>("[monitor]\nskip_frame = 2").is_err());
        assert!(serde_json::from_str::<WatchConfigFile>(
            r#"{ "policy": { "confidence_floors": [{ "class_id": 0, "min_conf": 0.7 }] } }"#
        )
        .is_err());
    }

    #[test]
    fn toml_file_parses() -> Result<()> {
        let file: WatchConfigFile = toml::from_str(
            r#"
            [camera]
            device = "stub://lab"

            [policy]
            keywords = ["knife"]
            confidence_floors = [{ class_id = 0, min_confidence = 0.7 }]
            "#,
        )?;
        let cfg = WatchConfig::from_file(file)?;
        assert_eq!(
            cfg.camera.selector,
            CameraSelector::Synthetic("lab".to_string())
        );
        assert_eq!(cfg.policy.keywords, vec!["knife"]);
        assert_eq!(cfg.policy.confidence_floors[0].min_confidence, 0.7);
        Ok(())
    }
}
