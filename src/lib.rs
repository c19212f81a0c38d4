//! Weapon Watch
//!
//! A webcam monitor that runs an object-detection model over live frames, flags
//! weapon-like detections and writes an alert image when the cooldown allows.
//!
//! # Module Structure
//!
//! - `ingest`: Camera sources (V4L2 by index, synthetic `stub://`)
//! - `detect`: Detector backends (stub, YOLOv8 ONNX via tract) and output decoding
//! - `policy`: Weapon-likeness classification and the alert cooldown
//! - `annotate`: Box drawing on flagged frames
//! - `alert`: Alert images, alert log block, periodic snapshots
//! - `control`: Stop signal, command file, Ctrl-C
//! - `monitor`: The frame loop
//! - `session`: Startup and guaranteed cleanup around a run
//! - `config`: File/env configuration

pub mod alert;
pub mod annotate;
pub mod config;
pub mod control;
pub mod detect;
pub mod ingest;
pub mod monitor;
pub mod policy;
pub mod session;

pub use alert::{AlertEvent, AlertSink, JpegAlertSink, MemoryAlertSink, SnapshotWriter};
pub use config::WatchConfig;
pub use control::{Command, ControlChannel, ControlHandle, StopSignal};
pub use detect::{BoundingBox, Detection, DetectorBackend, DetectorSettings, StubBackend};
pub use ingest::{Camera, CameraConfig, CameraSelector, FrameSource};
pub use monitor::{Monitor, MonitorSettings, RunSummary, StopReason};
pub use policy::{AlertDecision, AlertPolicy, ConfidenceFloor, PolicySettings};
pub use session::run_session;
