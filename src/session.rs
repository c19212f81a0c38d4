//! Startup and shutdown around one monitor run.
//!
//! Startup order: clear the stop file, prepare output directories, load the model
//! (one fallback attempt), open the camera, start the control thread. Whatever way
//! the run ends, the capture handle is released, the model dropped, the control
//! thread joined and the stop file removed.

use anyhow::Result;

use crate::alert::{JpegAlertSink, SnapshotWriter};
use crate::config::WatchConfig;
use crate::control::{ControlChannel, StopSignal};
use crate::detect::load_detector;
use crate::ingest::Camera;
use crate::monitor::{Monitor, RunSummary};
use crate::policy::AlertPolicy;

pub fn run_session(cfg: &WatchConfig, stop: &StopSignal) -> Result<RunSummary> {
    let _stop_guard = stop.guard()?;

    let alerts = JpegAlertSink::new(&cfg.alert_dir)?;
    let snapshots = if cfg.snapshots.enabled {
        Some(SnapshotWriter::new(&cfg.snapshots.dir, cfg.snapshots.interval)?)
    } else {
        None
    };

    let detector = load_detector(&cfg.model)?;
    let camera = Camera::open(&cfg.camera)?;
    let control = ControlChannel::new(
        &cfg.control.command_file,
        cfg.control.poll_interval,
        stop.clone(),
    )
    .spawn()?;

    let mut monitor = Monitor::new(
        camera,
        detector,
        AlertPolicy::new(&cfg.policy),
        alerts,
        stop.clone(),
        cfg.monitor.clone(),
    );
    if let Some(writer) = snapshots {
        monitor = monitor.with_snapshots(writer);
    }

    log::info!("security system started");
    let result = monitor.run();
    if let Err(e) = &result {
        log::error!("error in main loop: {:#}", e);
    }

    let (camera, detector, _alerts) = monitor.into_parts();
    log::info!(
        "released camera {} after {} frames",
        camera.stats().label,
        camera.stats().frames_read
    );
    drop(detector);
    control.shutdown();
    log::info!("system stopped and resources released");
    result
}
