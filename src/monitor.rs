//! The frame loop.
//!
//! One thread pulls frames, runs every Nth through the detector and alert policy,
//! annotates what the policy flags, and checks for a stop request each iteration.
//! Inference blocks the loop; stop requests are observed between frames.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::alert::{AlertEvent, AlertSink, SnapshotWriter};
use crate::annotate::annotate;
use crate::control::StopSignal;
use crate::detect::DetectorBackend;
use crate::ingest::FrameSource;
use crate::policy::AlertPolicy;

#[derive(Clone, Debug, PartialEq)]
pub struct MonitorSettings {
    /// Frames are resized to this before processing.
    pub frame_width: u32,
    pub frame_height: u32,
    /// Process one of every `skip_frames` frames.
    pub skip_frames: u64,
    /// Wall-clock period of detector housekeeping.
    pub housekeeping_interval: Duration,
    /// Log FPS every this many frames.
    pub fps_log_every: u64,
    /// Pause after a failed read before retrying.
    pub read_retry_pause: Duration,
    /// Consecutive failed reads tolerated before giving up.
    pub max_consecutive_read_failures: u32,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            frame_width: 320,
            frame_height: 240,
            skip_frames: 5,
            housekeeping_interval: Duration::from_secs(15),
            fps_log_every: 30,
            read_retry_pause: Duration::from_secs(1),
            max_consecutive_read_failures: 30,
            max_frames: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Stop flag raised or stop file present.
    Requested,
    /// `max_frames` reached.
    FrameLimit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub processed: u64,
    pub alerts: u64,
    pub read_failures: u64,
    pub stop_reason: StopReason,
}

/// Session object for one monitoring run. Owns the camera, detector, alert policy
/// (and with it the cooldown state) and sinks.
pub struct Monitor<S, D, A> {
    source: S,
    detector: D,
    policy: AlertPolicy,
    alerts: A,
    snapshots: Option<SnapshotWriter>,
    stop: StopSignal,
    settings: MonitorSettings,
}

impl<S, D, A> Monitor<S, D, A>
where
    S: FrameSource,
    D: DetectorBackend,
    A: AlertSink,
{
    pub fn new(
        source: S,
        detector: D,
        policy: AlertPolicy,
        alerts: A,
        stop: StopSignal,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            source,
            detector,
            policy,
            alerts,
            snapshots: None,
            stop,
            settings,
        }
    }

    pub fn with_snapshots(mut self, writer: SnapshotWriter) -> Self {
        self.snapshots = Some(writer);
        self
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    pub fn alert_sink(&self) -> &A {
        &self.alerts
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Release the capture handle and hand back the detector and sink.
    pub fn into_parts(mut self) -> (S, D, A) {
        self.source.release();
        (self.source, self.detector, self.alerts)
    }

    /// Run until stopped, the frame limit is hit, or reading fails for good.
    pub fn run(&mut self) -> Result<RunSummary> {
        let skip = self.settings.skip_frames.max(1);
        let fps_every = self.settings.fps_log_every.max(1);

        let mut frames = 0u64;
        let mut processed = 0u64;
        let mut alerts = 0u64;
        let mut read_failures = 0u64;
        let mut consecutive_failures = 0u32;
        let mut fps_window = Instant::now();
        let mut last_housekeeping = Instant::now();

        log::info!(
            "monitor started: processing 1 of every {} frames at {}x{}",
            skip,
            self.settings.frame_width,
            self.settings.frame_height
        );

        let stop_reason = loop {
            if self.stop.is_requested() {
                log::info!("stop signal received");
                break StopReason::Requested;
            }
            if self.settings.max_frames.is_some_and(|max| frames >= max) {
                break StopReason::FrameLimit;
            }

            let frame = match self.read_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    read_failures += 1;
                    consecutive_failures += 1;
                    if !self.source.is_opened() {
                        return Err(e.context("camera closed"));
                    }
                    if consecutive_failures > self.settings.max_consecutive_read_failures {
                        return Err(e.context(format!(
                            "giving up after {} consecutive failed reads",
                            consecutive_failures
                        )));
                    }
                    log::warn!("{:#}; retrying", e);
                    std::thread::sleep(self.settings.read_retry_pause);
                    continue;
                }
            };
            consecutive_failures = 0;

            let mut frame = imageops::resize(
                &frame,
                self.settings.frame_width,
                self.settings.frame_height,
                FilterType::Triangle,
            );

            let process_this_frame = frames % skip == 0;
            if process_this_frame {
                processed += 1;
                if self.process_frame(&mut frame)? {
                    alerts += 1;
                }
                if let Some(snapshots) = &self.snapshots {
                    if snapshots.is_due(frames) {
                        if let Err(e) = snapshots.write(&frame, frames) {
                            log::warn!("{:#}", e);
                        }
                    }
                }
            }

            if last_housekeeping.elapsed() >= self.settings.housekeeping_interval {
                self.detector.release_transient();
                last_housekeeping = Instant::now();
                log::debug!("housekeeping done");
            }

            frames += 1;
            if frames % fps_every == 0 {
                let elapsed = fps_window.elapsed().as_secs_f64();
                if elapsed > 0.0 {
                    log::info!("FPS: {:.2}", fps_every as f64 / elapsed);
                }
                fps_window = Instant::now();
            }
        };

        let summary = RunSummary {
            frames,
            processed,
            alerts,
            read_failures,
            stop_reason,
        };
        log::info!(
            "monitor stopped ({:?}): {} frames, {} processed, {} alerts, {} failed reads",
            summary.stop_reason,
            summary.frames,
            summary.processed,
            summary.alerts,
            summary.read_failures
        );
        Ok(summary)
    }

    fn read_frame(&mut self) -> Result<RgbImage> {
        self.source
            .read()
            .context("failed to read frame from camera")?
            .ok_or_else(|| anyhow!("camera returned no frame"))
    }

    /// Detect, classify, annotate and maybe alert. Returns true when an alert fired.
    fn process_frame(&mut self, frame: &mut RgbImage) -> Result<bool> {
        let detections = self.detector.detect(frame).context("detection failed")?;
        for detection in &detections {
            log::info!(
                "detected: {} with confidence {:.2}",
                detection.label,
                detection.confidence
            );
        }

        let weapons = self.policy.weapon_like(&detections);
        if weapons.is_empty() {
            return Ok(false);
        }
        for weapon in &weapons {
            log::warn!(
                "WEAPON DETECTED: {} with confidence {:.2}",
                weapon.label,
                weapon.confidence
            );
        }
        annotate(frame, &weapons);

        let Some(decision) = self.policy.evaluate(&detections, Instant::now()) else {
            return Ok(false);
        };
        let event = AlertEvent {
            timestamp: Local::now(),
            detections: decision.detections,
            frame: frame.clone(),
        };
        if let Err(e) = self.alerts.record(&event) {
            log::error!("failed to record alert: {:#}", e);
        }
        log::warn!("ALARM TRIGGERED: weapon detected!");
        Ok(true)
    }
}
