//! Alert and snapshot persistence.
//!
//! An `AlertEvent` is written once (JPEG + log lines) and then discarded; no
//! history is retained. Snapshots are plain periodic JPEGs of processed frames.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use image::{ImageFormat, RgbImage};

use crate::detect::Detection;

const BANNER: &str = "==================================================";

/// A fired alert: when, what, and the annotated frame.
#[derive(Clone, Debug)]
pub struct AlertEvent {
    pub timestamp: DateTime<Local>,
    pub detections: Vec<Detection>,
    pub frame: RgbImage,
}

/// Destination for fired alerts.
pub trait AlertSink {
    /// Persist one alert. Returns where it was stored, if anywhere.
    fn record(&mut self, event: &AlertEvent) -> Result<Option<PathBuf>>;
}

impl<A: AlertSink + ?Sized> AlertSink for Box<A> {
    fn record(&mut self, event: &AlertEvent) -> Result<Option<PathBuf>> {
        (**self).record(event)
    }
}

/// Writes `alert_<YYYYmmdd-HHMMSS>.jpg` into a directory and logs an alert block.
pub struct JpegAlertSink {
    dir: PathBuf,
}

impl JpegAlertSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create alert directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn alert_path(&self, timestamp: &DateTime<Local>) -> PathBuf {
        let stem = format!("alert_{}", timestamp.format("%Y%m%d-%H%M%S"));
        let mut path = self.dir.join(format!("{}.jpg", stem));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{}_{}.jpg", stem, n));
            n += 1;
        }
        path
    }
}

impl AlertSink for JpegAlertSink {
    fn record(&mut self, event: &AlertEvent) -> Result<Option<PathBuf>> {
        let path = self.alert_path(&event.timestamp);
        event
            .frame
            .save_with_format(&path, ImageFormat::Jpeg)
            .with_context(|| format!("write alert image {}", path.display()))?;
        log_alert(event, Some(&path));
        Ok(Some(path))
    }
}

/// Keeps alerts in memory. Used by tests and dry runs.
#[derive(Default)]
pub struct MemoryAlertSink {
    events: Vec<AlertEvent>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[AlertEvent] {
        &self.events
    }
}

impl AlertSink for MemoryAlertSink {
    fn record(&mut self, event: &AlertEvent) -> Result<Option<PathBuf>> {
        log_alert(event, None);
        self.events.push(event.clone());
        Ok(None)
    }
}

fn log_alert(event: &AlertEvent, path: Option<&Path>) {
    log::warn!("{}", BANNER);
    log::warn!(
        "SECURITY ALERT! {}",
        event.timestamp.format("%Y-%m-%d %H:%M:%S")
    );
    log::warn!("{}", BANNER);
    log::warn!("weapons detected:");
    for detection in &event.detections {
        log::warn!(
            "- {} (confidence: {:.2})",
            detection.label,
            detection.confidence
        );
    }
    if let Some(path) = path {
        log::warn!("alert image saved as: {}", path.display());
    }
    log::warn!("{}", BANNER);
}

/// Writes `frame_<unix secs>_<counter>.jpg` snapshots into a directory.
pub struct SnapshotWriter {
    dir: PathBuf,
    interval: u64,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>, interval: u64) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create snapshot directory {}", dir.display()))?;
        Ok(Self {
            dir,
            interval: interval.max(1),
        })
    }

    /// Whether the frame with this counter is due for a snapshot.
    pub fn is_due(&self, frame_count: u64) -> bool {
        frame_count % self.interval == 0
    }

    pub fn write(&self, frame: &RgbImage, frame_count: u64) -> Result<PathBuf> {
        let path = self.dir.join(format!(
            "frame_{}_{}.jpg",
            Local::now().timestamp(),
            frame_count
        ));
        frame
            .save_with_format(&path, ImageFormat::Jpeg)
            .with_context(|| format!("write snapshot {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use chrono::TimeZone;

    fn event() -> AlertEvent {
        AlertEvent {
            timestamp: Local
                .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
                .single()
                .expect("unambiguous local time"),
            detections: vec![Detection::new(
                43,
                "knife",
                0.87,
                BoundingBox::new(1, 1, 5, 5),
            )],
            frame: RgbImage::new(32, 24),
        }
    }

    #[test]
    fn jpeg_sink_writes_timestamped_image() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut sink = JpegAlertSink::new(dir.path())?;

        let path = sink.record(&event())?.expect("path");
        assert_eq!(path, dir.path().join("alert_20240309-140507.jpg"));
        let written = image::open(&path)?;
        assert_eq!((written.width(), written.height()), (32, 24));
        Ok(())
    }

    #[test]
    fn jpeg_sink_never_overwrites() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut sink = JpegAlertSink::new(dir.path())?;

        let first = sink.record(&event())?.expect("path");
        let second = sink.record(&event())?.expect("path");
        assert_ne!(first, second);
        assert_eq!(second, dir.path().join("alert_20240309-140507_1.jpg"));
        Ok(())
    }

    #[test]
    fn memory_sink_keeps_events() -> Result<()> {
        let mut sink = MemoryAlertSink::new();
        assert_eq!(sink.record(&event())?, None);
        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.events()[0].detections[0].label, "knife");
        Ok(())
    }

    #[test]
    fn snapshot_writer_names_by_counter() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let writer = SnapshotWriter::new(dir.path().join("frames"), 5)?;
        assert!(writer.is_due(0));
        assert!(!writer.is_due(3));
        assert!(writer.is_due(10));

        let path = writer.write(&RgbImage::new(8, 8), 10)?;
        assert!(path.exists());
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        assert!(name.starts_with("frame_"));
        assert!(name.ends_with("_10.jpg"));
        Ok(())
    }
}
