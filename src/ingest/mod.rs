//! Frame ingestion sources.
//!
//! This module provides the camera the monitor loop reads from:
//! - USB/V4L2 devices opened by numeric index (feature: ingest-v4l2)
//! - Synthetic `stub://` source (testing, demos)
//!
//! All sources hand out RGB frames through `FrameSource`. A read that yields no
//! frame is a transient hiccup; the monitor loop decides when hiccups become fatal.

mod camera;
#[cfg_attr(not(feature = "ingest-v4l2"), allow(dead_code))]
mod normalize;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use image::RgbImage;

pub use camera::{probe_camera, Camera, CameraStats, MAX_PROBE_INDEX};

/// A source of successive video frames.
pub trait FrameSource {
    /// Read the next frame. `Ok(None)` means no frame was available this time.
    fn read(&mut self) -> Result<Option<RgbImage>>;

    /// False once the underlying device is gone or released.
    fn is_opened(&self) -> bool;

    /// Release the capture handle. Further reads fail.
    fn release(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read(&mut self) -> Result<Option<RgbImage>> {
        (**self).read()
    }

    fn is_opened(&self) -> bool {
        (**self).is_opened()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Which camera to open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CameraSelector {
    /// Probe indices and use the first camera that yields a frame.
    Auto,
    /// Numeric device index (`/dev/videoN`).
    Index(u32),
    /// Synthetic source, `stub://<name>`.
    Synthetic(String),
}

impl FromStr for CameraSelector {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        if let Some(name) = value.strip_prefix("stub://") {
            return Ok(Self::Synthetic(name.to_string()));
        }
        value
            .parse::<u32>()
            .map(Self::Index)
            .map_err(|_| anyhow!("camera must be 'auto', a device index or stub://<name>, got '{}'", value))
    }
}

impl fmt::Display for CameraSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Index(index) => write!(f, "{}", index),
            Self::Synthetic(name) => write!(f, "stub://{}", name),
        }
    }
}

/// Configuration for opening a camera.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraConfig {
    pub selector: CameraSelector,
    /// Requested capture width.
    pub width: u32,
    /// Requested capture height.
    pub height: u32,
    /// Requested frame rate.
    pub target_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            selector: CameraSelector::Auto,
            width: 640,
            height: 480,
            target_fps: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_parses_all_forms() -> Result<()> {
        assert_eq!("auto".parse::<CameraSelector>()?, CameraSelector::Auto);
        assert_eq!("AUTO".parse::<CameraSelector>()?, CameraSelector::Auto);
        assert_eq!(" 2 ".parse::<CameraSelector>()?, CameraSelector::Index(2));
        assert_eq!(
            "stub://front".parse::<CameraSelector>()?,
            CameraSelector::Synthetic("front".to_string())
        );
        assert!("/dev/video0".parse::<CameraSelector>().is_err());
        Ok(())
    }

    #[test]
    fn selector_display_round_trips() -> Result<()> {
        for raw in ["auto", "3", "stub://lab"] {
            assert_eq!(raw.parse::<CameraSelector>()?.to_string(), raw);
        }
        Ok(())
    }
}
