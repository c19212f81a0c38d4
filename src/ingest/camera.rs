use anyhow::{anyhow, Result};
use image::RgbImage;

use super::{CameraConfig, CameraSelector, FrameSource};
#[cfg(feature = "ingest-v4l2")]
use super::v4l2::V4l2Camera;

/// Highest device index tried (exclusive) when probing for a camera.
pub const MAX_PROBE_INDEX: u32 = 10;

/// Camera opened by index or synthetic name.
///
/// Uses V4L2 for real devices, with a synthetic generator for `stub://` selectors.
pub struct Camera {
    label: String,
    backend: CameraBackend,
    frames_read: u64,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    Device(V4l2Camera),
    Released,
}

/// Statistics for a camera.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_read: u64,
    pub label: String,
}

impl Camera {
    /// Open the selected camera and verify it delivers a first frame.
    pub fn open(config: &CameraConfig) -> Result<Self> {
        let selector = match &config.selector {
            CameraSelector::Auto => {
                let index = probe_camera(config);
                log::info!("using camera index {}", index);
                CameraSelector::Index(index)
            }
            other => other.clone(),
        };

        let mut camera = Self::open_unchecked(&selector, config)?;
        let frame = camera
            .read()
            .map_err(|e| e.context(format!("camera {} failed its first read", camera.label)))?
            .ok_or_else(|| anyhow!("failed to read a frame from camera {}", camera.label))?;
        log::info!(
            "camera {} started ({}x{})",
            camera.label,
            frame.width(),
            frame.height()
        );
        Ok(camera)
    }

    fn open_unchecked(selector: &CameraSelector, config: &CameraConfig) -> Result<Self> {
        let backend = match selector {
            CameraSelector::Synthetic(name) => {
                log::info!("camera stub://{} connected (synthetic)", name);
                CameraBackend::Synthetic(SyntheticCamera::new(config.width, config.height))
            }
            CameraSelector::Index(index) => open_device(*index, config)?,
            CameraSelector::Auto => return Err(anyhow!("camera selector must be resolved")),
        };
        Ok(Self {
            label: selector.to_string(),
            backend,
            frames_read: 0,
        })
    }

    pub fn stats(&self) -> CameraStats {
        CameraStats {
            frames_read: self.frames_read,
            label: self.label.clone(),
        }
    }
}

impl FrameSource for Camera {
    fn read(&mut self) -> Result<Option<RgbImage>> {
        let frame = match &mut self.backend {
            CameraBackend::Synthetic(source) => Some(source.next_frame()),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.read()?,
            CameraBackend::Released => return Err(anyhow!("camera {} released", self.label)),
        };
        if frame.is_some() {
            self.frames_read += 1;
        }
        Ok(frame)
    }

    fn is_opened(&self) -> bool {
        !matches!(self.backend, CameraBackend::Released)
    }

    fn release(&mut self) {
        if self.is_opened() {
            log::info!("camera {} released", self.label);
        }
        self.backend = CameraBackend::Released;
    }
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(index: u32, config: &CameraConfig) -> Result<CameraBackend> {
    Ok(CameraBackend::Device(V4l2Camera::open(
        index,
        config.width,
        config.height,
        config.target_fps,
    )?))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(index: u32, _config: &CameraConfig) -> Result<CameraBackend> {
    Err(anyhow!(
        "camera index {} requires the ingest-v4l2 feature",
        index
    ))
}

/// Scan device indices and return the first that opens and yields a frame.
///
/// Falls back to index 0 when nothing answers.
pub fn probe_camera(config: &CameraConfig) -> u32 {
    log::info!("probing cameras 0..{}", MAX_PROBE_INDEX);
    for index in 0..MAX_PROBE_INDEX {
        let Ok(mut camera) = Camera::open_unchecked(&CameraSelector::Index(index), config) else {
            continue;
        };
        let answered = matches!(camera.read(), Ok(Some(_)));
        camera.release();
        if answered {
            log::info!("found camera at index {}", index);
            return index;
        }
    }
    log::warn!("no camera answered the probe; defaulting to index 0");
    0
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests and demos
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    width: u32,
    height: u32,
    frame_count: u64,
}

impl SyntheticCamera {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_count: 0,
        }
    }

    /// Diagonal gradient that drifts one step per frame.
    fn next_frame(&mut self) -> RgbImage {
        self.frame_count += 1;
        let shift = self.frame_count;
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let base = (x as u64 + y as u64 + shift) % 256;
            image::Rgb([base as u8, (base / 2) as u8, (255 - base) as u8])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> CameraConfig {
        CameraConfig {
            selector: CameraSelector::Synthetic("test".to_string()),
            width: 64,
            height: 48,
            target_fps: 10,
        }
    }

    #[test]
    fn synthetic_camera_produces_frames() -> Result<()> {
        let mut camera = Camera::open(&stub_config())?;
        let frame = camera.read()?.expect("frame");
        assert_eq!(frame.dimensions(), (64, 48));
        // First frame is consumed by the open check.
        assert_eq!(camera.stats().frames_read, 2);
        assert_eq!(camera.stats().label, "stub://test");
        Ok(())
    }

    #[test]
    fn synthetic_frames_change_over_time() -> Result<()> {
        let mut camera = Camera::open(&stub_config())?;
        let a = camera.read()?.expect("frame");
        let b = camera.read()?.expect("frame");
        assert_ne!(a, b);
        Ok(())
    }

    #[test]
    fn released_camera_refuses_reads() -> Result<()> {
        let mut camera = Camera::open(&stub_config())?;
        assert!(camera.is_opened());
        camera.release();
        assert!(!camera.is_opened());
        assert!(camera.read().is_err());
        Ok(())
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn device_index_requires_feature() {
        let config = CameraConfig {
            selector: CameraSelector::Index(0),
            ..stub_config()
        };
        assert!(Camera::open(&config).is_err());
        assert_eq!(probe_camera(&config), 0);
    }
}
