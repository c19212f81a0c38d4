use std::path::Path;

use anyhow::{anyhow, Result};

use crate::config::ModelSettings;
use crate::detect::backend::{DetectorBackend, DetectorSettings};
use crate::detect::backends::StubBackend;

/// Load the configured detector, trying the fallback model once if the primary fails.
///
/// With no model configured the stub backend is used, which never detects anything.
pub fn load_detector(settings: &ModelSettings) -> Result<Box<dyn DetectorBackend>> {
    load_with(settings, open_model)
}

pub(crate) fn load_with<F>(settings: &ModelSettings, mut open: F) -> Result<Box<dyn DetectorBackend>>
where
    F: FnMut(&Path, &DetectorSettings) -> Result<Box<dyn DetectorBackend>>,
{
    let Some(primary) = settings.path.as_deref() else {
        log::warn!("no detection model configured; using stub backend");
        return Ok(Box::new(StubBackend::new()));
    };

    let primary_err = match open(primary, &settings.detector) {
        Ok(backend) => {
            log::info!(
                "detection model {} loaded ({} backend)",
                primary.display(),
                backend.name()
            );
            return Ok(backend);
        }
        Err(e) => e,
    };
    log::error!(
        "failed to load detection model {}: {:#}",
        primary.display(),
        primary_err
    );

    let Some(fallback) = settings.fallback_path.as_deref() else {
        return Err(primary_err.context("no fallback model configured"));
    };
    match open(fallback, &settings.detector) {
        Ok(backend) => {
            log::warn!("fallback model {} loaded", fallback.display());
            Ok(backend)
        }
        Err(e) => Err(anyhow!(
            "failed to load any detection model (primary {}: {:#}; fallback {}: {:#})",
            primary.display(),
            primary_err,
            fallback.display(),
            e
        )),
    }
}

#[cfg(feature = "backend-tract")]
fn open_model(path: &Path, settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    let mut backend = crate::detect::backends::TractBackend::new(path, settings.clone())?;
    backend.warm_up()?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn open_model(path: &Path, _settings: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "model {} requires the backend-tract feature",
        path.display()
    ))
}
