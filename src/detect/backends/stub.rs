use std::collections::VecDeque;

use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;

/// Stub backend for testing and synthetic runs.
///
/// Returns scripted detection lists in order, one per `detect` call, then empty
/// lists once the script runs out. A repeating script cycles instead.
#[derive(Default)]
pub struct StubBackend {
    script: VecDeque<Vec<Detection>>,
    repeat: bool,
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script: script.into(),
            repeat: false,
            calls: 0,
        }
    }

    /// Cycle through the script forever.
    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }

    /// Number of `detect` calls served.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &RgbImage) -> Result<Vec<Detection>> {
        self.calls += 1;
        let next = self.script.pop_front().unwrap_or_default();
        if self.repeat {
            self.script.push_back(next.clone());
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    fn knife() -> Detection {
        Detection::new(43, "knife", 0.9, BoundingBox::new(1, 1, 4, 4))
    }

    #[test]
    fn stub_backend_replays_script_then_goes_quiet() -> Result<()> {
        let frame = RgbImage::new(8, 8);
        let mut backend = StubBackend::scripted(vec![vec![knife()], vec![]]);

        assert_eq!(backend.detect(&frame)?, vec![knife()]);
        assert!(backend.detect(&frame)?.is_empty());
        assert!(backend.detect(&frame)?.is_empty());
        assert_eq!(backend.calls(), 3);
        Ok(())
    }

    #[test]
    fn repeating_stub_cycles() -> Result<()> {
        let frame = RgbImage::new(8, 8);
        let mut backend = StubBackend::scripted(vec![vec![knife()], vec![]]).repeating();

        assert_eq!(backend.detect(&frame)?.len(), 1);
        assert_eq!(backend.detect(&frame)?.len(), 0);
        assert_eq!(backend.detect(&frame)?.len(), 1);
        Ok(())
    }
}
