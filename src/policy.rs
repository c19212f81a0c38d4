//! Alert policy.
//!
//! Decides from one frame's detections whether a security event is raised. A
//! detection is weapon-like when its label contains a configured keyword or its
//! class id is allow-listed, unless a per-class confidence floor rejects it. At most
//! one alert fires per cooldown window; qualifying frames inside the window are
//! dropped, never queued.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::detect::Detection;

pub const DEFAULT_WEAPON_KEYWORDS: [&str; 15] = [
    "knife", "gun", "rifle", "pistol", "weapon", "firearm", "blade", "handgun", "shotgun",
    "revolver", "sword", "dagger", "machete", "scissors", "axe",
];

/// COCO ids: person, knife, bowl, chair, cell phone.
pub const DEFAULT_WEAPON_CLASS_IDS: [u32; 5] = [0, 43, 45, 56, 67];

pub const DEFAULT_COOLDOWN_SECS: u64 = 60;

/// Minimum confidence for a generically risky class to count.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfidenceFloor {
    pub class_id: u32,
    pub min_confidence: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PolicySettings {
    /// Case-insensitive substrings matched against detection labels.
    pub keywords: Vec<String>,
    /// Class ids that count as weapon-like regardless of label.
    pub class_ids: Vec<u32>,
    /// When false the class-id allow-list is ignored and only labels decide.
    pub match_class_ids: bool,
    pub confidence_floors: Vec<ConfidenceFloor>,
    pub cooldown: Duration,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_WEAPON_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            class_ids: DEFAULT_WEAPON_CLASS_IDS.to_vec(),
            match_class_ids: true,
            confidence_floors: vec![
                ConfidenceFloor {
                    class_id: 0,
                    min_confidence: 0.5,
                },
                ConfidenceFloor {
                    class_id: 67,
                    min_confidence: 0.5,
                },
            ],
            cooldown: Duration::from_secs(DEFAULT_COOLDOWN_SECS),
        }
    }
}

/// Outcome of a fired policy evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct AlertDecision {
    pub fired_at: Instant,
    /// Every weapon-like detection of the frame, in detector order.
    pub detections: Vec<Detection>,
}

/// Weapon-likeness classifier plus the process-wide cooldown state.
#[derive(Clone, Debug)]
pub struct AlertPolicy {
    keywords: Vec<String>,
    class_ids: HashSet<u32>,
    match_class_ids: bool,
    confidence_floors: Vec<ConfidenceFloor>,
    cooldown: Duration,
    last_alert: Option<Instant>,
}

impl AlertPolicy {
    pub fn new(settings: &PolicySettings) -> Self {
        Self {
            keywords: settings
                .keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            class_ids: settings.class_ids.iter().copied().collect(),
            match_class_ids: settings.match_class_ids,
            confidence_floors: settings.confidence_floors.clone(),
            cooldown: settings.cooldown,
            last_alert: None,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Instant of the last fired alert, if any.
    pub fn last_alert(&self) -> Option<Instant> {
        self.last_alert
    }

    /// Returns true when the detection counts as weapon-like.
    pub fn classify(&self, detection: &Detection) -> bool {
        let below_floor = self
            .confidence_floors
            .iter()
            .any(|f| f.class_id == detection.class_id && detection.confidence < f.min_confidence);
        if below_floor {
            return false;
        }

        let label = detection.label.to_lowercase();
        let keyword_match = self.keywords.iter().any(|k| label.contains(k.as_str()));
        let class_match = self.match_class_ids && self.class_ids.contains(&detection.class_id);
        keyword_match || class_match
    }

    /// The weapon-like subset of `detections`, in order.
    pub fn weapon_like(&self, detections: &[Detection]) -> Vec<Detection> {
        detections
            .iter()
            .filter(|d| self.classify(d))
            .cloned()
            .collect()
    }

    /// Evaluate one frame. Fires when anything is weapon-like and the cooldown has
    /// elapsed since the last alert, then restarts the cooldown at `now`.
    pub fn evaluate(&mut self, detections: &[Detection], now: Instant) -> Option<AlertDecision> {
        let flagged = self.weapon_like(detections);
        if flagged.is_empty() || !self.cooldown_elapsed(now) {
            return None;
        }
        self.last_alert = Some(now);
        Some(AlertDecision {
            fired_at: now,
            detections: flagged,
        })
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        match self.last_alert {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.cooldown,
        }
    }
}
