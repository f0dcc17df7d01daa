//! The psychological state vector and its transitions.
//!
//! [`StateVector`] is an immutable snapshot. Transitions are pure: they take a
//! snapshot and a stimulus and return the next snapshot with the *same*
//! timestamp. Stamping and persistence happen in [`engine::StateEngine`], so the
//! arithmetic here can be tested exhaustively without a clock or a store.

pub mod engine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::StateConfig;
use crate::interpretation::Classification;

pub use engine::StateEngine;

/// Weight of a comment's intrusion score in the accumulated intrusion.
pub const INTRUSION_WEIGHT: f64 = 0.2;

/// Intrusion level above which coherence starts to erode.
pub const EROSION_THRESHOLD: f64 = 0.7;

/// Coherence never erodes below this level.
pub const COHERENCE_FLOOR: f64 = 0.5;

/// Intrusion never decays below this level through publication.
pub const PUBLICATION_INTRUSION_FLOOR: f64 = 0.1;

/// Clamp to `[0, 1]`. NaN collapses to zero.
pub fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// One snapshot of the agent's internal state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateVector {
    /// Belief in the reality of external stimuli.
    pub certainty: f64,
    /// Pressure exerted by external stimuli.
    pub intrusion: f64,
    /// Stability of the internal narrative.
    pub coherence: f64,
    pub timestamp: DateTime<Utc>,
}

impl StateVector {
    /// Build a snapshot, clamping every field.
    pub fn new(certainty: f64, intrusion: f64, coherence: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            certainty: clamp01(certainty),
            intrusion: clamp01(intrusion),
            coherence: clamp01(coherence),
            timestamp,
        }
    }

    /// The first-boot snapshot.
    pub fn initial(config: &StateConfig, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            config.initial_certainty,
            config.initial_intrusion,
            config.initial_coherence,
            timestamp,
        )
    }

    /// Same values, new timestamp.
    pub fn stamped(self, timestamp: DateTime<Utc>) -> Self {
        Self { timestamp, ..self }
    }

    /// Effect of one classified comment.
    ///
    /// `intrusion_score` is not trusted to be in range; the result always is.
    pub fn after_comment(&self, intrusion_score: f64, classification: Classification) -> Self {
        let intrusion = clamp01(self.intrusion + intrusion_score * INTRUSION_WEIGHT);

        let certainty_delta = match classification {
            Classification::Observer => -0.10,
            Classification::Provocation => 0.05,
            Classification::Echo | Classification::Noise => -0.02,
        };
        let certainty = clamp01(self.certainty + certainty_delta);

        let coherence = if intrusion > EROSION_THRESHOLD {
            (self.coherence - 0.10).max(COHERENCE_FLOOR)
        } else {
            (self.coherence + 0.01).min(1.0)
        };

        Self::new(certainty, intrusion, coherence, self.timestamp)
    }

    /// Reflection restores coherence and sheds a little intrusion.
    pub fn after_monologue(&self) -> Self {
        Self::new(
            self.certainty,
            (self.intrusion - 0.05).max(0.0),
            (self.coherence + 0.05).min(1.0),
            self.timestamp,
        )
    }

    /// Publication decays intrusion multiplicatively, never below the floor.
    pub fn after_publication(&self, decay_rate: f64) -> Self {
        let intrusion = (self.intrusion * (1.0 - decay_rate)).max(PUBLICATION_INTRUSION_FLOOR);
        Self::new(self.certainty, intrusion, self.coherence, self.timestamp)
    }

    /// One-line rendering used as prompt context.
    pub fn describe(&self) -> String {
        format!(
            "certainty in reality {:.2}, intrusion {:.2}, self-coherence {:.2}",
            self.certainty, self.intrusion, self.coherence
        )
    }
}
