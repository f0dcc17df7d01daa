//! Intrusion scoring.
//!
//! A fixed linear model: a base score per classification plus bonuses for
//! attached media, clamped to `[0, 1]`. No model call is involved, so the
//! score is reproducible from the persisted comment alone.

use super::Classification;
use crate::state::clamp01;

/// Base score for a comment whose classification is unknown.
pub const UNKNOWN_BASE: f64 = 0.2;
pub const IMAGE_BONUS: f64 = 0.2;
pub const VIDEO_BONUS: f64 = 0.3;

/// Base score of a classification.
pub fn base_score(classification: Option<Classification>) -> f64 {
    match classification {
        Some(Classification::Observer) => 0.7,
        Some(Classification::Provocation) => 0.6,
        Some(Classification::Echo) => 0.3,
        Some(Classification::Noise) => 0.1,
        None => UNKNOWN_BASE,
    }
}

/// Pressure exerted by a comment, in `[0, 1]`.
pub fn score(classification: Option<Classification>, has_image: bool, has_video: bool) -> f64 {
    let mut total = base_score(classification);
    if has_image {
        total += IMAGE_BONUS;
    }
    if has_video {
        total += VIDEO_BONUS;
    }
    clamp01(total)
}
