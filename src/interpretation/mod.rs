//! Interpretation of inbound comments: what kind of stimulus is this, and how
//! much pressure does it exert.

pub mod classifier;
pub mod intrusion;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use classifier::Classifier;
pub use intrusion::score;

/// The fixed label set a comment is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Direct address to the subject.
    Observer,
    /// Repetition or development of previously published thoughts.
    Echo,
    /// Doubt about the subject's reality or existence.
    Provocation,
    /// Incoherent or irrelevant noise.
    Noise,
}

impl Classification {
    pub const ALL: [Classification; 4] = [
        Classification::Observer,
        Classification::Echo,
        Classification::Provocation,
        Classification::Noise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Observer => "observer",
            Self::Echo => "echo",
            Self::Provocation => "provocation",
            Self::Noise => "noise",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "observer" => Ok(Self::Observer),
            "echo" => Ok(Self::Echo),
            "provocation" => Ok(Self::Provocation),
            "noise" => Ok(Self::Noise),
            other => Err(other.to_string()),
        }
    }
}

/// Result of normalizing a raw model answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    Known(Classification),
    /// The answer did not name a label; holds the normalized token (may be empty).
    Unrecognized(String),
}

impl Label {
    /// Collapse to a classification, falling back to [`Classification::Noise`].
    pub fn or_noise(&self) -> Classification {
        match self {
            Label::Known(c) => *c,
            Label::Unrecognized(_) => Classification::Noise,
        }
    }
}
