//! Persisted records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::feed::RawComment;
use crate::interpretation::Classification;

/// An inbound comment and everything the pipeline concluded about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    /// Stable id from the feed; the deduplication key.
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub classification: Option<Classification>,
    pub intrusion_score: Option<f64>,
    pub responded: bool,
    pub response_text: Option<String>,
}

impl Comment {
    pub fn has_image(&self) -> bool {
        self.image_url.as_deref().is_some_and(|u| !u.is_empty())
    }

    pub fn has_video(&self) -> bool {
        self.video_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

impl From<RawComment> for Comment {
    fn from(raw: RawComment) -> Self {
        Self {
            id: raw.id,
            post_id: raw.post_id,
            author_id: raw.author_id,
            text: raw.text.filter(|t| !t.is_empty()),
            image_url: raw.image_url,
            video_url: raw.video_url,
            timestamp: raw.timestamp,
            classification: None,
            intrusion_score: None,
            responded: false,
            response_text: None,
        }
    }
}

/// One batch of generated thoughts. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monologue {
    pub id: String,
    /// In generation order.
    pub thoughts: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Monologue {
    pub fn new(thoughts: Vec<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            thoughts,
            timestamp,
        }
    }
}

/// A publishable aggregation of monologues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub id: String,
    pub content: String,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

impl Manifest {
    /// A new, unpublished manifest.
    pub fn new(content: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content,
            published: false,
            published_at: None,
            timestamp,
        }
    }
}
