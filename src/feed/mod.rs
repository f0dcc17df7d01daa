//! Social-platform feed: where comments come from and where manifests go.

pub mod vk;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::FeedError;

pub use vk::VkClient;

/// A comment as delivered by the feed, before any processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawComment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// The social platform, seen from the agent.
///
/// Every call is bounded by the implementation's own timeout and reports
/// failure as an error; callers decide the fallback.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Up to `limit` comments not returned by an earlier call, oldest first.
    /// Already processed ids may reappear; the caller skips them.
    async fn list_new_items(&self, limit: usize) -> Result<Vec<RawComment>, FeedError>;

    /// Publish a post on the agent's own wall. Returns the new post id.
    async fn publish(&self, text: &str) -> Result<String, FeedError>;

    /// Reply under a comment. Returns the new comment id.
    async fn reply(&self, post_id: &str, comment_id: &str, text: &str) -> Result<String, FeedError>;
}

/// One poll of `feed`. A failed listing is logged and yields nothing.
pub async fn poll_once(feed: &dyn FeedSource, limit: usize) -> Vec<RawComment> {
    match feed.list_new_items(limit).await {
        Ok(items) => {
            debug!(count = items.len(), "Polled feed");
            items
        }
        Err(e) => {
            error!(error = %e, "Comment check failed");
            Vec::new()
        }
    }
}
