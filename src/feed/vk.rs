//! VK wall API client.
//!
//! Comments are collected from the most recent posts on the community wall,
//! newest first, and handed out oldest first past a per-post cursor, so a busy
//! post never hides later comments. Publications go to the same wall. Every
//! request is a form POST to `{base_url}/{method}` bounded by the client
//! timeout, with no retry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{FeedSource, RawComment};
use crate::config::{is_real_secret, FeedConfig};
use crate::error::FeedError;

/// Comments requested per `wall.getComments` call (API maximum).
const COMMENTS_PER_POST: usize = 100;

#[derive(Debug, Deserialize)]
struct Items<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct VkPost {
    id: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VkComment {
    id: i64,
    #[serde(default)]
    from_id: i64,
    #[serde(default)]
    text: String,
    date: Option<i64>,
    #[serde(default)]
    attachments: Vec<VkAttachment>,
}

#[derive(Debug, Deserialize)]
struct VkAttachment {
    #[serde(rename = "type")]
    kind: String,
    photo: Option<VkPhoto>,
    video: Option<VkVideo>,
}

#[derive(Debug, Deserialize)]
struct VkPhoto {
    #[serde(default)]
    sizes: Vec<VkPhotoSize>,
}

#[derive(Debug, Deserialize)]
struct VkPhotoSize {
    url: Option<String>,
    #[serde(default)]
    width: u64,
    #[serde(default)]
    height: u64,
}

#[derive(Debug, Deserialize)]
struct VkVideo {
    owner_id: Option<i64>,
    id: Option<i64>,
    /// Either a list of preview sizes or a single URL, depending on API version.
    image: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PostCreated {
    post_id: i64,
}

#[derive(Debug, Deserialize)]
struct CommentCreated {
    comment_id: i64,
}

impl VkVideo {
    fn preview_url(&self) -> Option<String> {
        match self.image.as_ref()? {
            Value::String(url) => Some(url.clone()),
            Value::Array(sizes) => sizes
                .first()
                .and_then(|s| s.get("url"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
    }

    fn page_url(&self) -> Option<String> {
        match (self.owner_id, self.id) {
            (Some(owner), Some(id)) => Some(format!("https://vk.com/video{}_{}", owner, id)),
            _ => None,
        }
    }
}

/// Convert an API comment into a feed record.
///
/// The largest photo becomes `image_url`; a video contributes its page URL
/// and, when no photo is attached, its preview image.
pub(crate) fn comment_from_item(post_id: i64, item: VkComment) -> RawComment {
    let mut image_url = None;
    let mut preview_url = None;
    let mut video_url = None;

    for attachment in &item.attachments {
        match attachment.kind.as_str() {
            "photo" => {
                let largest = attachment
                    .photo
                    .as_ref()
                    .and_then(|p| p.sizes.iter().max_by_key(|s| s.width * s.height))
                    .and_then(|s| s.url.clone());
                if largest.is_some() {
                    image_url = largest;
                }
            }
            "video" => {
                if let Some(video) = &attachment.video {
                    preview_url = preview_url.or_else(|| video.preview_url());
                    video_url = video_url.or_else(|| video.page_url());
                }
            }
            _ => {}
        }
    }

    let timestamp = item
        .date
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(crate::utilities::now);

    RawComment {
        id: item.id.to_string(),
        post_id: post_id.to_string(),
        author_id: item.from_id.to_string(),
        text: Some(item.text).filter(|t| !t.is_empty()),
        image_url: image_url.or(preview_url),
        video_url,
        timestamp,
    }
}

/// Pick at most `limit` comments not yet handed out, oldest first.
///
/// `cursors` holds, per post, the highest comment id already returned. Only
/// the returned prefix advances a cursor, so whatever exceeds `limit` is
/// picked up by the next call.
pub(crate) fn select_unseen(
    batches: Vec<(i64, Vec<VkComment>)>,
    cursors: &mut HashMap<i64, i64>,
    limit: usize,
) -> Vec<RawComment> {
    let mut unseen: Vec<(i64, VkComment)> = batches
        .into_iter()
        .flat_map(|(post_id, items)| {
            let cursor = cursors.get(&post_id).copied();
            items
                .into_iter()
                .filter(move |item| cursor.map_or(true, |c| item.id > c))
                .map(move |item| (post_id, item))
        })
        .collect();
    unseen.sort_by_key(|(_, item)| item.id);
    unseen.truncate(limit);

    for (post_id, item) in &unseen {
        let cursor = cursors.entry(*post_id).or_insert(item.id);
        *cursor = (*cursor).max(item.id);
    }
    unseen
        .into_iter()
        .map(|(post_id, item)| comment_from_item(post_id, item))
        .collect()
}

/// Client for the VK wall of one community.
#[derive(Debug, Clone)]
pub struct VkClient {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
    api_version: String,
    /// Positive community id.
    group_id: Option<i64>,
    posts_to_scan: usize,
    /// Highest comment id returned so far, per post.
    cursors: Arc<Mutex<HashMap<i64, i64>>>,
}

impl VkClient {
    pub fn new(config: &FeedConfig) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let access_token = config.access_token.clone().filter(|t| is_real_secret(Some(t)));
        if access_token.is_none() {
            warn!("VK access token not configured");
        }
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token,
            api_version: config.api_version.clone(),
            group_id: config.own_author_id().map(i64::abs),
            posts_to_scan: config.posts_to_scan,
            cursors: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn owner_id(&self) -> Result<String, FeedError> {
        self.group_id
            .map(|id| format!("-{}", id))
            .ok_or(FeedError::NotConfigured)
    }

    /// Call an API method and decode its `response` member.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        mut params: Vec<(&str, String)>,
    ) -> Result<T, FeedError> {
        let token = self.access_token.as_ref().ok_or(FeedError::NotConfigured)?;
        params.push(("access_token", token.clone()));
        params.push(("v", self.api_version.clone()));

        let url = format!("{}/{}", self.base_url, method);
        let body: Value = self
            .http
            .post(&url)
            .form(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        decode_envelope(method, body)
    }
}

/// Split a VK reply into its `error` or `response` member.
pub(crate) fn decode_envelope<T: DeserializeOwned>(method: &str, mut body: Value) -> Result<T, FeedError> {
    if let Some(error) = body.get("error") {
        return Err(FeedError::Api {
            code: error.get("error_code").and_then(Value::as_i64).unwrap_or(0),
            message: error
                .get("error_msg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }
    let response = body
        .get_mut("response")
        .map(Value::take)
        .ok_or_else(|| FeedError::Malformed(format!("{}: no response member", method)))?;
    serde_json::from_value(response).map_err(|e| FeedError::Malformed(format!("{}: {}", method, e)))
}

#[async_trait]
impl FeedSource for VkClient {
    async fn list_new_items(&self, limit: usize) -> Result<Vec<RawComment>, FeedError> {
        let owner_id = self.owner_id()?;
        let posts: Items<VkPost> = self
            .call(
                "wall.get",
                vec![
                    ("owner_id", owner_id.clone()),
                    ("count", self.posts_to_scan.to_string()),
                    ("filter", "owner".to_string()),
                ],
            )
            .await?;
        debug!(posts = posts.items.len(), "Scanning wall posts for comments");

        let mut batches = Vec::with_capacity(posts.items.len());
        for post in posts.items {
            let comments: Items<VkComment> = match self
                .call(
                    "wall.getComments",
                    vec![
                        ("owner_id", owner_id.clone()),
                        ("post_id", post.id.to_string()),
                        ("count", COMMENTS_PER_POST.to_string()),
                        ("sort", "desc".to_string()),
                        ("need_likes", "0".to_string()),
                        ("extended", "0".to_string()),
                    ],
                )
                .await
            {
                Ok(comments) => comments,
                Err(e) => {
                    warn!(post_id = post.id, error = %e, "Failed to fetch comments");
                    continue;
                }
            };
            batches.push((post.id, comments.items));
        }

        let collected = select_unseen(batches, &mut self.cursors.lock(), limit);
        info!(comments = collected.len(), "Fetched comments");
        Ok(collected)
    }

    async fn publish(&self, text: &str) -> Result<String, FeedError> {
        let created: PostCreated = self
            .call(
                "wall.post",
                vec![
                    ("owner_id", self.owner_id()?),
                    ("from_group", "1".to_string()),
                    ("message", text.to_string()),
                ],
            )
            .await?;
        Ok(created.post_id.to_string())
    }

    async fn reply(&self, post_id: &str, comment_id: &str, text: &str) -> Result<String, FeedError> {
        let group_id = self.group_id.ok_or(FeedError::NotConfigured)?;
        let created: CommentCreated = self
            .call(
                "wall.createComment",
                vec![
                    ("owner_id", self.owner_id()?),
                    ("post_id", post_id.to_string()),
                    ("reply_to_comment", comment_id.to_string()),
                    ("from_group", group_id.to_string()),
                    ("message", text.to_string()),
                ],
            )
            .await?;
        Ok(created.comment_id.to_string())
    }
}
