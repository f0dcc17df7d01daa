//! Test doubles for the external collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{FeedError, LlmError};
use crate::feed::{FeedSource, RawComment};
use crate::llm::{CompletionRequest, LanguageModel};
use crate::utilities::now;

type Responder = Box<dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync>;

/// A language model answering from a closure and recording every request.
pub struct ScriptedModel {
    responder: Responder,
    vision: Option<String>,
    pub requests: Mutex<Vec<CompletionRequest>>,
    pub image_calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            vision: None,
            requests: Mutex::new(Vec::new()),
            image_calls: AtomicUsize::new(0),
        }
    }

    /// Always answer `text`.
    pub fn constant(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Every call fails.
    pub fn failing() -> Self {
        Self::new(|_| Err(LlmError::EmptyCompletion))
    }

    /// Classification prompts get `label`, everything else gets `other`.
    pub fn classifying(label: &str, other: &str) -> Self {
        let label = label.to_string();
        let other = other.to_string();
        Self::new(move |req| {
            if req.prompt.contains("Classify the comment") {
                Ok(label.clone())
            } else {
                Ok(other.clone())
            }
        })
    }

    pub fn with_vision(mut self, description: &str) -> Self {
        self.vision = Some(description.to_string());
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Requests whose prompt contains `needle`.
    pub fn count_matching(&self, needle: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.prompt.contains(needle))
            .count()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let answer = (self.responder)(&request);
        self.requests.lock().push(request);
        answer
    }

    async fn analyze_image(&self, _url: &str, _prompt: &str) -> Result<String, LlmError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        self.vision.clone().ok_or(LlmError::EmptyCompletion)
    }
}

/// A feed serving fixed comments and recording what gets published.
#[derive(Default)]
pub struct RecordingFeed {
    pub items: Mutex<Vec<RawComment>>,
    pub published: Mutex<Vec<String>>,
    pub replies: Mutex<Vec<(String, String, String)>>,
    publish_calls: AtomicUsize,
    /// 1-based publish call that fails, if any.
    fail_publish_at: Mutex<Option<usize>>,
    fail_listing: Mutex<bool>,
}

impl RecordingFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<RawComment>) -> Self {
        let feed = Self::default();
        *feed.items.lock() = items;
        feed
    }

    /// Make the `n`th publish call (1-based, counted from now on) fail.
    pub fn fail_publish_at(&self, n: usize) {
        let done = self.publish_calls.load(Ordering::SeqCst);
        *self.fail_publish_at.lock() = Some(done + n);
    }

    pub fn heal(&self) {
        *self.fail_publish_at.lock() = None;
        *self.fail_listing.lock() = false;
    }

    pub fn fail_listing(&self) {
        *self.fail_listing.lock() = true;
    }

    pub fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for RecordingFeed {
    async fn list_new_items(&self, limit: usize) -> Result<Vec<RawComment>, FeedError> {
        if *self.fail_listing.lock() {
            return Err(FeedError::Malformed("listing disabled".to_string()));
        }
        Ok(self.items.lock().iter().take(limit).cloned().collect())
    }

    async fn publish(&self, text: &str) -> Result<String, FeedError> {
        let call = self.publish_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.fail_publish_at.lock() == Some(call) {
            return Err(FeedError::Api {
                code: 10,
                message: "Internal server error".to_string(),
            });
        }
        let mut published = self.published.lock();
        published.push(text.to_string());
        Ok(format!("post-{}", published.len()))
    }

    async fn reply(&self, post_id: &str, comment_id: &str, text: &str) -> Result<String, FeedError> {
        let mut replies = self.replies.lock();
        replies.push((post_id.to_string(), comment_id.to_string(), text.to_string()));
        Ok(format!("reply-{}", replies.len()))
    }
}

/// A comment from an ordinary user.
pub fn raw_comment(id: &str, text: Option<&str>) -> RawComment {
    RawComment {
        id: id.to_string(),
        post_id: "1".to_string(),
        author_id: "1001".to_string(),
        text: text.map(str::to_string),
        image_url: None,
        video_url: None,
        timestamp: now(),
    }
}

/// A valid configuration for a community with id 777 and no pacing delay.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.llm.api_key = Some("sk-test".to_string());
    config.feed.access_token = Some("vk-test".to_string());
    config.feed.group_id = Some("777".to_string());
    config.feed.part_delay_ms = 0;
    config
}
