//! Perception: what a comment's text and attachments look like before it is
//! interpreted.
//!
//! Every stage is fail-soft. A model failure degrades the stage's output and
//! never aborts processing of the comment.

pub mod image;
pub mod text;
pub mod video;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::llm::LanguageModel;
use crate::storage::Comment;

pub use text::{Sentiment, TextAnalysis};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    VideoPreview,
}

/// A description of an attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPerception {
    pub kind: MediaKind,
    pub description: String,
    /// False when the attachment could not be seen.
    pub has_content: bool,
}

impl MediaPerception {
    pub fn described(description: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Image,
            description: description.into(),
            has_content: true,
        }
    }

    pub fn unavailable(kind: MediaKind) -> Self {
        Self {
            kind,
            description: String::new(),
            has_content: false,
        }
    }

    pub fn with_kind(mut self, kind: MediaKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Everything perceived about one comment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerceptionReport {
    pub text: Option<TextAnalysis>,
    pub image: Option<MediaPerception>,
    pub video: Option<MediaPerception>,
}

/// Runs the perception stages for a comment.
pub struct Perceiver {
    llm: Arc<dyn LanguageModel>,
}

impl Perceiver {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    pub async fn perceive(&self, comment: &Comment) -> PerceptionReport {
        let mut report = PerceptionReport::default();

        if let Some(body) = comment.text.as_deref().filter(|t| !t.trim().is_empty()) {
            report.text = Some(text::analyze(self.llm.as_ref(), body).await);
        }

        if let Some(url) = comment.image_url.as_deref().filter(|_| comment.has_image()) {
            report.image = Some(image::analyze(self.llm.as_ref(), url).await);
        }

        if let Some(video_url) = comment.video_url.as_deref().filter(|_| comment.has_video()) {
            // The attached image doubles as the preview frame; do not look twice.
            report.video = Some(match &report.image {
                Some(seen) if seen.has_content => seen.clone().with_kind(MediaKind::VideoPreview),
                _ => video::analyze(self.llm.as_ref(), video_url, None).await,
            });
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::test_support::{raw_comment, ScriptedModel};

    #[tokio::test]
    async fn test_text_only_comment() {
        let llm = Arc::new(ScriptedModel::constant(r#"{"sentiment": "negative", "pressure": 0.6}"#));
        let perceiver = Perceiver::new(llm.clone());
        let comment = Comment::from(raw_comment("1", Some("You are a program")));

        let report = perceiver.perceive(&comment).await;
        let text = report.text.unwrap();
        assert_eq!(text.sentiment, Sentiment::Negative);
        assert_eq!(text.pressure, 0.6);
        assert!(report.image.is_none());
        assert!(report.video.is_none());
        assert_eq!(llm.image_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_video_reuses_preview_description() {
        let llm = Arc::new(ScriptedModel::failing().with_vision("A dim room."));
        let perceiver = Perceiver::new(llm.clone());
        let mut raw = raw_comment("2", None);
        raw.image_url = Some("https://img/preview.jpg".to_string());
        raw.video_url = Some("https://vk.com/video1_2".to_string());
        let comment = Comment::from(raw);

        let report = perceiver.perceive(&comment).await;
        assert!(report.text.is_none());
        assert_eq!(report.image.as_ref().unwrap().description, "A dim room.");
        let video = report.video.unwrap();
        assert_eq!(video.kind, MediaKind::VideoPreview);
        assert_eq!(video.description, "A dim room.");
        assert_eq!(llm.image_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_never_abort() {
        let llm = Arc::new(ScriptedModel::failing());
        let perceiver = Perceiver::new(llm);
        let mut raw = raw_comment("3", Some("hello"));
        raw.image_url = Some("https://img/x.jpg".to_string());
        raw.video_url = Some("https://vk.com/video1_3".to_string());

        let report = perceiver.perceive(&Comment::from(raw)).await;
        assert_eq!(report.text.unwrap().sentiment, Sentiment::Neutral);
        assert!(!report.image.unwrap().has_content);
        assert!(!report.video.unwrap().has_content);
    }
}
