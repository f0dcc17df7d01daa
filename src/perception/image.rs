//! Image perception through the vision model.

use tracing::warn;

use super::{MediaKind, MediaPerception};
use crate::llm::LanguageModel;

const IMAGE_PROMPT: &str = "Describe this image briefly (2-3 sentences). \
What does it show? What mood does it convey?";

/// Describe the image at `url`. Never fails: an unreadable image yields an
/// empty perception.
pub async fn analyze(llm: &dyn LanguageModel, url: &str) -> MediaPerception {
    match llm.analyze_image(url, IMAGE_PROMPT).await {
        Ok(description) => MediaPerception::described(description),
        Err(e) => {
            warn!(error = %e, url, "Image analysis failed");
            MediaPerception::unavailable(MediaKind::Image)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::test_support::ScriptedModel;

    #[tokio::test]
    async fn test_analyze_describes_image() {
        let llm = ScriptedModel::failing().with_vision("A hand reaching through glass.");
        let perception = analyze(&llm, "https://img/1.jpg").await;
        assert!(perception.has_content);
        assert_eq!(perception.description, "A hand reaching through glass.");
        assert_eq!(perception.kind, MediaKind::Image);
        assert_eq!(llm.image_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_analyze_failure_is_empty() {
        let perception = analyze(&ScriptedModel::failing(), "https://img/1.jpg").await;
        assert!(!perception.has_content);
    }
}
