//! Video perception. Only the preview frame is looked at; no frames are
//! extracted from the video itself.

use tracing::warn;

use super::{MediaKind, MediaPerception};
use crate::llm::LanguageModel;

const FRAME_PROMPT: &str = "Describe this video frame briefly (2-3 sentences). \
What is happening in it? What mood does it convey?";

/// Describe a video through its preview image, if one is known.
pub async fn analyze(llm: &dyn LanguageModel, video_url: &str, preview_url: Option<&str>) -> MediaPerception {
    let Some(preview) = preview_url.filter(|u| !u.is_empty()) else {
        return MediaPerception::unavailable(MediaKind::VideoPreview);
    };

    match llm.analyze_image(preview, FRAME_PROMPT).await {
        Ok(description) => MediaPerception::described(description).with_kind(MediaKind::VideoPreview),
        Err(e) => {
            warn!(error = %e, video_url, "Video preview analysis failed");
            MediaPerception::unavailable(MediaKind::VideoPreview)
        }
    }
}
