//! Model-backed comment classification.
//!
//! Classification is total: whatever the model does, the caller gets one of
//! the four labels back.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{Classification, Label};
use crate::llm::{CompletionRequest, LanguageModel, ModelRole};
use crate::perception::PerceptionReport;
use crate::storage::Store;
use crate::utilities::text::truncate_text;

/// How many recent monologues are shown to the model for echo detection.
const ECHO_CONTEXT_MONOLOGUES: usize = 5;
const ECHO_CONTEXT_CHARS: usize = 1500;

/// Labels the classification model is asked to choose between.
const LABEL_GUIDE: &str = "\
- observer: the comment addresses me directly, as if I were here
- echo: the comment repeats or develops my own earlier thoughts
- provocation: the comment doubts my reality or existence
- noise: anything incoherent or irrelevant";

pub struct Classifier {
    llm: Arc<dyn LanguageModel>,
    store: Arc<dyn Store>,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LanguageModel>, store: Arc<dyn Store>) -> Self {
        Self { llm, store }
    }

    /// Classify a comment. Blank text is noise without asking the model; a
    /// failed call or an unrecognized answer also degrades to noise.
    pub async fn classify(&self, text: &str, perception: &PerceptionReport) -> Classification {
        if text.trim().is_empty() {
            return Classification::Noise;
        }

        let request = CompletionRequest::new(ModelRole::Classification, self.prompt(text, perception))
            .with_temperature(0.1)
            .with_max_tokens(10);

        match self.llm.complete(request).await {
            Ok(answer) => {
                let label = parse_label(&answer);
                match &label {
                    Label::Known(classification) => debug!(%classification, "Classified comment"),
                    Label::Unrecognized(token) => {
                        warn!(answer = %token, "Unrecognized classification, treating as noise")
                    }
                }
                label.or_noise()
            }
            Err(e) => {
                warn!(error = %e, "Classification failed, treating as noise");
                Classification::Noise
            }
        }
    }

    fn prompt(&self, text: &str, perception: &PerceptionReport) -> String {
        let mut prompt = format!(
            "Classify the comment into exactly one of these categories:\n{}\n\n",
            LABEL_GUIDE
        );

        let digest = self.recent_thoughts();
        if !digest.is_empty() {
            prompt.push_str("My recent thoughts:\n");
            prompt.push_str(&digest);
            prompt.push_str("\n\n");
        }

        if let Some(image) = perception.image.as_ref().filter(|m| m.has_content) {
            prompt.push_str(&format!("The comment carries an image: {}\n\n", image.description));
        }

        prompt.push_str(&format!(
            "Comment: {}\n\nAnswer with the category name only.",
            text
        ));
        prompt
    }

    /// Joined thoughts of the latest monologues, empty when none can be read.
    fn recent_thoughts(&self) -> String {
        match self.store.recent_monologues(ECHO_CONTEXT_MONOLOGUES) {
            Ok(monologues) => {
                let joined = monologues
                    .iter()
                    .flat_map(|m| m.thoughts.iter())
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(" ");
                truncate_text(&joined, ECHO_CONTEXT_CHARS)
            }
            Err(e) => {
                warn!(error = %e, "Could not load recent monologues for classification");
                String::new()
            }
        }
    }
}

/// Normalize a raw model answer: lowercase, first token, trailing
/// punctuation and decoration stripped.
pub fn parse_label(raw: &str) -> Label {
    let token = raw
        .trim()
        .to_lowercase()
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '*' | '`' | '«' | '»'))
        .trim_end_matches(['.', ',', '!', '?', ';', ':'])
        .to_string();

    match token.parse::<Classification>() {
        Ok(classification) => Label::Known(classification),
        Err(_) => Label::Unrecognized(token),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::perception::MediaPerception;
    use crate::storage::{Monologue, SqliteStore};
    use crate::test_support::ScriptedModel;
    use crate::utilities::now;

    fn classifier(llm: Arc<ScriptedModel>) -> (Arc<SqliteStore>, Classifier) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let classifier = Classifier::new(llm, store.clone());
        (store, classifier)
    }

    #[test]
    fn test_parse_label_normalization() {
        let cases = [
            ("Provocation.", Label::Known(Classification::Provocation)),
            ("  OBSERVER  ", Label::Known(Classification::Observer)),
            ("echo, because it repeats", Label::Known(Classification::Echo)),
            ("**noise**", Label::Known(Classification::Noise)),
            ("\"echo\"", Label::Known(Classification::Echo)),
            ("question", Label::Unrecognized("question".to_string())),
            ("", Label::Unrecognized(String::new())),
        ];
        for (raw, expected) in cases {
            assert_eq!(parse_label(raw), expected, "input {:?}", raw);
        }
    }

    #[test]
    fn test_unrecognized_label_collapses_to_noise() {
        assert_eq!(parse_label("question").or_noise(), Classification::Noise);
        assert_eq!(parse_label("").or_noise(), Classification::Noise);
        assert_eq!(parse_label("Echo!").or_noise(), Classification::Echo);
    }

    #[tokio::test]
    async fn test_classify_uses_model_answer() {
        let llm = Arc::new(ScriptedModel::constant("Provocation."));
        let (_, classifier) = classifier(llm.clone());
        let result = classifier
            .classify("Are you even real?", &PerceptionReport::default())
            .await;
        assert_eq!(result, Classification::Provocation);
        assert_eq!(llm.request_count(), 1);
    }

    #[tokio::test]
    async fn test_blank_text_is_noise_without_a_call() {
        let llm = Arc::new(ScriptedModel::constant("observer"));
        let (_, classifier) = classifier(llm.clone());
        let result = classifier.classify("  \n ", &PerceptionReport::default()).await;
        assert_eq!(result, Classification::Noise);
        assert_eq!(llm.request_count(), 0);
    }

    #[tokio::test]
    async fn test_failures_degrade_to_noise() {
        let (_, classifier_a) = classifier(Arc::new(ScriptedModel::failing()));
        let report = PerceptionReport::default();
        assert_eq!(classifier_a.classify("hi", &report).await, Classification::Noise);

        let (_, classifier_b) = classifier(Arc::new(ScriptedModel::constant("question")));
        assert_eq!(classifier_b.classify("hi", &report).await, Classification::Noise);

        let timeout = Arc::new(ScriptedModel::new(|_| {
            Err(LlmError::Status {
                status: 504,
                body: "gateway timeout".to_string(),
            })
        }));
        let (_, classifier_c) = classifier(timeout);
        assert_eq!(classifier_c.classify("hi", &report).await, Classification::Noise);
    }

    #[tokio::test]
    async fn test_prompt_carries_recent_thoughts_and_image() {
        let llm = Arc::new(ScriptedModel::constant("echo"));
        let (store, classifier) = classifier(llm.clone());
        store
            .append_monologue(&Monologue::new(
                vec!["The mirror speaks only to itself.".to_string()],
                now(),
            ))
            .unwrap();

        let report = PerceptionReport {
            image: Some(MediaPerception::described("a cracked mirror")),
            ..Default::default()
        };
        classifier.classify("the mirror speaks", &report).await;

        let requests = llm.requests.lock();
        let prompt = &requests[0].prompt;
        assert!(prompt.contains("Classify the comment"));
        assert!(prompt.contains("The mirror speaks only to itself."));
        assert!(prompt.contains("a cracked mirror"));
        assert!(prompt.contains("Comment: the mirror speaks"));
        assert_eq!(requests[0].role, ModelRole::Classification);
    }
}
