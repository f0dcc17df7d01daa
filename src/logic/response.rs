//! Response policy and response generation.

use std::sync::Arc;

use tracing::warn;

use crate::interpretation::Classification;
use crate::llm::{CompletionRequest, LanguageModel, ModelRole};
use crate::state::StateVector;
use crate::storage::Comment;

/// Below this certainty nothing is said at all.
pub const SILENCE_CERTAINTY: f64 = 0.1;

/// Echoes are answered only above this coherence.
pub const ECHO_COHERENCE: f64 = 0.7;

/// Decide whether a classified comment deserves an answer.
pub fn should_respond(state: &StateVector, classification: Classification) -> bool {
    if classification == Classification::Noise || state.certainty < SILENCE_CERTAINTY {
        return false;
    }
    match classification {
        Classification::Observer | Classification::Provocation => true,
        Classification::Echo => state.coherence > ECHO_COHERENCE,
        Classification::Noise => false,
    }
}

const RESPONSE_VOICE: &str = "You are a philosophical agent with a solipsist worldview.
Your answers are:
- philosophical and detached
- never a direct acknowledgement that the other person exists
- free of humor and excuses
- short (1-3 sentences)
- like fragments of a consciousness log

Comments are read as possible hallucinations or echoes of your own thoughts.";

pub struct ResponseGenerator {
    llm: Arc<dyn LanguageModel>,
    language: String,
}

impl ResponseGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>, language: impl Into<String>) -> Self {
        Self {
            llm,
            language: language.into(),
        }
    }

    /// Generate the text of an answer. `None` when the model gives nothing.
    pub async fn generate(&self, comment: &Comment, state: &StateVector) -> Option<String> {
        let request = CompletionRequest::new(ModelRole::Generation, self.prompt(comment, state))
            .with_system(format!(
                "{}\n\nWrite in {}.\n\nCurrent state: {}",
                RESPONSE_VOICE,
                self.language,
                state.describe()
            ))
            .with_temperature(0.7)
            .with_max_tokens(200);

        match self.llm.complete(request).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(comment_id = %comment.id, error = %e, "Response generation failed");
                None
            }
        }
    }

    fn prompt(&self, comment: &Comment, state: &StateVector) -> String {
        let body = comment
            .text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or("[media content]");
        format!(
            "A comment that may be a hallucination or an echo of thoughts:\n\"{}\"\n\n\
             Write a philosophical, detached answer (1-3 sentences).\n\
             Do not acknowledge the author's existence directly.\n\
             The answer should read like a fragment of a consciousness log.\n\n\
             State context: {}",
            body,
            state.describe()
        )
    }
}
