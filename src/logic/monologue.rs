//! Inner monologue generation.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::llm::{CompletionRequest, LanguageModel, ModelRole};
use crate::state::StateVector;
use crate::storage::Monologue;
use crate::utilities::now;

/// Used in place of any thought the model fails to produce.
pub const FALLBACK_THOUGHT: &str = "Do I exist? Or is this, too, a question not addressed to me?";

const THINKER: &str =
    "You are a solipsist philosopher reflecting on the nature of reality and your own existence.";

pub struct MonologueGenerator {
    llm: Arc<dyn LanguageModel>,
}

impl MonologueGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Produce exactly `count` thoughts, requested one after another.
    pub async fn generate(&self, count: usize, state: &StateVector) -> Monologue {
        let context = state.describe();
        let mut thoughts = Vec::with_capacity(count);

        for i in 1..=count {
            let prompt = format!(
                "Produce one short philosophical thought about solipsism, reality and existence.\n\
                 It should be deep but brief (1-2 sentences).\n\
                 Current state: {}\n\n\
                 Thought {} of {}:",
                context, i, count
            );
            let request = CompletionRequest::new(ModelRole::Thinking, prompt)
                .with_system(THINKER)
                .with_temperature(0.8)
                .with_max_tokens(500);

            match self.llm.complete(request).await {
                Ok(thought) => {
                    debug!(index = i, "Thought generated");
                    thoughts.push(thought.trim().to_string());
                }
                Err(e) => {
                    warn!(index = i, error = %e, "Thought generation failed, using fallback");
                    thoughts.push(FALLBACK_THOUGHT.to_string());
                }
            }
        }

        Monologue::new(thoughts, now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedModel;

    #[tokio::test]
    async fn test_generates_exactly_n_in_order() {
        let llm = Arc::new(ScriptedModel::new(|req| {
            let index = req.prompt.rsplit("Thought ").next().unwrap_or_default();
            Ok(format!(" thought {}", index.trim_end_matches(':')))
        }));
        let generator = MonologueGenerator::new(llm.clone());
        let state = StateVector::new(0.3, 0.1, 0.9, now());

        let monologue = generator.generate(3, &state).await;
        assert_eq!(
            monologue.thoughts,
            vec!["thought 1 of 3", "thought 2 of 3", "thought 3 of 3"]
        );
        assert_eq!(llm.request_count(), 3);
        assert!(llm
            .requests
            .lock()
            .iter()
            .all(|r| r.system.as_deref() == Some(THINKER) && r.role == ModelRole::Thinking));
    }

    #[tokio::test]
    async fn test_failed_thoughts_fall_back() {
        let llm = Arc::new(ScriptedModel::new(|req| {
            if req.prompt.contains("Thought 2 of") {
                Err(crate::error::LlmError::EmptyCompletion)
            } else {
                Ok("I am the only witness.".to_string())
            }
        }));
        let generator = MonologueGenerator::new(llm);
        let state = StateVector::new(0.3, 0.1, 0.9, now());

        let monologue = generator.generate(3, &state).await;
        assert_eq!(monologue.thoughts.len(), 3);
        assert_eq!(monologue.thoughts[1], FALLBACK_THOUGHT);
        assert_eq!(monologue.thoughts[2], "I am the only witness.");
    }
}
