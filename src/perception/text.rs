//! Text perception: surface statistics plus a model reading of tone, themes
//! and pressure.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::llm::{CompletionRequest, LanguageModel, ModelRole};
use crate::state::clamp01;
use crate::utilities::text::{clean_text, count_words};

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("static regex"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Negative,
    #[default]
    Neutral,
    Positive,
}

/// What the text of a comment looks like.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextAnalysis {
    /// Whitespace-collapsed text.
    pub content: String,
    pub word_count: usize,
    pub char_count: usize,
    pub sentiment: Sentiment,
    pub themes: Vec<String>,
    /// Aggression or pressure in `[0, 1]`.
    pub pressure: f64,
}

/// The model-derived part of the analysis.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ModelReading {
    pub sentiment: Sentiment,
    pub themes: Vec<String>,
    pub pressure: f64,
}

/// Analyze `text`. Never fails: a model failure leaves neutral defaults.
pub async fn analyze(llm: &dyn LanguageModel, text: &str) -> TextAnalysis {
    let content = clean_text(text);
    if content.is_empty() {
        return TextAnalysis::default();
    }

    let reading = match llm.complete(analysis_request(&content)).await {
        Ok(answer) => parse_reading(&answer).unwrap_or_else(|| {
            warn!(
                response = %answer.chars().take(200).collect::<String>(),
                "Could not read text analysis, using defaults"
            );
            ModelReading::default()
        }),
        Err(e) => {
            warn!(error = %e, "Text analysis failed, using defaults");
            ModelReading::default()
        }
    };

    TextAnalysis {
        word_count: count_words(&content),
        char_count: content.chars().count(),
        content,
        sentiment: reading.sentiment,
        themes: reading.themes,
        pressure: reading.pressure,
    }
}

fn analysis_request(content: &str) -> CompletionRequest {
    let prompt = format!(
        "Analyze the text:\n\
         - emotional tone\n\
         - key themes\n\
         - degree of aggression or pressure\n\
         Answer in JSON.\n\n\
         Text: {}\n\n\
         Return JSON in the form:\n\
         {{\"sentiment\": \"negative\" | \"neutral\" | \"positive\", \"themes\": [\"theme\"], \"pressure\": 0.0-1.0}}",
        content
    );
    CompletionRequest::new(ModelRole::Classification, prompt)
        .with_temperature(0.3)
        .with_max_tokens(300)
}

/// Find a JSON object in a model answer: a fenced block first, otherwise the
/// first balanced `{...}` span.
pub(crate) fn extract_json(text: &str) -> Option<&str> {
    if let Some(caps) = FENCED_JSON.captures(text) {
        return caps.get(1).map(|m| m.as_str().trim());
    }

    let start = text.find('{')?;
    let mut depth = 0usize;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + 1].trim());
                }
            }
            _ => {}
        }
    }
    None
}

/// Validate and normalize the model's JSON reading.
pub(crate) fn parse_reading(answer: &str) -> Option<ModelReading> {
    let value: Value = serde_json::from_str(extract_json(answer)?).ok()?;

    let sentiment = match value.get("sentiment").and_then(Value::as_str) {
        Some("negative") => Sentiment::Negative,
        Some("positive") => Sentiment::Positive,
        _ => Sentiment::Neutral,
    };
    let themes = value
        .get("themes")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let pressure = value
        .get("pressure")
        .and_then(|p| p.as_f64().or_else(|| p.as_str().and_then(|s| s.parse().ok())))
        .map(clamp01)
        .unwrap_or(0.0);

    Some(ModelReading {
        sentiment,
        themes,
        pressure,
    })
}
