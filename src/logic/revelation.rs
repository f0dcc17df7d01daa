//! Manifests: aggregation of monologues into a public text, and its
//! all-or-nothing publication.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::StoreError;
use crate::feed::FeedSource;
use crate::llm::{CompletionRequest, LanguageModel, ModelRole};
use crate::state::{StateEngine, StateVector};
use crate::storage::{Manifest, Monologue, Store};
use crate::utilities::chunking::plan_parts;
use crate::utilities::now;

const MANIFEST_VOICE: &str = "You are a philosophical agent. Write a manifest: a public statement \
of your solipsist worldview, built from the thoughts you are given.
Interpret their meaning deeply, extract their philosophical core and emotional undertone, \
and keep the detached style.
Style: philosophical, detached, without acknowledging the reality of others, \
like fragments of a consciousness log.";

/// Result of one publication attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// The queue was empty.
    NothingQueued,
    /// Every part went out; the manifest is marked published.
    Published {
        manifest_id: String,
        post_ids: Vec<String>,
    },
    /// A part failed; the manifest stays queued.
    Failed { manifest_id: String },
}

impl PublishOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, PublishOutcome::Published { .. })
    }
}

pub struct ManifestPublisher {
    llm: Arc<dyn LanguageModel>,
    feed: Arc<dyn FeedSource>,
    store: Arc<dyn Store>,
    language: String,
    max_message_chars: usize,
    part_delay: Duration,
}

impl ManifestPublisher {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        feed: Arc<dyn FeedSource>,
        store: Arc<dyn Store>,
        language: impl Into<String>,
        max_message_chars: usize,
        part_delay: Duration,
    ) -> Self {
        Self {
            llm,
            feed,
            store,
            language: language.into(),
            max_message_chars,
            part_delay,
        }
    }

    /// Generate a manifest from `monologues` and queue it.
    ///
    /// Monologues are aggregated oldest first whatever order they arrive in.
    /// Returns `Ok(None)` when there is nothing to aggregate or the model fails.
    pub async fn generate_from_monologues(
        &self,
        monologues: &[Monologue],
        state: &StateVector,
    ) -> Result<Option<Manifest>, StoreError> {
        if monologues.is_empty() {
            warn!("No monologues to build a manifest from");
            return Ok(None);
        }

        let mut ordered: Vec<&Monologue> = monologues.iter().collect();
        ordered.sort_by_key(|m| m.timestamp);
        let thoughts = ordered
            .iter()
            .flat_map(|m| m.thoughts.iter())
            .map(|t| format!("- {}", t))
            .collect::<Vec<_>>()
            .join("\n");

        let request = CompletionRequest::new(
            ModelRole::Generation,
            format!(
                "Write a manifest based on the following thoughts:\n\n{}\n\nState context: {}",
                thoughts,
                state.describe()
            ),
        )
        .with_system(format!("{}\nWrite in {}.", MANIFEST_VOICE, self.language))
        .with_temperature(0.8)
        .with_max_tokens(1000);

        let content = match self.llm.complete(request).await {
            Ok(content) => content,
            Err(e) => {
                error!(error = %e, "Manifest generation failed");
                return Ok(None);
            }
        };

        let manifest = Manifest::new(content, now());
        self.store.append_manifest(&manifest)?;
        info!(manifest_id = %manifest.id, monologues = ordered.len(), "Manifest queued");
        Ok(Some(manifest))
    }

    /// Publish the oldest queued manifest.
    ///
    /// Parts go out in order with a pause between them. The first failed part
    /// aborts the attempt and leaves the manifest queued; only a complete
    /// publication marks it published and decays the state.
    pub async fn publish_next(&self, engine: &mut StateEngine) -> Result<PublishOutcome, StoreError> {
        let Some(manifest) = self.store.unpublished_manifests()?.into_iter().next() else {
            info!("No manifests to publish");
            return Ok(PublishOutcome::NothingQueued);
        };

        let parts = plan_parts(&manifest.content, self.max_message_chars);
        let total = parts.len();
        let mut post_ids = Vec::with_capacity(total);

        for (i, part) in parts.iter().enumerate() {
            if i > 0 && !self.part_delay.is_zero() {
                tokio::time::sleep(self.part_delay).await;
            }
            match self.feed.publish(part).await {
                Ok(post_id) => post_ids.push(post_id),
                Err(e) => {
                    error!(
                        manifest_id = %manifest.id,
                        part = i + 1,
                        total,
                        error = %e,
                        "Publication aborted, manifest stays queued"
                    );
                    return Ok(PublishOutcome::Failed {
                        manifest_id: manifest.id,
                    });
                }
            }
        }

        if self.store.mark_manifest_published(&manifest.id, now())? {
            engine.apply_publication()?;
            info!(manifest_id = %manifest.id, posts = ?post_ids, "Manifest published");
        } else {
            warn!(manifest_id = %manifest.id, "Manifest was already marked published");
        }

        Ok(PublishOutcome::Published {
            manifest_id: manifest.id,
            post_ids,
        })
    }
}
