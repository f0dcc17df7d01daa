//! The agent: wires perception, interpretation, state and logic together and
//! exposes the pipeline entry points.
//!
//! Entry points never fail. Every internal error is logged and turned into a
//! neutral result, so a single bad response can not stop the process.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::feed::{poll_once, FeedSource, RawComment};
use crate::interpretation::{self, Classifier};
use crate::llm::LanguageModel;
use crate::logic::{should_respond, ManifestPublisher, MonologueGenerator, PublishOutcome, ResponseGenerator};
use crate::perception::Perceiver;
use crate::state::{StateEngine, StateVector};
use crate::storage::{Comment, Store};

/// Why an inbound comment was not processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    Duplicate,
    SelfAuthored,
}

/// The solipsist agent. Owns the only [`StateEngine`] in the process.
pub struct Solipsist {
    engine: StateEngine,
    store: Arc<dyn Store>,
    feed: Arc<dyn FeedSource>,
    perceiver: Perceiver,
    classifier: Classifier,
    responder: ResponseGenerator,
    monologues: MonologueGenerator,
    manifests: ManifestPublisher,
    own_author_id: Option<i64>,
    creator_id: Option<i64>,
    batch_size: usize,
    thoughts_per_monologue: usize,
    manifest_monologue_count: usize,
    post_replies: bool,
}

impl Solipsist {
    /// Build the agent, resuming state from `store`.
    pub fn new(
        config: &Config,
        llm: Arc<dyn LanguageModel>,
        feed: Arc<dyn FeedSource>,
        store: Arc<dyn Store>,
    ) -> Result<Self, StoreError> {
        let engine = StateEngine::bootstrap(store.clone(), &config.state)?;
        let own_author_id = config.feed.own_author_id();
        if own_author_id.is_none() {
            warn!("Community id is not an integer, own comments can not be recognized");
        }

        Ok(Self {
            engine,
            perceiver: Perceiver::new(llm.clone()),
            classifier: Classifier::new(llm.clone(), store.clone()),
            responder: ResponseGenerator::new(llm.clone(), config.persona.language.clone()),
            monologues: MonologueGenerator::new(llm.clone()),
            manifests: ManifestPublisher::new(
                llm,
                feed.clone(),
                store.clone(),
                config.persona.language.clone(),
                config.feed.max_message_chars,
                Duration::from_millis(config.feed.part_delay_ms),
            ),
            store,
            feed,
            own_author_id,
            creator_id: config.feed.creator_id(),
            batch_size: config.feed.batch_size,
            thoughts_per_monologue: config.schedule.thoughts_per_monologue,
            manifest_monologue_count: config.schedule.manifest_monologue_count,
            post_replies: config.feed.post_replies,
        })
    }

    pub fn state(&self) -> StateVector {
        self.engine.current()
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run one inbound comment through the pipeline.
    ///
    /// Returns the generated response, if any. Known and self-authored
    /// comments are skipped before anything else happens.
    pub async fn process_comment(&mut self, raw: RawComment) -> Option<String> {
        match self.skip_reason(&raw) {
            Ok(Some(Skip::Duplicate)) => {
                debug!(comment_id = %raw.id, "Comment already processed, skipping");
                return None;
            }
            Ok(Some(Skip::SelfAuthored)) => {
                info!(comment_id = %raw.id, author_id = %raw.author_id, "Skipping own comment");
                return None;
            }
            Ok(None) => {}
            Err(e) => {
                error!(comment_id = %raw.id, error = %e, "Could not check comment history");
                return None;
            }
        }

        if self.is_creator(&raw.author_id) {
            info!(comment_id = %raw.id, author_id = %raw.author_id, "Creator comment detected");
        }

        let comment_id = raw.id.clone();
        match self.run_pipeline(raw).await {
            Ok(response) => response,
            Err(e) => {
                error!(comment_id = %comment_id, error = %e, "Error processing comment");
                None
            }
        }
    }

    /// Poll the feed once and process every new item. Returns how many items
    /// were handed to the pipeline.
    ///
    /// Single-task entry point. Under [`crate::runtime::Runtime`] the poller
    /// runs the same [`poll_once`] and queues the items instead.
    pub async fn run_comment_check(&mut self) -> usize {
        let items = poll_once(self.feed.as_ref(), self.batch_size).await;

        let count = items.len();
        for raw in items {
            self.process_comment(raw).await;
        }
        count
    }

    /// Reflect: generate a monologue, keep it, and let it restore coherence.
    pub async fn generate_monologue(&mut self) -> bool {
        info!("Generating monologue");
        let monologue = self
            .monologues
            .generate(self.thoughts_per_monologue, &self.engine.current())
            .await;

        let result = self
            .store
            .append_monologue(&monologue)
            .and_then(|_| self.engine.apply_monologue());
        match result {
            Ok(_) => {
                info!(monologue_id = %monologue.id, thoughts = monologue.thoughts.len(), "Monologue generated");
                true
            }
            Err(e) => {
                error!(error = %e, "Error storing monologue");
                false
            }
        }
    }

    /// Queue a manifest built from recent monologues, then publish the oldest
    /// queued manifest. Earlier failed manifests drain even when no new one is
    /// produced.
    pub async fn publish_manifest(&mut self) -> bool {
        info!("Publishing manifest");
        match self.store.recent_monologues(self.manifest_monologue_count) {
            Ok(monologues) if monologues.is_empty() => {
                warn!("No monologues available for a manifest");
            }
            Ok(monologues) => {
                let state = self.engine.current();
                if let Err(e) = self.manifests.generate_from_monologues(&monologues, &state).await {
                    error!(error = %e, "Could not queue manifest");
                }
            }
            Err(e) => error!(error = %e, "Could not load monologues"),
        }

        match self.manifests.publish_next(&mut self.engine).await {
            Ok(PublishOutcome::Published { .. }) => true,
            Ok(_) => false,
            Err(e) => {
                error!(error = %e, "Error publishing manifest");
                false
            }
        }
    }

    fn skip_reason(&self, raw: &RawComment) -> Result<Option<Skip>, StoreError> {
        if self.store.comment_exists(&raw.id)? {
            return Ok(Some(Skip::Duplicate));
        }
        if self.is_self_authored(&raw.author_id) {
            return Ok(Some(Skip::SelfAuthored));
        }
        Ok(None)
    }

    fn is_self_authored(&self, author_id: &str) -> bool {
        match (self.own_author_id, author_id.trim().parse::<i64>()) {
            (Some(own), Ok(author)) => author == own,
            (_, Err(_)) => {
                debug!(author_id, "Author id is not an integer");
                false
            }
            (None, Ok(_)) => false,
        }
    }

    fn is_creator(&self, author_id: &str) -> bool {
        match (self.creator_id, author_id.trim().parse::<i64>()) {
            (Some(creator), Ok(author)) => author.abs() == creator,
            _ => false,
        }
    }

    async fn run_pipeline(&mut self, raw: RawComment) -> Result<Option<String>> {
        let mut comment = Comment::from(raw);
        info!(comment_id = %comment.id, "Processing comment");

        let perception = self.perceiver.perceive(&comment).await;
        let classification = self
            .classifier
            .classify(comment.text.as_deref().unwrap_or_default(), &perception)
            .await;
        let score = interpretation::score(Some(classification), comment.has_image(), comment.has_video());
        comment.classification = Some(classification);
        comment.intrusion_score = Some(score);

        let state = self.engine.apply_comment(score, classification)?;

        let response = if should_respond(&state, classification) {
            self.responder.generate(&comment, &state).await
        } else {
            None
        };

        match &response {
            Some(text) => {
                comment.responded = true;
                comment.response_text = Some(text.clone());
                info!(comment_id = %comment.id, %classification, "Generated response");
                if self.post_replies {
                    self.deliver_reply(&comment, text).await;
                }
            }
            None => info!(comment_id = %comment.id, %classification, "No response"),
        }

        self.store.upsert_comment(&comment)?;
        Ok(response)
    }

    async fn deliver_reply(&self, comment: &Comment, text: &str) {
        match self.feed.reply(&comment.post_id, &comment.id, text).await {
            Ok(reply_id) => debug!(comment_id = %comment.id, reply_id = %reply_id, "Reply posted"),
            Err(e) => warn!(comment_id = %comment.id, error = %e, "Could not post reply"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpretation::Classification;
    use crate::llm::ModelRole;
    use crate::storage::SqliteStore;
    use crate::test_support::{raw_comment, test_config, RecordingFeed, ScriptedModel};

    struct Harness {
        agent: Solipsist,
        store: Arc<SqliteStore>,
        feed: Arc<RecordingFeed>,
        llm: Arc<ScriptedModel>,
    }

    fn harness_with(config: Config, llm: ScriptedModel, feed: RecordingFeed) -> Harness {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let feed = Arc::new(feed);
        let llm = Arc::new(llm);
        let agent = Solipsist::new(&config, llm.clone(), feed.clone(), store.clone()).unwrap();
        Harness {
            agent,
            store,
            feed,
            llm,
        }
    }

    fn harness(llm: ScriptedModel) -> Harness {
        harness_with(test_config(), llm, RecordingFeed::new())
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn generation_requests(llm: &ScriptedModel) -> usize {
        llm.requests
            .lock()
            .iter()
            .filter(|r| r.role == ModelRole::Generation)
            .count()
    }

    #[tokio::test]
    async fn test_provocation_scenario() {
        let mut h = harness(ScriptedModel::classifying("provocation", "I hear only my own walls."));

        let response = h
            .agent
            .process_comment(raw_comment("c1", Some("You do not exist.")))
            .await;
        assert_eq!(response.as_deref(), Some("I hear only my own walls."));

        let state = h.agent.state();
        assert!(approx(state.intrusion, 0.22));
        assert!(approx(state.certainty, 0.35));
        assert!(approx(state.coherence, 0.91));
        assert_eq!(generation_requests(&h.llm), 1);

        let stored = h.store.get_comment("c1").unwrap().unwrap();
        assert_eq!(stored.classification, Some(Classification::Provocation));
        assert_eq!(stored.intrusion_score, Some(0.6));
        assert!(stored.responded);
        assert_eq!(stored.response_text.as_deref(), Some("I hear only my own walls."));
        assert_eq!(h.store.latest_state().unwrap().unwrap(), state);
        // Replies are off by default.
        assert!(h.feed.replies.lock().is_empty());
    }

    #[tokio::test]
    async fn test_echo_below_coherence_is_persisted_unanswered() {
        let mut config = test_config();
        config.state.initial_coherence = 0.5;
        let mut h = harness_with(config, ScriptedModel::classifying("echo", "unused"), RecordingFeed::new());

        let response = h
            .agent
            .process_comment(raw_comment("c2", Some("the walls speak")))
            .await;
        assert!(response.is_none());
        assert_eq!(generation_requests(&h.llm), 0);

        let stored = h.store.get_comment("c2").unwrap().unwrap();
        assert_eq!(stored.classification, Some(Classification::Echo));
        assert!(!stored.responded);
        assert!(stored.response_text.is_none());
    }

    #[tokio::test]
    async fn test_same_comment_twice_is_processed_once() {
        let mut h = harness(ScriptedModel::classifying("observer", "Someone knocks inside me."));
        let raw = raw_comment("c3", Some("Hello, are you there?"));

        assert!(h.agent.process_comment(raw.clone()).await.is_some());
        let state_after_first = h.agent.state();
        let requests_after_first = h.llm.request_count();

        assert!(h.agent.process_comment(raw).await.is_none());
        assert_eq!(h.agent.state(), state_after_first);
        assert_eq!(h.llm.request_count(), requests_after_first);
        assert_eq!(generation_requests(&h.llm), 1);
        assert_eq!(h.store.state_history(100).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_own_comments_are_skipped() {
        let mut h = harness(ScriptedModel::classifying("observer", "text"));
        let before = h.agent.state();

        let mut own = raw_comment("c4", Some("a reply of mine"));
        own.author_id = "-777".to_string();
        assert!(h.agent.process_comment(own).await.is_none());
        assert!(h.store.get_comment("c4").unwrap().is_none());
        assert_eq!(h.llm.request_count(), 0);
        assert_eq!(h.agent.state(), before);

        // A user whose id happens to equal the group id is not the community.
        let mut user = raw_comment("c5", Some("hi"));
        user.author_id = "777".to_string();
        h.agent.process_comment(user).await;
        assert!(h.store.get_comment("c5").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_model_outage_still_persists_as_noise() {
        let mut h = harness(ScriptedModel::failing());
        let mut raw = raw_comment("c6", Some("???"));
        raw.image_url = Some("https://img/1.jpg".to_string());

        assert!(h.agent.process_comment(raw).await.is_none());
        let stored = h.store.get_comment("c6").unwrap().unwrap();
        assert_eq!(stored.classification, Some(Classification::Noise));
        assert_eq!(stored.intrusion_score, Some(0.1 + 0.2));
        assert!(!stored.responded);
    }

    #[tokio::test]
    async fn test_replies_are_posted_when_enabled() {
        let mut config = test_config();
        config.feed.post_replies = true;
        let mut h = harness_with(config, ScriptedModel::classifying("observer", "A shadow speaks."), RecordingFeed::new());

        h.agent.process_comment(raw_comment("c7", Some("Look at me"))).await;
        let replies = h.feed.replies.lock().clone();
        assert_eq!(
            replies,
            vec![("1".to_string(), "c7".to_string(), "A shadow speaks.".to_string())]
        );
    }

    #[tokio::test]
    async fn test_comment_check_processes_batch() {
        let feed = RecordingFeed::with_items(vec![
            raw_comment("a", Some("one")),
            raw_comment("b", Some("two")),
        ]);
        let mut h = harness_with(test_config(), ScriptedModel::classifying("noise", "x"), feed);

        assert_eq!(h.agent.run_comment_check().await, 2);
        assert!(h.store.comment_exists("a").unwrap());
        assert!(h.store.comment_exists("b").unwrap());

        // Re-delivery of the same items changes nothing.
        let history = h.store.state_history(100).unwrap().len();
        h.agent.run_comment_check().await;
        assert_eq!(h.store.state_history(100).unwrap().len(), history);

        h.feed.fail_listing();
        assert_eq!(h.agent.run_comment_check().await, 0);
    }

    #[tokio::test]
    async fn test_monologue_restores_coherence() {
        let mut h = harness(ScriptedModel::constant("Only the echo is certain."));
        let before = h.agent.state();

        assert!(h.agent.generate_monologue().await);
        let monologues = h.store.recent_monologues(10).unwrap();
        assert_eq!(monologues.len(), 1);
        assert_eq!(monologues[0].thoughts.len(), 3);

        let after = h.agent.state();
        assert!(approx(after.coherence, (before.coherence + 0.05).min(1.0)));
        assert!(approx(after.intrusion, (before.intrusion - 0.05).max(0.0)));
    }

    #[tokio::test]
    async fn test_publish_manifest_flow() {
        let mut h = harness(ScriptedModel::constant("I am the manifest of myself."));

        // Nothing to aggregate and nothing queued.
        assert!(!h.agent.publish_manifest().await);
        assert_eq!(h.feed.publish_calls(), 0);

        h.agent.generate_monologue().await;
        h.feed.fail_publish_at(1);
        assert!(!h.agent.publish_manifest().await);
        assert_eq!(h.store.unpublished_manifests().unwrap().len(), 1);
        let state_after_failure = h.agent.state();

        // A later attempt publishes the queue oldest first, one per call.
        assert!(h.agent.publish_manifest().await);
        assert_eq!(h.feed.published.lock().len(), 1);
        assert_eq!(h.store.unpublished_manifests().unwrap().len(), 1);
        assert!(h.agent.state().timestamp >= state_after_failure.timestamp);
    }

    #[tokio::test]
    async fn test_queued_manifest_drains_without_new_generation() {
        let mut h = harness(ScriptedModel::constant("First manifest."));
        h.agent.generate_monologue().await;
        h.feed.fail_publish_at(1);
        assert!(!h.agent.publish_manifest().await);

        // The model is gone now; the queued manifest still goes out.
        let failing = Arc::new(ScriptedModel::failing());
        let mut h2 = Harness {
            agent: Solipsist::new(&test_config(), failing.clone(), h.feed.clone(), h.store.clone())
                .unwrap(),
            store: h.store.clone(),
            feed: h.feed.clone(),
            llm: failing,
        };
        assert!(h2.agent.publish_manifest().await);
        assert_eq!(*h2.feed.published.lock(), vec!["First manifest.".to_string()]);
        // The stored monologue prompts one failed generation attempt, which
        // queues nothing new.
        assert_eq!(h2.llm.request_count(), 1);
        assert!(h2.store.unpublished_manifests().unwrap().is_empty());
    }
}
