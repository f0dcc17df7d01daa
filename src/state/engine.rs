//! The single owner of the state history.
//!
//! [`StateEngine`] keeps the current snapshot in memory and appends every new
//! snapshot to the store *before* adopting it. A failed append leaves the
//! in-memory state untouched, so memory and the persisted log never diverge.

use std::sync::Arc;

use tracing::{debug, info};

use super::StateVector;
use crate::config::StateConfig;
use crate::error::StoreError;
use crate::interpretation::Classification;
use crate::storage::Store;
use crate::utilities::now;

/// Applies transitions and appends the resulting snapshots.
///
/// There is exactly one engine per process; it is moved into the agent and
/// never shared, which is what keeps the history totally ordered.
pub struct StateEngine {
    store: Arc<dyn Store>,
    current: StateVector,
    decay_rate: f64,
}

impl std::fmt::Debug for StateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateEngine")
            .field("current", &self.current)
            .field("decay_rate", &self.decay_rate)
            .finish()
    }
}

impl StateEngine {
    /// Resume from the latest persisted snapshot, or persist the configured
    /// initial state on first boot.
    pub fn bootstrap(store: Arc<dyn Store>, config: &StateConfig) -> Result<Self, StoreError> {
        let current = match store.latest_state()? {
            Some(state) => {
                info!(
                    certainty = state.certainty,
                    intrusion = state.intrusion,
                    coherence = state.coherence,
                    "Resumed state from store"
                );
                state
            }
            None => {
                let initial = StateVector::initial(config, now());
                store.append_state(&initial)?;
                info!(
                    certainty = initial.certainty,
                    intrusion = initial.intrusion,
                    coherence = initial.coherence,
                    "Initialized state"
                );
                initial
            }
        };

        Ok(Self {
            store,
            current,
            decay_rate: config.decay_rate,
        })
    }

    /// The most recent snapshot.
    pub fn current(&self) -> StateVector {
        self.current
    }

    pub fn decay_rate(&self) -> f64 {
        self.decay_rate
    }

    /// Apply the effect of one classified comment.
    pub fn apply_comment(
        &mut self,
        intrusion_score: f64,
        classification: Classification,
    ) -> Result<StateVector, StoreError> {
        let next = self.current.after_comment(intrusion_score, classification);
        self.commit(next, "comment")
    }

    /// Apply the recovery that follows a monologue.
    pub fn apply_monologue(&mut self) -> Result<StateVector, StoreError> {
        let next = self.current.after_monologue();
        self.commit(next, "monologue")
    }

    /// Apply the decay that follows a successful publication.
    pub fn apply_publication(&mut self) -> Result<StateVector, StoreError> {
        let next = self.current.after_publication(self.decay_rate);
        self.commit(next, "publication")
    }

    fn commit(&mut self, next: StateVector, cause: &str) -> Result<StateVector, StoreError> {
        // Timestamps must not go backwards even if the wall clock does.
        let timestamp = now().max(self.current.timestamp);
        let next = next.stamped(timestamp);
        self.store.append_state(&next)?;
        self.current = next;
        debug!(
            cause,
            certainty = next.certainty,
            intrusion = next.intrusion,
            coherence = next.coherence,
            "State advanced"
        );
        Ok(next)
    }
}
