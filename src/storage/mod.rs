//! Durable storage for state history and pipeline records.
//!
//! The [`Store`] trait is the contract the pipelines rely on; [`SqliteStore`]
//! is the production backend. The store never mutates records on its own:
//! it writes what it is given and reads back what was written.

pub mod models;
pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::state::StateVector;

pub use models::{Comment, Manifest, Monologue};
pub use sqlite::SqliteStore;

/// Persistence contract for every record type.
///
/// Implementations must be crash-safe per call: a record is either fully
/// written or not at all.
pub trait Store: Send + Sync {
    /// Append a state snapshot to the history.
    fn append_state(&self, state: &StateVector) -> Result<(), StoreError>;

    /// The most recent snapshot, if any exists.
    fn latest_state(&self) -> Result<Option<StateVector>, StoreError>;

    /// Up to `limit` snapshots, newest first.
    fn state_history(&self, limit: usize) -> Result<Vec<StateVector>, StoreError>;

    /// Insert or replace a comment by id.
    fn upsert_comment(&self, comment: &Comment) -> Result<(), StoreError>;

    fn get_comment(&self, id: &str) -> Result<Option<Comment>, StoreError>;

    /// Whether a comment with this id was already persisted.
    fn comment_exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.get_comment(id)?.is_some())
    }

    fn append_monologue(&self, monologue: &Monologue) -> Result<(), StoreError>;

    /// Up to `limit` monologues, newest first.
    fn recent_monologues(&self, limit: usize) -> Result<Vec<Monologue>, StoreError>;

    fn append_manifest(&self, manifest: &Manifest) -> Result<(), StoreError>;

    fn get_manifest(&self, id: &str) -> Result<Option<Manifest>, StoreError>;

    /// All unpublished manifests, oldest first.
    fn unpublished_manifests(&self) -> Result<Vec<Manifest>, StoreError>;

    /// Flip a manifest to published. Returns `false` if it was already
    /// published or does not exist; a published manifest never reverts.
    fn mark_manifest_published(&self, id: &str, at: DateTime<Utc>) -> Result<bool, StoreError>;
}
