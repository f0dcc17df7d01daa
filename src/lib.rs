//! # Solipsist
//!
//! An autonomous content agent that treats its audience as a possible
//! hallucination. It polls a social feed for comments, classifies and scores
//! each one, folds the result into a persisted three-scalar state, decides
//! whether to answer, and on a schedule reflects in inner monologues that are
//! aggregated into published manifests.
//!
//! The pieces:
//!
//! - [`perception`] and [`interpretation`] turn a raw comment into a
//!   classification and an intrusion score.
//! - [`state`] holds the state vector, its pure transitions, and the single
//!   [`StateEngine`](state::StateEngine) that appends every snapshot.
//! - [`logic`] decides on responses and generates monologues and manifests.
//! - [`agent::Solipsist`] runs the comment pipeline and the reflection and
//!   publication entry points; [`runtime::Runtime`] drives it from one
//!   command queue.
//! - [`llm`], [`feed`] and [`storage`] are the external collaborators.

pub mod agent;
pub mod config;
pub mod error;
pub mod feed;
pub mod interpretation;
pub mod llm;
pub mod logic;
pub mod perception;
pub mod runtime;
pub mod server;
pub mod state;
pub mod storage;
pub mod utilities;

#[cfg(test)]
pub(crate) mod test_support;

pub use agent::Solipsist;
pub use config::Config;
pub use error::{Result, SolipsistError};
pub use interpretation::Classification;
pub use runtime::{Command, Runtime};
pub use state::{StateEngine, StateVector};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
