//! Decision and generation logic: whether and how to answer a comment, inner
//! monologues, and manifest publication.

pub mod monologue;
pub mod response;
pub mod revelation;

pub use monologue::MonologueGenerator;
pub use response::{should_respond, ResponseGenerator};
pub use revelation::{ManifestPublisher, PublishOutcome};
