//! Error types for the agent.
//!
//! Each external concern has its own enum so call sites can decide which
//! failures are transient (language model, feed) and which indicate a broken
//! invariant (store). Pipeline entry points never surface these to the caller;
//! they are logged at the pipeline boundary.

use thiserror::Error;

/// Errors raised while loading or validating configuration.
///
/// These are the only errors that stop the process: a service without a
/// token or group identity cannot do anything useful.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Reading the configuration file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A required key is absent or still holds a placeholder value.
    #[error("Missing configuration value: {0}")]
    Missing(&'static str),

    /// A value is present but out of range.
    #[error("Invalid configuration value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Errors from the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A JSON column could not be encoded or decoded.
    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),

    /// A persisted row violates the data model (bad timestamp, unknown label).
    #[error("Corrupt {table} row: {message}")]
    Corrupt { table: &'static str, message: String },

    /// Creating the database directory failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the language-model collaborator.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No usable API key was configured.
    #[error("Language model API key not configured")]
    NotConfigured,

    /// Transport failure, including timeouts.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("Language model API error ({status}): {body}")]
    Status { status: u16, body: String },

    /// The body did not have the expected shape.
    #[error("Malformed language model response: {0}")]
    Malformed(String),

    /// The completion was present but blank.
    #[error("Language model returned an empty completion")]
    EmptyCompletion,
}

/// Errors from the social-platform feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// No usable access token or group id was configured.
    #[error("Feed access token not configured")]
    NotConfigured,

    /// Transport failure, including timeouts.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform returned an error object.
    #[error("Feed API error {code}: {message}")]
    Api { code: i64, message: String },

    /// The body did not have the expected shape.
    #[error("Malformed feed response: {0}")]
    Malformed(String),
}

/// Umbrella error used inside the pipelines.
#[derive(Debug, Error)]
pub enum SolipsistError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Feed(#[from] FeedError),
}

/// Convenience alias for pipeline internals.
pub type Result<T, E = SolipsistError> = std::result::Result<T, E>;
