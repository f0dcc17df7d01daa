//! Configuration for the agent.
//!
//! A single [`Config`] is loaded once at startup (YAML file plus environment
//! overrides for secrets), validated, and then passed by reference into every
//! constructor that needs it. Nothing reads configuration lazily.
//!
//! # Environment Variables
//!
//! - `SOLIPSIST_CONFIG` — path to the YAML file (default: `config/solipsist.yaml`)
//! - `OPENROUTER_API_KEY` — overrides `llm.api_key`
//! - `VK_ACCESS_TOKEN` — overrides `feed.access_token`
//! - `VK_GROUP_ID` — overrides `feed.group_id`
//! - `SOLIPSIST_DB_PATH` — overrides `database.path`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/solipsist.yaml";

/// Values starting with this prefix are template placeholders, not secrets.
const PLACEHOLDER_PREFIX: &str = "YOUR_";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub state: StateConfig,
    pub llm: LlmConfig,
    pub feed: FeedConfig,
    pub schedule: ScheduleConfig,
    pub persona: PersonaConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
}

/// Initial state vector and decay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub initial_certainty: f64,
    pub initial_intrusion: f64,
    pub initial_coherence: f64,
    /// Fraction of intrusion shed after each successful publication.
    pub decay_rate: f64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            initial_certainty: 0.3,
            initial_intrusion: 0.1,
            initial_coherence: 0.9,
            decay_rate: 0.02,
        }
    }
}

/// Language-model service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub models: ModelsConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            timeout_secs: 60,
            models: ModelsConfig::default(),
        }
    }
}

/// Model identifier per role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub classification: String,
    /// Monologue thoughts.
    pub thinking: String,
    pub generation: String,
    pub vision: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            classification: "deepseek/deepseek-chat".to_string(),
            thinking: "deepseek/deepseek-chat".to_string(),
            generation: "anthropic/claude-sonnet-4".to_string(),
            vision: "google/gemini-2.0-flash-exp:free".to_string(),
        }
    }
}

/// Social-platform feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub access_token: Option<String>,
    /// Community identifier. Accepted with either sign; see [`FeedConfig::own_author_id`].
    #[serde(deserialize_with = "id_as_string")]
    pub group_id: Option<String>,
    /// Account whose comments are flagged in the log.
    #[serde(deserialize_with = "id_as_string")]
    pub creator_user_id: Option<String>,
    pub api_version: String,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Maximum comments handed to the pipeline per poll.
    pub batch_size: usize,
    /// How many recent wall posts are scanned for comments.
    pub posts_to_scan: usize,
    pub poll_interval_secs: u64,
    /// Post generated responses as replies under the comment.
    pub post_replies: bool,
    /// Maximum characters in a single published message, part marker included.
    pub max_message_chars: usize,
    /// Pause between the parts of a multi-part publication.
    pub part_delay_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            group_id: None,
            creator_user_id: None,
            api_version: "5.131".to_string(),
            base_url: "https://api.vk.com/method".to_string(),
            timeout_secs: 30,
            batch_size: 20,
            posts_to_scan: 10,
            poll_interval_secs: 60,
            post_replies: false,
            max_message_chars: 4000,
            part_delay_ms: 1500,
        }
    }
}

impl FeedConfig {
    /// Author id the platform attaches to posts and comments made by the community.
    ///
    /// Community authors carry the negated group id, so the configured value is
    /// normalized to `-|group_id|` whatever sign it was written with.
    pub fn own_author_id(&self) -> Option<i64> {
        let raw = self.group_id.as_deref()?.trim();
        raw.parse::<i64>().ok()?.checked_abs().map(|id| -id)
    }

    /// Absolute value of the creator account id, if configured.
    pub fn creator_id(&self) -> Option<i64> {
        let raw = self.creator_user_id.as_deref()?.trim();
        raw.parse::<i64>().ok()?.checked_abs()
    }
}

/// Cadence of reflection and publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub monologue_interval_minutes: u64,
    pub thoughts_per_monologue: usize,
    /// Wall-clock hours (0-23) at which a publication attempt runs.
    pub publication_hours: Vec<u32>,
    /// Offset of the publication clock from UTC.
    pub utc_offset_hours: i32,
    /// Number of recent monologues aggregated into one manifest.
    pub manifest_monologue_count: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            monologue_interval_minutes: 60,
            thoughts_per_monologue: 3,
            publication_hours: vec![0, 12],
            utc_offset_hours: 3,
            manifest_monologue_count: 5,
        }
    }
}

/// Voice of generated text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Language the public texts are written in.
    pub language: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            language: "Russian".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("memory/solipsist.db"),
        }
    }
}

/// Optional read-only status server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address such as `127.0.0.1:8080`. No server when absent.
    pub bind: Option<String>,
}

impl Config {
    /// Parse a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse a configuration from a YAML file on disk.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load the file named by `SOLIPSIST_CONFIG`, apply environment overrides
    /// and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("SOLIPSIST_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_yaml_file(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override secrets and paths from the environment.
    ///
    /// The lookup is injected so tests do not have to touch process state.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENROUTER_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(token) = lookup("VK_ACCESS_TOKEN") {
            self.feed.access_token = Some(token);
        }
        if let Some(group) = lookup("VK_GROUP_ID") {
            self.feed.group_id = Some(group);
        }
        if let Some(path) = lookup("SOLIPSIST_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
    }

    /// Check that every value the service cannot run without is present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_real_secret(self.llm.api_key.as_deref()) {
            return Err(ConfigError::Missing("llm.api_key"));
        }
        if !is_real_secret(self.feed.access_token.as_deref()) {
            return Err(ConfigError::Missing("feed.access_token"));
        }
        if self.feed.group_id.is_none() {
            return Err(ConfigError::Missing("feed.group_id"));
        }
        if self.feed.own_author_id().is_none() {
            return Err(ConfigError::Invalid {
                key: "feed.group_id",
                message: "must be an integer id".to_string(),
            });
        }

        check_unit("state.initial_certainty", self.state.initial_certainty)?;
        check_unit("state.initial_intrusion", self.state.initial_intrusion)?;
        check_unit("state.initial_coherence", self.state.initial_coherence)?;
        check_unit("state.decay_rate", self.state.decay_rate)?;

        check_positive("feed.batch_size", self.feed.batch_size)?;
        check_positive("schedule.thoughts_per_monologue", self.schedule.thoughts_per_monologue)?;
        check_positive(
            "schedule.manifest_monologue_count",
            self.schedule.manifest_monologue_count,
        )?;
        if self.feed.max_message_chars <= crate::utilities::chunking::PART_MARKER_RESERVE {
            return Err(ConfigError::Invalid {
                key: "feed.max_message_chars",
                message: format!(
                    "must exceed {} characters",
                    crate::utilities::chunking::PART_MARKER_RESERVE
                ),
            });
        }
        if self.schedule.monologue_interval_minutes == 0 || self.feed.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "schedule",
                message: "intervals must be non-zero".to_string(),
            });
        }
        if let Some(hour) = self.schedule.publication_hours.iter().find(|h| **h > 23) {
            return Err(ConfigError::Invalid {
                key: "schedule.publication_hours",
                message: format!("{} is not an hour of the day", hour),
            });
        }
        if !(-12..=14).contains(&self.schedule.utc_offset_hours) {
            return Err(ConfigError::Invalid {
                key: "schedule.utc_offset_hours",
                message: format!("{} is outside -12..=14", self.schedule.utc_offset_hours),
            });
        }
        Ok(())
    }
}

/// Accept numeric ids written either as YAML integers or as strings.
fn id_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Int(i64),
        Text(String),
    }

    Ok(Option::<RawId>::deserialize(deserializer)?.map(|raw| match raw {
        RawId::Int(id) => id.to_string(),
        RawId::Text(text) => text,
    }))
}

/// Whether a secret is set and is not a template placeholder.
pub(crate) fn is_real_secret(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        Some(v) => !v.is_empty() && !v.starts_with(PLACEHOLDER_PREFIX),
        None => false,
    }
}

fn check_unit(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            key,
            message: format!("{} is outside [0, 1]", value),
        })
    }
}

fn check_positive(key: &'static str, value: usize) -> Result<(), ConfigError> {
    if value > 0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            key,
            message: "must be greater than zero".to_string(),
        })
    }
}
