//! Configuration loading
//!
//! Configuration lives in a single JSON file (default
//! `~/.newsroll/newsroll.json`). Every field has a default, so a missing
//! file or a partial file is fine.

use crate::types::check_categories;
use crate::{CategorySpec, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable consulted for the API key when the file has none
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub openai: OpenAiSettings,
    /// Closed category list; empty means free-form grouping
    pub categories: Vec<CategorySpec>,
    pub classification: ClassificationSettings,
    pub database: DatabaseSettings,
}

/// Completion service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    /// Overrides `OPENAI_API_KEY`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.1,
            api_key: None,
        }
    }
}

/// What to return when the attempt budget is exhausted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DegradedPolicy {
    /// No items assigned; configured categories present and empty
    #[default]
    Empty,
    /// Every item placed in one catch-all group
    CatchAll { label: String },
}

/// Retry and batching settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationSettings {
    pub max_attempts: u32,
    pub base_delay_seconds: f64,
    pub preview_limit: usize,
    pub degraded_policy: DegradedPolicy,
    /// Items per classification call
    pub batch_size: usize,
    /// Classification calls in flight at once
    pub concurrency: usize,
    /// Overall deadline per classification call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_seconds: Option<f64>,
}

impl Default for ClassificationSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_seconds: 1.0,
            preview_limit: crate::validation::DEFAULT_PREVIEW_LIMIT,
            degraded_policy: DegradedPolicy::Empty,
            batch_size: 50,
            concurrency: 2,
            deadline_seconds: None,
        }
    }
}

/// Run-log database settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "~/.newsroll/runs.db".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = expand_path(path)?;
        info!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(&path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;

        debug!(
            "Loaded configuration: model={}, {} categories",
            config.openai.model,
            config.categories.len()
        );
        Ok(config)
    }

    /// Load from the default location, falling back to defaults if absent
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Get the default configuration path
    pub fn default_path() -> Result<PathBuf> {
        Ok(home_dir()?.join(".newsroll").join("newsroll.json"))
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        check_categories(&self.categories)?;

        let c = &self.classification;
        if c.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".into()));
        }
        if !c.base_delay_seconds.is_finite() || c.base_delay_seconds < 0.0 {
            return Err(Error::Config(
                "base_delay_seconds must be a non-negative number".into(),
            ));
        }
        if c.batch_size == 0 || c.concurrency == 0 {
            return Err(Error::Config(
                "batch_size and concurrency must be at least 1".into(),
            ));
        }
        if let Some(deadline) = c.deadline_seconds {
            if !deadline.is_finite() || deadline <= 0.0 {
                return Err(Error::Config("deadline_seconds must be positive".into()));
            }
        }
        if let DegradedPolicy::CatchAll { label } = &c.degraded_policy {
            if label.trim().is_empty() {
                return Err(Error::Config("catch-all label must not be empty".into()));
            }
        }
        Ok(())
    }

    /// API key from the file or the environment
    pub fn api_key(&self) -> Option<String> {
        self.openai
            .api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }

    /// Database path with `~/` expanded
    pub fn database_path(&self) -> Result<PathBuf> {
        expand_path(&self.database.path)
    }
}

fn home_dir() -> Result<PathBuf> {
    std::env::var("HOME")
        .map(PathBuf::from)
        .map_err(|_| Error::Other("HOME environment variable not set".to_string()))
}

/// Expand tilde in path
pub fn expand_path<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    let path_str = path
        .to_str()
        .ok_or_else(|| Error::Other(format!("Invalid path: {}", path.display())))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        Ok(home_dir()?.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
