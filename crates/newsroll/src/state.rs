//! Application state

use anyhow::Context;
use newsroll_core::{Config, Database};
use std::path::Path;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<Config>,
    /// Run-log database
    pub db: Arc<Database>,
}

impl AppState {
    /// Load configuration and open the run-log database
    pub async fn new(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match config_path {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => Config::load_default().context("Failed to load default config")?,
        };

        let db_path = config.database_path()?;
        let db = Database::open(&db_path)
            .await
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

        Ok(Self {
            config: Arc::new(config),
            db: Arc::new(db),
        })
    }
}
