use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::db::HistoryDatabase;
use crate::session::classify::EpochFeatureClassifier;
use crate::session::controller::SessionManager;
use crate::session::remote::HttpSessionStore;

/// Shared service state handed to every handler
pub struct AppState {
    pub config: Config,
    pub history_db: Arc<HistoryDatabase>,
    pub sessions: SessionManager,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let history_db = Arc::new(
            HistoryDatabase::new(&config.database_path)
                .context("Failed to open history database")?,
        );

        let classifier = Arc::new(EpochFeatureClassifier::new(config.epoch_config()));
        let remote = Arc::new(
            HttpSessionStore::new(config.remote_base_url.clone())
                .context("Failed to build remote store client")?,
        );

        let sessions = SessionManager::new(
            config.session_run_config(),
            classifier,
            remote,
            Arc::clone(&history_db),
        );

        Ok(Self {
            config,
            history_db,
            sessions,
            start_time: Instant::now(),
        })
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
