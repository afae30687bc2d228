use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::session::classify::EpochConfig;
use crate::session::controller::SessionRunConfig;

/// Service configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP API bind address
    pub http_bind_addr: String,
    /// HTTP API port
    pub http_port: u16,
    /// OSC ingestion bind address (0.0.0.0 to accept from the LAN)
    pub osc_bind_addr: String,
    /// OSC ingestion port
    pub osc_port: u16,
    /// OSC address pattern that carries channel readings
    pub osc_address: String,
    /// Session deadline in seconds
    pub session_duration_seconds: u64,
    /// Samples accumulated before a window fires
    pub buffer_size: usize,
    /// Samples per extracted window
    pub batch_size: usize,
    /// Channel readings consumed per datagram
    pub channel_count: usize,
    /// Samples per classifier feature epoch
    pub epoch_len: usize,
    /// Advance between consecutive feature epochs
    pub epoch_step: usize,
    /// Headband identifier stamped on session records
    pub headband_id: i64,
    /// Base URL of the remote session store
    pub remote_base_url: String,
    /// Path to the local history database
    pub database_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Self {
            http_bind_addr: env::var("NEUROSESSION_HTTP_BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1".to_string()),
            http_port: env::var("NEUROSESSION_HTTP_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            osc_bind_addr: env::var("NEUROSESSION_OSC_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            osc_port: env::var("NEUROSESSION_OSC_PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            osc_address: env::var("NEUROSESSION_OSC_ADDRESS")
                .unwrap_or_else(|_| "/muse/eeg".to_string()),
            session_duration_seconds: env::var("NEUROSESSION_SESSION_DURATION")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue(
                        "NEUROSESSION_SESSION_DURATION must be an integer".to_string(),
                    )
                })?,
            buffer_size: env::var("NEUROSESSION_BUFFER_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),
            batch_size: env::var("NEUROSESSION_BATCH_SIZE")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            channel_count: env::var("NEUROSESSION_CHANNEL_COUNT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            epoch_len: env::var("NEUROSESSION_EPOCH_LEN")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .unwrap_or(15),
            epoch_step: env::var("NEUROSESSION_EPOCH_STEP")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            headband_id: env::var("NEUROSESSION_HEADBAND_ID")
                .unwrap_or_else(|_| "105".to_string())
                .parse()
                .unwrap_or(105),
            remote_base_url: env::var("NEUROSESSION_REMOTE_URL").unwrap_or_else(|_| {
                "https://infinite-wave-71025-404d3d4feff8.herokuapp.com".to_string()
            }),
            database_path: env::var("NEUROSESSION_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("neurosession.db")),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::InvalidValue(
                "NEUROSESSION_BUFFER_SIZE must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 || self.batch_size > self.buffer_size {
            return Err(ConfigError::InvalidValue(format!(
                "NEUROSESSION_BATCH_SIZE must be between 1 and the buffer size ({})",
                self.buffer_size
            )));
        }
        if self.channel_count == 0 || self.channel_count > 5 {
            return Err(ConfigError::InvalidValue(
                "NEUROSESSION_CHANNEL_COUNT must be between 1 and 5".to_string(),
            ));
        }
        if self.epoch_len == 0 || self.epoch_step == 0 {
            return Err(ConfigError::InvalidValue(
                "epoch length and step must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the full HTTP bind address (addr:port)
    pub fn http_bind_address(&self) -> String {
        format!("{}:{}", self.http_bind_addr, self.http_port)
    }

    /// Get the full OSC bind address (addr:port)
    pub fn osc_bind_address(&self) -> String {
        format!("{}:{}", self.osc_bind_addr, self.osc_port)
    }

    pub fn session_run_config(&self) -> SessionRunConfig {
        SessionRunConfig {
            osc_bind_addr: self.osc_bind_address(),
            osc_address: self.osc_address.clone(),
            channel_count: self.channel_count,
            buffer_size: self.buffer_size,
            batch_size: self.batch_size,
            session_duration: Duration::from_secs(self.session_duration_seconds),
            headband_id: self.headband_id,
            ..Default::default()
        }
    }

    pub fn epoch_config(&self) -> EpochConfig {
        EpochConfig {
            epoch_len: self.epoch_len,
            epoch_step: self.epoch_step,
            ..Default::default()
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
