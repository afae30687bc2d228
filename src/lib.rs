pub mod config;
pub mod db;
pub mod handlers;
pub mod session;
pub mod state;

pub use config::{Config, ConfigError};
pub use db::{HistoryDatabase, HistoryItem};
pub use session::{
    EegSample, SessionController, SessionError, SessionManager, SessionRunConfig, SessionState,
};
pub use state::AppState;
