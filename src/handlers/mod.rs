pub mod health;
pub mod history;
pub mod sessions;

pub use health::health_check;
pub use history::{delete_history_item, get_history_item, get_history_result, list_history};
pub use sessions::{session_status, start_session, stop_session};

use serde::Serialize;

/// Error body returned by handlers that fail with context
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
