// Common types for the session pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that abort a session start or a manager operation.
///
/// Ingestion, classification, and persistence failures are contained at the
/// operation that raised them and surface through logs and stats instead.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("UDP bind failed: {0}")]
    Bind(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Session already running")]
    AlreadyRunning,

    #[error("No session is running")]
    NotRunning,
}

/// A single timestamped multi-channel reading.
///
/// Immutable once created; arrival time is stamped locally at ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EegSample {
    pub captured_at: DateTime<Utc>,
    pub channels: Vec<f32>,
}

impl EegSample {
    /// Builds a sample from decoded datagram values, keeping the first
    /// `channel_count` readings. Datagrams carrying fewer values are
    /// malformed and rejected before they reach the buffer.
    pub fn from_values(
        values: &[f32],
        channel_count: usize,
        captured_at: DateTime<Utc>,
    ) -> Option<Self> {
        if values.len() < channel_count {
            return None;
        }
        Some(Self {
            captured_at,
            channels: values[..channel_count].to_vec(),
        })
    }
}

/// One label produced from a successfully classified window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub produced_at: DateTime<Utc>,
}

/// Current state of a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum SessionState {
    /// No session activity yet
    Idle,

    /// Accepting datagrams until the deadline or an external stop
    Listening { started_at: DateTime<Utc> },

    /// Intake stopped; an in-flight window may still be settling
    Draining,

    /// Computing the outcome and persisting the session record
    Finalizing,

    /// Session is over; `outcome` is the persisted label, if any
    Terminated { outcome: Option<String> },
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Counters describing one session's ingestion and classification activity
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionStats {
    pub datagrams_received: u64,
    pub samples_accepted: u64,
    pub malformed_dropped: u64,
    pub queue_dropped: u64,
    pub buffer_discarded: u64,
    pub windows_classified: u64,
    pub classification_failures: u64,
}
