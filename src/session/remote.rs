// Remote persistence client
//
// Two blocking calls the lifecycle controller depends on at finalization:
// a context fetch to resolve the patient behind the headband, and the
// session record post. Neither is retried; failures are logged by the
// caller and never abort termination.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Wire timestamp format: `YYYY-MM-DD HH:MM:SS.ffffff`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub type RemoteResult<T> = Result<T, RemoteError>;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("remote rejected the request: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// The finalized session summary posted to the remote store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "HeadbandID")]
    pub headband_id: i64,
    #[serde(rename = "Duration")]
    pub duration: i64,
    #[serde(rename = "Result")]
    pub result: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "patient_ID")]
    pub patient_id: Option<i64>,
    #[serde(rename = "doctor_ID")]
    pub doctor_id: Option<i64>,
}

impl SessionRecord {
    pub fn new(
        headband_id: i64,
        duration: i64,
        result: String,
        finished_at: DateTime<Utc>,
        patient_id: Option<i64>,
    ) -> Self {
        Self {
            headband_id,
            duration,
            result,
            timestamp: finished_at.format(TIMESTAMP_FORMAT).to_string(),
            patient_id,
            doctor_id: None,
        }
    }
}

/// Patient context resolved before posting a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionContext {
    pub patient_id: Option<i64>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoleEntry {
    #[serde(rename = "patient_ID")]
    patient_id: Option<i64>,
    #[serde(rename = "Role")]
    role: Option<String>,
}

fn context_from_entries(entries: Vec<RoleEntry>) -> SessionContext {
    // Only the first element carries the session's context.
    entries
        .into_iter()
        .next()
        .map(|entry| SessionContext {
            patient_id: entry.patient_id,
            role: entry.role,
        })
        .unwrap_or_default()
}

/// Remote store the controller persists finished sessions to.
#[async_trait]
pub trait RemoteSessionStore: Send + Sync {
    /// Resolves the patient context for the upcoming record. An unknown
    /// context is not a failure.
    async fn fetch_session_context(&self) -> RemoteResult<SessionContext>;

    /// Posts the finalized record. Success is HTTP 200.
    async fn post_session_record(&self, record: &SessionRecord) -> RemoteResult<()>;
}

/// reqwest-backed implementation of the remote store contract.
pub struct HttpSessionStore {
    client: Client,
    base_url: String,
}

impl HttpSessionStore {
    pub fn new(base_url: impl Into<String>) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl RemoteSessionStore for HttpSessionStore {
    async fn fetch_session_context(&self) -> RemoteResult<SessionContext> {
        let url = format!("{}/api/listRole", self.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "context fetch returned non-success, proceeding without patient");
            return Ok(SessionContext::default());
        }

        let entries: Vec<RoleEntry> = response.json().await?;
        Ok(context_from_entries(entries))
    }

    async fn post_session_record(&self, record: &SessionRecord) -> RemoteResult<()> {
        let url = format!("{}/api/addSession", self.base_url);
        let response = self.client.post(&url).json(record).send().await?;

        let status = response.status();
        if status.as_u16() == 200 {
            debug!("session record stored remotely");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(RemoteError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}
