// Bounded-session EEG ingestion and classification
//
// This module owns the part of the service with real state and timing: the
// UDP/OSC intake, sample buffering and windowing, per-window classification,
// and the timed session lifecycle that coordinates them.
//
// Architecture:
// - `osc`: wire codec for inbound datagrams
// - `buffer`: bounded sample accumulation with the window trigger
// - `classify`: pluggable window classifier behind a trait
// - `history`: per-session label log with the mode query
// - `controller`: lifecycle state machine and task coordination
// - `remote`: HTTP persistence client for finalized sessions

pub mod buffer;
pub mod classify;
pub mod controller;
pub mod history;
pub mod osc;
pub mod remote;
pub mod types;

pub use buffer::{BufferMetrics, SampleBuffer};
pub use classify::{ClassifyError, EpochConfig, EpochFeatureClassifier, WindowClassifier};
pub use controller::{SessionController, SessionManager, SessionRunConfig};
pub use history::SessionHistory;
pub use osc::{OscError, OscMessage};
pub use remote::{
    HttpSessionStore, RemoteError, RemoteResult, RemoteSessionStore, SessionContext, SessionRecord,
};
pub use types::{
    Classification, EegSample, SessionError, SessionResult, SessionState, SessionStats,
};
