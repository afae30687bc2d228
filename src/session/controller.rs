// Session lifecycle controller
//
// Owns one bounded session end to end: binds the OSC socket, accepts
// datagrams until the deadline or an external stop, drains the in-flight
// window, and finalizes exactly once. A single CancellationToken is the
// only cancellation mechanism; the deadline and any stop request both
// cancel it, and an atomic swap guards the finalize path.
//
// Task layout: the receive task only decodes and queues samples; the ingest
// task is the sole buffer writer and the only caller of the classifier.
// Datagrams arriving while a classification is in flight queue up in the
// bounded channel between the two; when it is full the newest datagram is
// dropped and counted.

use crate::db::HistoryDatabase;
use crate::session::buffer::SampleBuffer;
use crate::session::classify::WindowClassifier;
use crate::session::history::SessionHistory;
use crate::session::osc;
use crate::session::remote::{RemoteSessionStore, SessionRecord};
use crate::session::types::{
    Classification, EegSample, SessionError, SessionResult, SessionState, SessionStats,
};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MAX_DATAGRAM_SIZE: usize = 1536;

/// Parameters for one session run
#[derive(Debug, Clone)]
pub struct SessionRunConfig {
    pub osc_bind_addr: String,
    /// Only messages for this OSC address are ingested
    pub osc_address: String,
    pub channel_count: usize,
    pub buffer_size: usize,
    pub batch_size: usize,
    pub session_duration: Duration,
    pub headband_id: i64,
    /// Capacity of the receive→ingest queue
    pub queue_capacity: usize,
}

impl Default for SessionRunConfig {
    fn default() -> Self {
        Self {
            osc_bind_addr: "0.0.0.0:5000".to_string(),
            osc_address: "/muse/eeg".to_string(),
            channel_count: 5,
            buffer_size: 100,
            batch_size: 30,
            session_duration: Duration::from_secs(30),
            headband_id: 105,
            queue_capacity: 256,
        }
    }
}

#[derive(Default)]
struct Counters {
    datagrams_received: AtomicU64,
    samples_accepted: AtomicU64,
    malformed_dropped: AtomicU64,
    queue_dropped: AtomicU64,
    buffer_discarded: AtomicU64,
    windows_classified: AtomicU64,
    classification_failures: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SessionStats {
        SessionStats {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            samples_accepted: self.samples_accepted.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            queue_dropped: self.queue_dropped.load(Ordering::Relaxed),
            buffer_discarded: self.buffer_discarded.load(Ordering::Relaxed),
            windows_classified: self.windows_classified.load(Ordering::Relaxed),
            classification_failures: self.classification_failures.load(Ordering::Relaxed),
        }
    }
}

/// Controller for a single session.
pub struct SessionController {
    pub id: String,
    config: SessionRunConfig,

    classifier: Arc<dyn WindowClassifier>,
    remote: Arc<dyn RemoteSessionStore>,
    history_db: Arc<HistoryDatabase>,

    history: Mutex<SessionHistory>,
    state: RwLock<SessionState>,
    counters: Counters,

    cancel_token: CancellationToken,
    started: AtomicBool,
    finalized: AtomicBool,
    local_addr: RwLock<Option<SocketAddr>>,
}

impl SessionController {
    pub fn new(
        config: SessionRunConfig,
        classifier: Arc<dyn WindowClassifier>,
        remote: Arc<dyn RemoteSessionStore>,
        history_db: Arc<HistoryDatabase>,
    ) -> SessionResult<Self> {
        if config.buffer_size == 0 || config.batch_size == 0 {
            return Err(SessionError::InvalidConfig(
                "buffer_size and batch_size must be at least 1".to_string(),
            ));
        }
        if config.batch_size > config.buffer_size {
            return Err(SessionError::InvalidConfig(format!(
                "batch_size {} exceeds buffer_size {}",
                config.batch_size, config.buffer_size
            )));
        }
        if config.channel_count == 0 {
            return Err(SessionError::InvalidConfig(
                "channel_count must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            config,
            classifier,
            remote,
            history_db,
            history: Mutex::new(SessionHistory::new()),
            state: RwLock::new(SessionState::Idle),
            counters: Counters::default(),
            cancel_token: CancellationToken::new(),
            started: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
            local_addr: RwLock::new(None),
        })
    }

    /// Binds the OSC socket and starts the session. A bind failure aborts
    /// the start; nothing begins listening and no finalize will run.
    pub async fn start(self: Arc<Self>) -> SessionResult<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadyRunning);
        }

        let socket = UdpSocket::bind(&self.config.osc_bind_addr)
            .await
            .map_err(|e| SessionError::Bind(format!("{}: {}", self.config.osc_bind_addr, e)))?;
        *self.local_addr.write() = socket.local_addr().ok();

        info!(
            session_id = %self.id,
            addr = %self.config.osc_bind_addr,
            duration_secs = self.config.session_duration.as_secs(),
            "session listening for OSC datagrams"
        );
        self.set_state(SessionState::Listening {
            started_at: Utc::now(),
        });

        Ok(tokio::spawn(self.run(socket)))
    }

    /// Requests a stop: the session transitions to Draining and finalizes
    /// as soon as any in-flight window settles. Idempotent.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    pub fn state(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot()
    }

    pub fn is_terminated(&self) -> bool {
        matches!(*self.state.read(), SessionState::Terminated { .. })
    }

    /// Address the OSC socket actually bound to, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read()
    }

    async fn run(self: Arc<Self>, socket: UdpSocket) {
        let (tx, rx) = mpsc::channel::<EegSample>(self.config.queue_capacity);

        let receive_task = tokio::spawn(Arc::clone(&self).receive_loop(socket, tx));
        let ingest_task = tokio::spawn(Arc::clone(&self).ingest_loop(rx));

        tokio::select! {
            _ = tokio::time::sleep(self.config.session_duration) => {
                info!(session_id = %self.id, "session deadline reached");
            }
            _ = self.cancel_token.cancelled() => {
                info!(session_id = %self.id, "session stop requested");
            }
        }

        // Draining: stop intake, then let the in-flight window settle. The
        // cancel below also disarms the deadline path when the stop came
        // from outside.
        self.set_state(SessionState::Draining);
        self.cancel_token.cancel();
        let _ = receive_task.await;
        let _ = ingest_task.await;

        self.finalize().await;
    }

    async fn receive_loop(self: Arc<Self>, socket: UdpSocket, tx: mpsc::Sender<EegSample>) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => {
                    debug!(session_id = %self.id, "receive loop stopped");
                    break;
                }

                received = socket.recv_from(&mut buf) => {
                    let len = match received {
                        Ok((len, _)) => len,
                        Err(e) => {
                            warn!(error = %e, "UDP receive error");
                            continue;
                        }
                    };
                    self.counters.datagrams_received.fetch_add(1, Ordering::Relaxed);
                    self.handle_datagram(&buf[..len], &tx);
                }
            }
        }
        // The socket and the sender drop here; the ingest loop sees the
        // closed channel after it drains what was queued.
    }

    fn handle_datagram(&self, payload: &[u8], tx: &mpsc::Sender<EegSample>) {
        let message = match osc::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                self.counters.malformed_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "dropping malformed datagram");
                return;
            }
        };

        if message.address != self.config.osc_address {
            debug!(address = %message.address, "ignoring datagram for unmapped address");
            return;
        }

        let Some(sample) =
            EegSample::from_values(&message.args, self.config.channel_count, Utc::now())
        else {
            self.counters.malformed_dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                got = message.args.len(),
                needed = self.config.channel_count,
                "dropping sample with too few channel values"
            );
            return;
        };

        self.counters.samples_accepted.fetch_add(1, Ordering::Relaxed);

        match tx.try_send(sample) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.queue_dropped.fetch_add(1, Ordering::Relaxed);
                warn!("ingest queue full, dropping newest datagram");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    async fn ingest_loop(self: Arc<Self>, mut rx: mpsc::Receiver<EegSample>) {
        let buffer = SampleBuffer::new(self.config.buffer_size, self.config.batch_size);

        while let Some(sample) = rx.recv().await {
            buffer.append(sample);
            if buffer.should_fire() {
                let (window, discarded) = buffer.extract_window();
                self.counters
                    .buffer_discarded
                    .fetch_add(discarded, Ordering::Relaxed);
                self.classify_window(window).await;
            }
        }
        debug!(session_id = %self.id, "ingest loop stopped");
    }

    async fn classify_window(&self, window: Vec<EegSample>) {
        let classifier = Arc::clone(&self.classifier);
        let result = tokio::task::spawn_blocking(move || classifier.classify(&window)).await;

        match result {
            Ok(Ok(label)) => {
                debug!(%label, "window classified");
                self.counters.windows_classified.fetch_add(1, Ordering::Relaxed);
                self.history.lock().record(Classification {
                    label,
                    produced_at: Utc::now(),
                });
            }
            Ok(Err(e)) => {
                self.counters
                    .classification_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "window classification failed, skipping window");
            }
            Err(e) => {
                self.counters
                    .classification_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "classification task failed to complete");
            }
        }
    }

    /// Computes the outcome, persists it, and marks the session Terminated.
    /// Runs exactly once no matter how many paths request shutdown.
    async fn finalize(&self) {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return;
        }
        self.set_state(SessionState::Finalizing);

        let outcome = {
            let history = self.history.lock();
            history
                .mode()
                .or_else(|| history.last().map(|c| c.label.clone()))
        };

        let Some(outcome) = outcome else {
            info!(session_id = %self.id, "session produced no classifications, nothing to persist");
            self.set_state(SessionState::Terminated { outcome: None });
            return;
        };

        let context = match self.remote.fetch_session_context().await {
            Ok(context) => context,
            Err(e) => {
                warn!(error = %e, "session context fetch failed, proceeding without patient");
                Default::default()
            }
        };

        let record = SessionRecord::new(
            self.config.headband_id,
            self.config.session_duration.as_secs() as i64,
            outcome.clone(),
            Utc::now(),
            context.patient_id,
        );

        if let Err(e) = self.remote.post_session_record(&record).await {
            warn!(error = %e, "failed to store session record remotely");
        }

        if let Err(e) = self.history_db.insert(
            &record.timestamp,
            &record.duration.to_string(),
            &record.result,
        ) {
            warn!(error = %e, "failed to store session record locally");
        }

        info!(session_id = %self.id, %outcome, "session terminated");
        self.set_state(SessionState::Terminated {
            outcome: Some(outcome),
        });
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        // Ensure the tasks shut down if the controller is discarded early.
        self.cancel_token.cancel();
    }
}

/// Holds at most one live session and allows a new one once the previous
/// session has terminated.
pub struct SessionManager {
    run_config: SessionRunConfig,
    classifier: Arc<dyn WindowClassifier>,
    remote: Arc<dyn RemoteSessionStore>,
    history_db: Arc<HistoryDatabase>,
    current: tokio::sync::Mutex<Option<Arc<SessionController>>>,
}

impl SessionManager {
    pub fn new(
        run_config: SessionRunConfig,
        classifier: Arc<dyn WindowClassifier>,
        remote: Arc<dyn RemoteSessionStore>,
        history_db: Arc<HistoryDatabase>,
    ) -> Self {
        Self {
            run_config,
            classifier,
            remote,
            history_db,
            current: tokio::sync::Mutex::new(None),
        }
    }

    /// Starts a new session, failing if one is still running.
    pub async fn start_session(&self) -> SessionResult<String> {
        let mut current = self.current.lock().await;
        if let Some(active) = current.as_ref() {
            if !active.is_terminated() {
                return Err(SessionError::AlreadyRunning);
            }
        }

        let controller = Arc::new(SessionController::new(
            self.run_config.clone(),
            Arc::clone(&self.classifier),
            Arc::clone(&self.remote),
            Arc::clone(&self.history_db),
        )?);
        Arc::clone(&controller).start().await?;

        let id = controller.id.clone();
        *current = Some(controller);
        Ok(id)
    }

    /// Signals the running session to stop; it drains and finalizes on its
    /// own tasks.
    pub async fn stop_session(&self) -> SessionResult<()> {
        let current = self.current.lock().await;
        match current.as_ref() {
            Some(controller) if !controller.is_terminated() => {
                controller.stop();
                Ok(())
            }
            _ => Err(SessionError::NotRunning),
        }
    }

    /// State and stats of the current (or most recent) session.
    pub async fn current_session(&self) -> Option<(String, SessionState, SessionStats)> {
        let current = self.current.lock().await;
        current
            .as_ref()
            .map(|c| (c.id.clone(), c.state(), c.stats()))
    }
}
