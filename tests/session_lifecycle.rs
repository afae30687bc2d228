// End-to-end lifecycle tests: real UDP ingestion, windowing, and the timed
// drain/finalize sequence, with the classifier and remote store mocked out.

use async_trait::async_trait;
use byteorder::{BigEndian, WriteBytesExt};
use neurosession::db::HistoryDatabase;
use neurosession::session::classify::{ClassifyError, WindowClassifier};
use neurosession::session::remote::{
    RemoteError, RemoteResult, RemoteSessionStore, SessionContext, SessionRecord,
};
use neurosession::session::types::{EegSample, SessionError, SessionState};
use neurosession::session::{SessionController, SessionManager, SessionRunConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::UdpSocket;

struct RecordingClassifier {
    windows: Mutex<Vec<Vec<EegSample>>>,
    delay: Option<Duration>,
    label: String,
}

impl RecordingClassifier {
    fn new(label: &str) -> Self {
        Self {
            windows: Mutex::new(Vec::new()),
            delay: None,
            label: label.to_string(),
        }
    }

    fn with_delay(label: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(label)
        }
    }

    fn invocations(&self) -> usize {
        self.windows.lock().len()
    }
}

impl WindowClassifier for RecordingClassifier {
    fn classify(&self, window: &[EegSample]) -> Result<String, ClassifyError> {
        self.windows.lock().push(window.to_vec());
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        Ok(self.label.clone())
    }
}

struct RecordingRemote {
    posts: Mutex<Vec<SessionRecord>>,
    context_fetches: AtomicU64,
    fail_posts: bool,
}

impl RecordingRemote {
    fn new() -> Self {
        Self {
            posts: Mutex::new(Vec::new()),
            context_fetches: AtomicU64::new(0),
            fail_posts: false,
        }
    }

    fn failing() -> Self {
        Self {
            fail_posts: true,
            ..Self::new()
        }
    }

    fn post_count(&self) -> usize {
        self.posts.lock().len()
    }
}

#[async_trait]
impl RemoteSessionStore for RecordingRemote {
    async fn fetch_session_context(&self) -> RemoteResult<SessionContext> {
        self.context_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(SessionContext {
            patient_id: Some(7),
            role: Some("Patient".to_string()),
        })
    }

    async fn post_session_record(&self, record: &SessionRecord) -> RemoteResult<()> {
        self.posts.lock().push(record.clone());
        if self.fail_posts {
            return Err(RemoteError::Rejected {
                status: 500,
                body: "boom".to_string(),
            });
        }
        Ok(())
    }
}

fn temp_db() -> (TempDir, Arc<HistoryDatabase>) {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(HistoryDatabase::new(dir.path().join("history.db")).unwrap());
    (dir, db)
}

fn loopback_config(buffer_size: usize, batch_size: usize, duration: Duration) -> SessionRunConfig {
    SessionRunConfig {
        osc_bind_addr: "127.0.0.1:0".to_string(),
        channel_count: 1,
        buffer_size,
        batch_size,
        session_duration: duration,
        ..Default::default()
    }
}

fn osc_datagram(address: &str, values: &[f32]) -> Vec<u8> {
    fn pad(buf: &mut Vec<u8>, s: &str) {
        buf.extend_from_slice(s.as_bytes());
        buf.push(0);
        while buf.len() % 4 != 0 {
            buf.push(0);
        }
    }

    let mut buf = Vec::new();
    pad(&mut buf, address);
    let tags: String = std::iter::once(',')
        .chain(values.iter().map(|_| 'f'))
        .collect();
    pad(&mut buf, &tags);
    for v in values {
        buf.write_f32::<BigEndian>(*v).unwrap();
    }
    buf
}

async fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration, what: &str) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn hundred_datagrams_yield_one_window_of_first_thirty() {
    let (_dir, db) = temp_db();
    let classifier = Arc::new(RecordingClassifier::new("rest"));
    let remote = Arc::new(RecordingRemote::new());

    let controller = Arc::new(
        SessionController::new(
            loopback_config(100, 30, Duration::from_secs(60)),
            Arc::clone(&classifier) as Arc<dyn WindowClassifier>,
            Arc::clone(&remote) as Arc<dyn RemoteSessionStore>,
            Arc::clone(&db),
        )
        .unwrap(),
    );

    let handle = Arc::clone(&controller).start().await.unwrap();
    let addr = controller.local_addr().unwrap();

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for i in 0..100u32 {
        let datagram = osc_datagram("/muse/eeg", &[i as f32, 9.0, 9.0, 9.0, 9.0]);
        sender.send_to(&datagram, addr).await.unwrap();
        if i % 25 == 24 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    wait_for(
        || controller.stats().windows_classified == 1,
        Duration::from_secs(5),
        "one classified window",
    )
    .await;

    // Exactly one adapter invocation, on the first 30 samples in order.
    assert_eq!(classifier.invocations(), 1);
    {
        let windows = classifier.windows.lock();
        assert_eq!(windows[0].len(), 30);
        for (i, sample) in windows[0].iter().enumerate() {
            assert_eq!(sample.channels, vec![i as f32]);
        }
    }

    let stats = controller.stats();
    assert_eq!(stats.datagrams_received, 100);
    assert_eq!(stats.samples_accepted, 100);
    assert_eq!(stats.buffer_discarded, 70);

    controller.stop();
    handle.await.unwrap();

    assert!(controller.is_terminated());
    assert_eq!(
        controller.state(),
        SessionState::Terminated {
            outcome: Some("rest".to_string())
        }
    );
    assert_eq!(remote.post_count(), 1);
    {
        let posts = remote.posts.lock();
        assert_eq!(posts[0].result, "rest");
        assert_eq!(posts[0].patient_id, Some(7));
        assert_eq!(posts[0].doctor_id, None);
    }

    let items = db.list().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].result, "rest");
}

#[tokio::test(start_paused = true)]
async fn deadline_with_no_datagrams_terminates_without_persistence() {
    let (_dir, db) = temp_db();
    let remote = Arc::new(RecordingRemote::new());

    let controller = Arc::new(
        SessionController::new(
            loopback_config(100, 30, Duration::from_secs(30)),
            Arc::new(RecordingClassifier::new("rest")),
            Arc::clone(&remote) as Arc<dyn RemoteSessionStore>,
            Arc::clone(&db),
        )
        .unwrap(),
    );

    let handle = Arc::clone(&controller).start().await.unwrap();
    handle.await.unwrap();

    assert_eq!(
        controller.state(),
        SessionState::Terminated { outcome: None }
    );
    assert_eq!(remote.post_count(), 0);
    assert_eq!(remote.context_fetches.load(Ordering::SeqCst), 0);
    assert!(db.list().unwrap().is_empty());
}

#[tokio::test]
async fn stop_mid_window_finalizes_exactly_once() {
    let (_dir, db) = temp_db();
    let classifier = Arc::new(RecordingClassifier::with_delay(
        "active",
        Duration::from_millis(1500),
    ));
    let remote = Arc::new(RecordingRemote::new());

    // The deadline lands while the classification is still in flight, right
    // after the external stop: both shutdown paths race on purpose.
    let controller = Arc::new(
        SessionController::new(
            loopback_config(3, 3, Duration::from_secs(1)),
            Arc::clone(&classifier) as Arc<dyn WindowClassifier>,
            Arc::clone(&remote) as Arc<dyn RemoteSessionStore>,
            Arc::clone(&db),
        )
        .unwrap(),
    );

    let handle = Arc::clone(&controller).start().await.unwrap();
    let addr = controller.local_addr().unwrap();

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for i in 0..3u32 {
        let datagram = osc_datagram("/muse/eeg", &[i as f32]);
        sender.send_to(&datagram, addr).await.unwrap();
    }

    wait_for(
        || classifier.invocations() == 1,
        Duration::from_secs(5),
        "classification to start",
    )
    .await;

    controller.stop();
    controller.stop(); // idempotent
    handle.await.unwrap();

    // The in-flight window settled before finalization.
    assert_eq!(controller.stats().windows_classified, 1);
    assert_eq!(
        controller.state(),
        SessionState::Terminated {
            outcome: Some("active".to_string())
        }
    );
    assert_eq!(remote.post_count(), 1);
    assert_eq!(db.list().unwrap().len(), 1);
}

#[tokio::test]
async fn persistence_failure_still_reaches_terminated() {
    let (_dir, db) = temp_db();
    let remote = Arc::new(RecordingRemote::failing());

    let controller = Arc::new(
        SessionController::new(
            loopback_config(2, 2, Duration::from_secs(60)),
            Arc::new(RecordingClassifier::new("rest")),
            Arc::clone(&remote) as Arc<dyn RemoteSessionStore>,
            Arc::clone(&db),
        )
        .unwrap(),
    );

    let handle = Arc::clone(&controller).start().await.unwrap();
    let addr = controller.local_addr().unwrap();

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for i in 0..2u32 {
        let datagram = osc_datagram("/muse/eeg", &[i as f32]);
        sender.send_to(&datagram, addr).await.unwrap();
    }

    wait_for(
        || controller.stats().windows_classified == 1,
        Duration::from_secs(5),
        "one classified window",
    )
    .await;

    controller.stop();
    handle.await.unwrap();

    // The remote rejected the record, but the session still terminated with
    // its outcome and the local row was written.
    assert_eq!(remote.post_count(), 1);
    assert_eq!(
        controller.state(),
        SessionState::Terminated {
            outcome: Some("rest".to_string())
        }
    );
    assert_eq!(db.list().unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_datagrams_are_dropped_not_fatal() {
    let (_dir, db) = temp_db();
    let classifier = Arc::new(RecordingClassifier::new("rest"));

    let controller = Arc::new(
        SessionController::new(
            loopback_config(100, 30, Duration::from_secs(60)),
            Arc::clone(&classifier) as Arc<dyn WindowClassifier>,
            Arc::new(RecordingRemote::new()),
            Arc::clone(&db),
        )
        .unwrap(),
    );

    let handle = Arc::clone(&controller).start().await.unwrap();
    let addr = controller.local_addr().unwrap();

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    // Not an OSC message at all.
    sender.send_to(b"garbage", addr).await.unwrap();
    // Valid OSC but addressed elsewhere.
    sender
        .send_to(&osc_datagram("/muse/gyro", &[1.0]), addr)
        .await
        .unwrap();
    // Valid OSC for the mapped address; still ingested afterwards.
    sender
        .send_to(&osc_datagram("/muse/eeg", &[1.0]), addr)
        .await
        .unwrap();

    wait_for(
        || controller.stats().samples_accepted == 1,
        Duration::from_secs(5),
        "the valid sample to be accepted",
    )
    .await;

    let stats = controller.stats();
    assert_eq!(stats.datagrams_received, 3);
    assert_eq!(stats.malformed_dropped, 1);
    assert_eq!(stats.samples_accepted, 1);

    controller.stop();
    handle.await.unwrap();
}

#[tokio::test]
async fn manager_allows_one_session_at_a_time() {
    let (_dir, db) = temp_db();
    let manager = SessionManager::new(
        loopback_config(100, 30, Duration::from_millis(200)),
        Arc::new(RecordingClassifier::new("rest")),
        Arc::new(RecordingRemote::new()),
        db,
    );

    manager.start_session().await.unwrap();
    assert!(matches!(
        manager.start_session().await,
        Err(SessionError::AlreadyRunning)
    ));

    // The deadline terminates the first session on its own; a new session
    // can then be started.
    wait_for_async(
        || async {
            matches!(
                manager.current_session().await,
                Some((_, SessionState::Terminated { .. }, _))
            )
        },
        Duration::from_secs(5),
        "first session to terminate",
    )
    .await;

    let second = manager.start_session().await.unwrap();
    manager.stop_session().await.unwrap();

    wait_for_async(
        || async {
            matches!(
                manager.current_session().await,
                Some((ref id, SessionState::Terminated { .. }, _)) if *id == second
            )
        },
        Duration::from_secs(5),
        "second session to terminate",
    )
    .await;

    assert!(matches!(
        manager.stop_session().await,
        Err(SessionError::NotRunning)
    ));
}

async fn wait_for_async<F, Fut>(mut condition: F, timeout: Duration, what: &str)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
