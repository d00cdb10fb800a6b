//! End-to-end controller scenarios against a scripted transport.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use assert_matches::assert_matches;
use async_trait::async_trait;
use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::json;

use threadlens_client::{
    ClientError, CloseInfo, Connection, Connector, ControllerConfig, SessionController,
    TransportEvent,
};
use threadlens_core::errors::TransportError;
use threadlens_core::session::{
    Message, QueryParams, Role, SessionKey, SessionState, SortOrder,
};
use threadlens_history::HistoryStore;

// ─────────────────────────────────────────────────────────────────────────────
// Scripted transport
// ─────────────────────────────────────────────────────────────────────────────

struct ScriptedConnection {
    events: VecDeque<TransportEvent>,
    sent: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        self.sent.lock().push(frame.to_string());
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.pop_front()
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let _ = self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out one scripted connection per `connect` call; errors when the
/// scripts run out (used to simulate connect failure).
#[derive(Default)]
struct ScriptedConnector {
    scripts: Mutex<VecDeque<Vec<TransportEvent>>>,
    sent: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
    connects: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    fn with_script(events: Vec<TransportEvent>) -> Self {
        let connector = Self::default();
        connector.scripts.lock().push_back(events);
        connector
    }

    fn push_script(&self, events: Vec<TransportEvent>) {
        self.scripts.lock().push_back(events);
    }

    fn probe(&self) -> TransportProbe {
        TransportProbe {
            sent: Arc::clone(&self.sent),
            closes: Arc::clone(&self.closes),
            connects: Arc::clone(&self.connects),
        }
    }
}

struct TransportProbe {
    sent: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
    connects: Arc<AtomicUsize>,
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
        let _ = self.connects.fetch_add(1, Ordering::SeqCst);
        let events = self
            .scripts
            .lock()
            .pop_front()
            .ok_or_else(|| TransportError::Connect("connection refused".into()))?;
        Ok(Box::new(ScriptedConnection {
            events: events.into(),
            sent: Arc::clone(&self.sent),
            closes: Arc::clone(&self.closes),
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn params() -> QueryParams {
    QueryParams {
        subreddit: "nextjs".into(),
        keyword: "fetch".into(),
        question: "How to cache?".into(),
        limit: 10,
        sort_order: SortOrder::Hot,
        repeat: None,
    }
}

fn frame(value: serde_json::Value) -> TransportEvent {
    TransportEvent::Frame(value.to_string())
}

fn closed(code: u16) -> TransportEvent {
    TransportEvent::Closed(CloseInfo {
        code: Some(code),
        reason: None,
    })
}

fn results_frame() -> serde_json::Value {
    json!({
        "results": {
            "question": "How to cache?",
            "subreddit": "nextjs",
            "keyword": "fetch",
            "num_posts_analyzed": 5,
            "total_comments": 42,
            "analysis": "X",
            "post_urls": ["http://a"]
        }
    })
}

fn controller(
    connector: ScriptedConnector,
) -> (SessionController<ScriptedConnector>, Arc<HistoryStore>) {
    let history = Arc::new(HistoryStore::new());
    let controller =
        SessionController::new(connector, Arc::clone(&history), ControllerConfig::default());
    (controller, history)
}

fn system_count(messages: &[Message], content: &str) -> usize {
    messages
        .iter()
        .filter(|m| m.role == Role::System && m.content == content)
        .count()
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn happy_path_completes_with_full_transcript() {
    let connector = ScriptedConnector::with_script(vec![
        frame(json!({"chat_id": "abc"})),
        frame(json!({"status": "Searching posts"})),
        frame(results_frame()),
    ]);
    let probe = connector.probe();
    let (mut controller, history) = controller(connector);

    controller.submit(params()).await.unwrap();
    assert_eq!(controller.run().await, SessionState::Completed);

    let transcript = controller.transcript();
    assert_eq!(transcript.len(), 3);
    assert_eq!(transcript[0], Message::system("Connected to server"));
    assert_eq!(transcript[1], Message::system("Searching posts"));
    assert_eq!(
        transcript[2],
        Message::assistant("X", Some(vec!["http://a".into()]))
    );

    // Outbound frame went over the wire in the expected envelope.
    let sent = probe.sent.lock();
    assert_eq!(sent.len(), 1);
    let envelope: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(envelope["type"], "new_analysis");
    assert_eq!(envelope["data"]["subreddit"], "nextjs");
    assert_eq!(envelope["data"]["limit"], 10);
    assert_eq!(envelope["data"]["sort_order"], "hot");

    // History mirrors the full transcript under the server-assigned id.
    let entry = history.entry("abc").unwrap();
    assert!(!entry.pending);
    assert_eq!(entry.transcript, transcript);
    assert_eq!(history.viewed(), Some(SessionKey::Assigned("abc".into())));
}

#[tokio::test]
async fn server_error_is_terminal() {
    let connector = ScriptedConnector::with_script(vec![frame(json!({"error": "rate limited"}))]);
    let (mut controller, _history) = controller(connector);

    controller.submit(params()).await.unwrap();
    assert_eq!(controller.run().await, SessionState::Failed);

    assert_eq!(system_count(controller.transcript(), "Error: rate limited"), 1);
    assert!(controller.transcript().iter().all(|m| m.role != Role::Assistant));

    // A late results frame after the terminal state must not mutate the
    // finalized session.
    let before = controller.transcript().to_vec();
    controller.handle_transport_event(frame(results_frame()));
    assert_eq!(controller.transcript(), &before[..]);
    assert_eq!(controller.state(), SessionState::Failed);
}

#[tokio::test]
async fn abnormal_close_fails_with_one_diagnostic() {
    let connector = ScriptedConnector::with_script(vec![
        frame(json!({"chat_id": "abc"})),
        frame(json!({"status": "Searching posts"})),
        closed(1006),
    ]);
    let (mut controller, _history) = controller(connector);

    controller.submit(params()).await.unwrap();
    assert_eq!(controller.run().await, SessionState::Failed);
    assert_eq!(
        system_count(controller.transcript(), "Connection closed prematurely"),
        1
    );
}

#[tokio::test]
async fn auth_rejection_close_fails_with_auth_diagnostic() {
    let connector = ScriptedConnector::with_script(vec![closed(4001)]);
    let (mut controller, _history) = controller(connector);

    controller.submit(params()).await.unwrap();
    assert_eq!(controller.run().await, SessionState::Failed);
    assert_eq!(
        system_count(controller.transcript(), "Authorization rejected by server"),
        1
    );
    assert_eq!(
        system_count(controller.transcript(), "Connection closed prematurely"),
        0
    );
}

#[tokio::test]
async fn normal_close_without_result_is_closed_not_failed() {
    // The terminal status text is only a hint; with no result before a clean
    // close the session ends Closed and the conflict is logged, not fatal.
    let connector = ScriptedConnector::with_script(vec![
        frame(json!({"chat_id": "abc"})),
        frame(json!({"status": "Query completed"})),
        closed(1000),
    ]);
    let (mut controller, _history) = controller(connector);

    controller.submit(params()).await.unwrap();
    assert_eq!(controller.run().await, SessionState::Closed);
    assert!(controller.transcript().iter().all(|m| m.role != Role::Assistant));
    assert_eq!(
        system_count(controller.transcript(), "Connection closed prematurely"),
        0
    );
}

#[tokio::test]
async fn close_after_completion_is_a_noop() {
    let connector = ScriptedConnector::with_script(vec![frame(results_frame())]);
    let (mut controller, _history) = controller(connector);

    controller.submit(params()).await.unwrap();
    assert_eq!(controller.run().await, SessionState::Completed);

    let before = controller.transcript().to_vec();
    controller.handle_transport_event(closed(1006));
    assert_eq!(controller.state(), SessionState::Completed);
    assert_eq!(controller.transcript(), &before[..]);
}

#[tokio::test]
async fn invalid_params_fail_fast_without_connecting() {
    let connector = ScriptedConnector::with_script(vec![]);
    let probe = connector.probe();
    let (mut controller, history) = controller(connector);

    let bad = QueryParams { limit: 0, ..params() };
    let err = controller.submit(bad).await.unwrap_err();
    assert_matches!(err, ClientError::Params(_));

    assert_eq!(probe.connects.load(Ordering::SeqCst), 0);
    assert_eq!(controller.state(), SessionState::Idle);
    assert!(controller.transcript().is_empty());
    assert!(history.entries().is_empty());
}

#[tokio::test]
async fn connect_failure_marks_session_failed() {
    let connector = ScriptedConnector::default(); // no scripts: connect refuses
    let (mut controller, history) = controller(connector);

    let err = controller.submit(params()).await.unwrap_err();
    assert_matches!(err, ClientError::Transport(_));
    assert_eq!(controller.state(), SessionState::Failed);

    let transcript = controller.transcript();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].role, Role::System);
    assert!(transcript[0].content.starts_with("Error: "));

    // The diagnostic is mirrored into the pending history entry.
    let entries = history.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].transcript.len(), 1);
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let connector = ScriptedConnector::with_script(vec![]);
    let probe = connector.probe();
    let (mut controller, _history) = controller(connector);

    controller.submit(params()).await.unwrap();
    assert_eq!(controller.state(), SessionState::AwaitingAssignment);

    controller.cancel().await;
    controller.cancel().await;

    assert_eq!(probe.closes.load(Ordering::SeqCst), 1, "exactly one close effect");
    assert_eq!(controller.state(), SessionState::Closed);
}

#[tokio::test]
async fn resubmission_closes_the_prior_connection_first() {
    let connector = ScriptedConnector::with_script(vec![]);
    connector.push_script(vec![frame(results_frame())]);
    let probe = connector.probe();
    let (mut controller, _history) = controller(connector);

    controller.submit(params()).await.unwrap();
    controller.submit(params()).await.unwrap();

    assert_eq!(probe.connects.load(Ordering::SeqCst), 2);
    assert_eq!(
        probe.closes.load(Ordering::SeqCst),
        1,
        "old connection closed before the new one opened"
    );
    assert_eq!(controller.run().await, SessionState::Completed);
}

#[tokio::test]
async fn malformed_frame_does_not_break_the_stream() {
    let connector = ScriptedConnector::with_script(vec![
        frame(json!({"status": "Searching posts"})),
        TransportEvent::Frame("{not json".into()),
        frame(json!({"status": "Found 3 relevant posts"})),
        closed(1000),
    ]);
    let (mut controller, _history) = controller(connector);

    controller.submit(params()).await.unwrap();
    assert_eq!(controller.run().await, SessionState::Closed);

    let transcript = controller.transcript();
    assert_eq!(transcript[1], Message::system("Searching posts"));
    assert_eq!(transcript[2], Message::system("Found 3 relevant posts"));
}

#[tokio::test]
async fn progress_before_assignment_is_not_dropped() {
    let connector = ScriptedConnector::with_script(vec![
        frame(json!({
            "type": "comment",
            "post": {"title": "Caching in Next.js"},
            "comment": {"author": "alice", "body": "use revalidate"}
        })),
        frame(json!({"chat_id": "abc"})),
        frame(results_frame()),
    ]);
    let (mut controller, history) = controller(connector);

    controller.submit(params()).await.unwrap();
    assert_eq!(controller.run().await, SessionState::Completed);

    let transcript = controller.transcript();
    assert_eq!(
        transcript[1],
        Message::system("💬 Comment from u/alice on \"Caching in Next.js\":\n\"use revalidate\"")
    );
    // The pre-assignment message survives the promotion to the server id.
    let entry = history.entry("abc").unwrap();
    assert_eq!(entry.transcript, transcript);
}

#[tokio::test]
async fn progress_narration_can_be_disabled() {
    let connector = ScriptedConnector::with_script(vec![
        frame(json!({
            "type": "comment",
            "comment": {"author": "alice", "body": "use revalidate"}
        })),
        frame(json!({"status": "Searching posts"})),
        frame(results_frame()),
    ]);
    let history = Arc::new(HistoryStore::new());
    let mut controller = SessionController::new(
        connector,
        Arc::clone(&history),
        ControllerConfig {
            emit_progress: false,
            message_tap: None,
        },
    );

    controller.submit(params()).await.unwrap();
    assert_eq!(controller.run().await, SessionState::Completed);

    let transcript = controller.transcript();
    assert_eq!(transcript.len(), 3, "connected + status + result, no progress");
    assert_eq!(transcript[1], Message::system("Searching posts"));
}

#[tokio::test]
async fn message_tap_observes_every_append_in_order() {
    let connector = ScriptedConnector::with_script(vec![
        frame(json!({"status": "Searching posts"})),
        frame(results_frame()),
    ]);
    let (tap, mut tapped) = tokio::sync::mpsc::unbounded_channel();
    let history = Arc::new(HistoryStore::new());
    let mut controller = SessionController::new(
        connector,
        history,
        ControllerConfig {
            emit_progress: true,
            message_tap: Some(tap),
        },
    );

    controller.submit(params()).await.unwrap();
    assert_eq!(controller.run().await, SessionState::Completed);

    let mut observed = Vec::new();
    while let Ok(message) = tapped.try_recv() {
        observed.push(message);
    }
    assert_eq!(observed, controller.transcript());
}

#[tokio::test]
async fn multi_signal_frame_applies_status_then_result() {
    let mut combined = results_frame();
    combined["status"] = json!("Query completed");
    let connector = ScriptedConnector::with_script(vec![frame(combined)]);
    let (mut controller, _history) = controller(connector);

    controller.submit(params()).await.unwrap();
    assert_eq!(controller.run().await, SessionState::Completed);

    let transcript = controller.transcript();
    assert_eq!(transcript[1], Message::system("Query completed"));
    assert_eq!(transcript[2].role, Role::Assistant);
}

// ─────────────────────────────────────────────────────────────────────────────
// Append-only law
// ─────────────────────────────────────────────────────────────────────────────

fn arbitrary_event(choice: u8, text: &str) -> TransportEvent {
    match choice {
        0 => frame(json!({"status": text})),
        1 => frame(json!({"chat_id": "abc"})),
        2 => frame(json!({"type": "comment", "comment": {"author": text, "body": text}})),
        3 => frame(results_frame()),
        4 => frame(json!({"error": text})),
        5 => TransportEvent::Frame(format!("{{bad {text}")),
        6 => closed(1000),
        _ => closed(1006),
    }
}

proptest! {
    /// For any event sequence, the transcript only ever grows, and entries
    /// never change once appended.
    #[test]
    fn transcript_is_append_only(steps in proptest::collection::vec((0u8..8, "[a-z ]{0,16}"), 0..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        runtime.block_on(async move {
            let connector = ScriptedConnector::with_script(vec![]);
            let (mut controller, _history) = controller(connector);
            controller.submit(params()).await.unwrap();

            let mut previous = controller.transcript().to_vec();
            for (choice, text) in steps {
                controller.handle_transport_event(arbitrary_event(choice, &text));
                let current = controller.transcript();
                prop_assert!(current.len() >= previous.len());
                prop_assert_eq!(&current[..previous.len()], &previous[..]);
                previous = current.to_vec();
            }
            Ok(())
        })?;
    }
}
