//! The [`SessionController`]: one in-flight query session at a time.
//!
//! The controller is created once and reused — each [`submit`] call starts an
//! independent session lifecycle, closing whatever connection the previous
//! one still held before opening a fresh one. All mutation happens on
//! delivery of a discrete [`TransportEvent`]; one event is fully processed
//! (transcript and state included) before the next is consumed.
//!
//! Completion contract: arrival of a `result` event is authoritative. The
//! backend's terminal status text only sets a pending-completion hint, and a
//! clean close with the hint set but no result is logged as a protocol
//! conflict.
//!
//! [`submit`]: SessionController::submit

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use threadlens_core::errors::{ParamsError, TransportError};
use threadlens_core::events::{COMPLETION_STATUS, QueryFrame, ServerEvent, parse_frame};
use threadlens_core::session::{Message, QueryParams, Session, SessionKey, SessionState};
use threadlens_history::HistoryStore;

use crate::transport::{CloseClass, CloseInfo, Connection, Connector, TransportEvent};

/// Submission failures surfaced to the caller.
///
/// Either way the process keeps running; a fresh user-initiated submission
/// is the recovery path.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Params rejected before any connection was attempted.
    #[error(transparent)]
    Params(#[from] ParamsError),
    /// Connection establishment or send failure. The session is already
    /// marked Failed with a diagnostic transcript entry when this returns.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Feature configuration for a controller.
#[derive(Debug)]
pub struct ControllerConfig {
    /// Whether per-comment progress items are narrated into the transcript.
    pub emit_progress: bool,
    /// Optional live observer: every transcript append is also sent here.
    pub message_tap: Option<mpsc::UnboundedSender<Message>>,
}

impl Default for ControllerConfig {
    /// Default feature set: progress narration on, no tap.
    fn default() -> Self {
        Self {
            emit_progress: true,
            message_tap: None,
        }
    }
}

struct ActiveRun {
    session: Session,
    connection: Option<Box<dyn Connection>>,
    pending_completion: bool,
    saw_result: bool,
}

/// Drives the lifecycle of one in-flight query session.
pub struct SessionController<C: Connector> {
    connector: C,
    history: Arc<HistoryStore>,
    config: ControllerConfig,
    active: Option<ActiveRun>,
}

impl<C: Connector> SessionController<C> {
    /// Create a controller. `history` receives a mirror of every transcript
    /// append.
    pub fn new(connector: C, history: Arc<HistoryStore>, config: ControllerConfig) -> Self {
        Self {
            connector,
            history,
            config,
            active: None,
        }
    }

    /// Current state, `Idle` when nothing was ever submitted.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.active
            .as_ref()
            .map_or(SessionState::Idle, |a| a.session.state)
    }

    /// The in-flight (or last finished) session.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.active.as_ref().map(|a| &a.session)
    }

    /// The current transcript.
    #[must_use]
    pub fn transcript(&self) -> &[Message] {
        self.active
            .as_ref()
            .map_or(&[][..], |a| a.session.transcript())
    }

    /// Submit a query: validate, close any prior connection, open a fresh
    /// one, and send the outbound frame.
    ///
    /// Validation failure opens no connection and mutates no transcript.
    /// Connection failure surfaces one diagnostic transcript message, marks
    /// the session Failed, and returns the error.
    pub async fn submit(&mut self, params: QueryParams) -> Result<(), ClientError> {
        params.validate()?;

        // Only one live connection per controller: close the old one before
        // opening a new one, so two streams can never write to one surface.
        self.cancel().await;

        let session = Session::new(params);
        info!(session = %session.key, question = %session.params.question, "submitting query");
        self.history.begin_pending(&session);
        self.active = Some(ActiveRun {
            session,
            connection: None,
            pending_completion: false,
            saw_result: false,
        });
        self.set_state(SessionState::Connecting);

        match self.open_and_send().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.push_message(Message::system(format!("Error: {e}")));
                self.set_state(SessionState::Failed);
                Err(e.into())
            }
        }
    }

    async fn open_and_send(&mut self) -> Result<(), TransportError> {
        let frame = {
            let Some(active) = self.active.as_ref() else {
                return Ok(());
            };
            QueryFrame::new_analysis(&active.session.params)
                .to_json()
                .map_err(|e| TransportError::Send(format!("failed to encode query frame: {e}")))?
        };

        let mut connection = self.connector.connect().await?;
        self.push_message(Message::system("Connected to server"));
        connection.send(&frame).await?;
        self.set_state(SessionState::AwaitingAssignment);
        if let Some(active) = self.active.as_mut() {
            active.connection = Some(connection);
        }
        Ok(())
    }

    /// Consume transport events until the session reaches a terminal state,
    /// then close the connection.
    pub async fn run(&mut self) -> SessionState {
        while !self.state().is_terminal() {
            let event = match self.active.as_mut().and_then(|a| a.connection.as_mut()) {
                Some(connection) => connection.next_event().await,
                None => break,
            };
            // Stream exhaustion without a close frame is an abnormal drop.
            let event = event.unwrap_or_else(|| TransportEvent::Closed(CloseInfo::default()));
            self.handle_transport_event(event);
        }
        self.drop_connection().await;
        self.state()
    }

    /// Cancel the in-flight session: close the transport (exactly once) and
    /// mark the session Closed without marking it Failed.
    ///
    /// Idempotent — repeated calls are no-ops.
    pub async fn cancel(&mut self) {
        self.drop_connection().await;
        let cancellable = self
            .active
            .as_ref()
            .is_some_and(|a| !a.session.state.is_terminal());
        if cancellable {
            self.set_state(SessionState::Closed);
        }
    }

    async fn drop_connection(&mut self) {
        if let Some(active) = self.active.as_mut() {
            if let Some(mut connection) = active.connection.take() {
                if let Err(e) = connection.close().await {
                    debug!(error = %e, "transport close failed");
                }
            }
        }
    }

    /// Process one transport notification. The whole effect (parsing,
    /// transcript appends, state advance) lands before the caller can feed
    /// the next event.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Frame(raw) => match parse_frame(&raw) {
                Ok(events) => {
                    if events.is_empty() {
                        debug!(frame = %raw, "frame carried no recognized signal");
                    }
                    for event in events {
                        self.apply_event(event);
                    }
                }
                // A single bad frame must not abort a healthy session.
                Err(e) => warn!(error = %e, "dropping malformed frame"),
            },
            TransportEvent::Closed(info) => self.handle_closed(&info),
            TransportEvent::Failed(message) => {
                if !self.state().is_terminal() {
                    self.push_message(Message::system(format!("Connection error: {message}")));
                    self.set_state(SessionState::Failed);
                }
            }
        }
    }

    fn apply_event(&mut self, event: ServerEvent) {
        if self.state().is_terminal() {
            // E.g. a late `results` frame after a server error: the session
            // is finalized, nothing may mutate it.
            debug!(tag = event.tag(), "event after terminal state, ignoring");
            return;
        }

        match event {
            ServerEvent::Assigned { chat_id } => self.apply_assignment(&chat_id),
            ServerEvent::Status { text } => {
                let completion_hint = text == COMPLETION_STATUS;
                self.push_message(Message::system(text));
                if completion_hint {
                    // Hint only: `result` arrival is the authoritative
                    // completion signal.
                    if let Some(active) = self.active.as_mut() {
                        active.pending_completion = true;
                    }
                }
            }
            ServerEvent::Progress(item) => {
                if self.config.emit_progress {
                    self.push_message(Message::system(item.describe()));
                }
            }
            ServerEvent::Result(result) => {
                let message = Message::assistant(result.analysis_text(), result.post_urls);
                self.push_message(message);
                if let Some(active) = self.active.as_mut() {
                    active.saw_result = true;
                }
                self.set_state(SessionState::Completed);
            }
            ServerEvent::Error { message } => {
                self.push_message(Message::system(format!("Error: {message}")));
                self.set_state(SessionState::Failed);
            }
        }
    }

    fn apply_assignment(&mut self, chat_id: &str) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        match &active.session.key {
            SessionKey::Local(_) => {
                let local = active.session.key.clone();
                active.session.assign(chat_id);
                self.history.confirm_assignment(&local, chat_id);
                info!(%chat_id, "session id assigned");
                self.set_state(SessionState::Streaming);
            }
            SessionKey::Assigned(existing) => {
                // The id is immutable once bound.
                warn!(%existing, %chat_id, "duplicate assignment ignored");
            }
        }
    }

    fn handle_closed(&mut self, info: &CloseInfo) {
        if self.state().is_terminal() {
            return;
        }
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.connection = None;

        match info.class() {
            CloseClass::Normal => {
                if active.pending_completion && !active.saw_result {
                    warn!(
                        session = %active.session.key,
                        "terminal status received but no results before close"
                    );
                }
                self.set_state(SessionState::Closed);
            }
            CloseClass::AuthRejected => {
                self.push_message(Message::system("Authorization rejected by server"));
                self.set_state(SessionState::Failed);
            }
            CloseClass::Abnormal => {
                self.push_message(Message::system("Connection closed prematurely"));
                self.set_state(SessionState::Failed);
            }
        }
    }

    fn push_message(&mut self, message: Message) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.session.push(message.clone());
        self.history.record_active(&active.session.key, message.clone());
        if let Some(tap) = &self.config.message_tap {
            let _ = tap.send(message);
        }
    }

    fn set_state(&mut self, to: SessionState) {
        if let Some(active) = self.active.as_mut() {
            let from = active.session.state;
            if from != to {
                debug!(?from, ?to, session = %active.session.key, "state transition");
                active.session.state = to;
            }
        }
    }
}
