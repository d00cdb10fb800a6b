//! Session data model: lifecycle states, transcript messages, query params.
//!
//! A [`Session`] is one query lifecycle — from submission to a terminal
//! state. Its transcript is append-only and chronologically ordered; its
//! server-assigned id, once set, never changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ParamsError;

/// Smallest accepted post limit.
pub const MIN_POST_LIMIT: u8 = 1;
/// Largest accepted post limit.
pub const MAX_POST_LIMIT: u8 = 25;

// ─────────────────────────────────────────────────────────────────────────────
// States
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle states of a query session.
///
/// Monotonically advancing: `Idle → Connecting → AwaitingAssignment →
/// Streaming → {Completed | Failed}`, with `Closed` reachable from any
/// non-terminal state via user cancellation or a clean server close.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No submission in flight.
    Idle,
    /// Connection being established.
    Connecting,
    /// Query sent; waiting for the server to assign a session id.
    AwaitingAssignment,
    /// Server-known session receiving live events.
    Streaming,
    /// Terminal: result received.
    Completed,
    /// Terminal: server or transport failure.
    Failed,
    /// Terminal: closed without failure (user cancel or clean server close).
    Closed,
}

impl SessionState {
    /// Whether no further events may mutate the session.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Closed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transcript
// ─────────────────────────────────────────────────────────────────────────────

/// Who produced a transcript message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Client-submitted question.
    User,
    /// Server-produced analysis content.
    Assistant,
    /// Status/progress/error narration.
    System,
}

/// One unit of the transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message role.
    pub role: Role,
    /// Text payload. Structured assistant content is serialized to text at
    /// message-creation time, never later.
    pub content: String,
    /// Reference URLs, present only on assistant messages that cite sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

impl Message {
    /// A client-submitted question.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: None,
        }
    }

    /// Server-produced analysis content with optional cited sources.
    pub fn assistant(content: impl Into<String>, sources: Option<Vec<String>>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources,
        }
    }

    /// Status/progress/error narration.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            sources: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Query params
// ─────────────────────────────────────────────────────────────────────────────

/// Post sort order accepted by the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Reddit "hot" ranking (backend default).
    #[default]
    Hot,
    /// Newest first.
    New,
    /// Highest scored.
    Top,
    /// Search relevance.
    Relevance,
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hot" => Ok(Self::Hot),
            "new" => Ok(Self::New),
            "top" => Ok(Self::Top),
            "relevance" => Ok(Self::Relevance),
            other => Err(format!("unknown sort order '{other}'")),
        }
    }
}

/// Optional re-run interval.
///
/// Mirrors the backend's legacy `repeatHours`/`repeatMinutes` fields; the
/// server schedules nothing when both are zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatInterval {
    /// Whole hours between runs.
    pub hours: u32,
    /// Additional minutes between runs.
    pub minutes: u32,
}

/// Parameters of one query submission.
///
/// Immutable for the life of the session that owns them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    /// Subreddit to search (without the `r/` prefix).
    pub subreddit: String,
    /// Search keyword.
    pub keyword: String,
    /// The question to analyze.
    pub question: String,
    /// Number of posts to fetch, in `1..=25`.
    pub limit: u8,
    /// Post sort order.
    #[serde(default)]
    pub sort_order: SortOrder,
    /// Optional re-run interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<RepeatInterval>,
}

impl QueryParams {
    /// Validate before submission.
    ///
    /// Fails fast — the controller opens no connection and mutates no
    /// transcript when this returns an error.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if !(MIN_POST_LIMIT..=MAX_POST_LIMIT).contains(&self.limit) {
            return Err(ParamsError::LimitOutOfRange {
                min: MIN_POST_LIMIT,
                max: MAX_POST_LIMIT,
                got: self.limit,
            });
        }
        for (field, value) in [
            ("subreddit", &self.subreddit),
            ("keyword", &self.keyword),
            ("question", &self.question),
        ] {
            if value.trim().is_empty() {
                return Err(ParamsError::EmptyField { field });
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Correlation key for a session.
///
/// A session starts with a client-generated [`Local`](SessionKey::Local) key
/// and is promoted to [`Assigned`](SessionKey::Assigned) when the server
/// binds its own id mid-stream. The assigned id is immutable once set and is
/// the sole merge key between the live stream and the persisted history list.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionKey {
    /// Client-generated placeholder, used until the server assigns an id.
    Local(Uuid),
    /// Server-assigned id.
    Assigned(String),
}

impl SessionKey {
    /// Fresh client-side placeholder key.
    #[must_use]
    pub fn local() -> Self {
        Self::Local(Uuid::new_v4())
    }

    /// The server-assigned id, if promotion has happened.
    #[must_use]
    pub fn assigned_id(&self) -> Option<&str> {
        match self {
            Self::Assigned(id) => Some(id),
            Self::Local(_) => None,
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(uuid) => write!(f, "local:{uuid}"),
            Self::Assigned(id) => f.write_str(id),
        }
    }
}

/// One query lifecycle: params, transcript, and state machine position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Correlation key (local until the server assigns an id).
    pub key: SessionKey,
    /// The query parameters, immutable for the life of the session.
    pub params: QueryParams,
    /// Ordered, append-only transcript.
    transcript: Vec<Message>,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Set once, at session creation.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a pre-assignment session the instant a query is submitted.
    #[must_use]
    pub fn new(params: QueryParams) -> Self {
        Self {
            key: SessionKey::local(),
            params,
            transcript: Vec::new(),
            state: SessionState::Idle,
            created_at: Utc::now(),
        }
    }

    /// Listing title, derived from the originating question.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.params.question
    }

    /// Append a message. The transcript is never reordered or mutated in
    /// place; this is its only mutation path.
    pub fn push(&mut self, message: Message) {
        self.transcript.push(message);
    }

    /// The ordered transcript.
    #[must_use]
    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// Bind the server-assigned id. No-op if already assigned — the id is
    /// immutable once set.
    pub fn assign(&mut self, id: impl Into<String>) {
        if matches!(self.key, SessionKey::Local(_)) {
            self.key = SessionKey::Assigned(id.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

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

    #[test]
    fn valid_params_pass() {
        assert!(params().validate().is_ok());
    }

    #[test]
    fn limit_bounds_are_inclusive() {
        for limit in [1, 25] {
            let p = QueryParams { limit, ..params() };
            assert!(p.validate().is_ok(), "limit {limit} should be accepted");
        }
        for limit in [0, 26] {
            let p = QueryParams { limit, ..params() };
            assert_matches!(
                p.validate(),
                Err(ParamsError::LimitOutOfRange { got, .. }) if got == limit
            );
        }
    }

    #[test]
    fn blank_fields_are_rejected() {
        let p = QueryParams {
            keyword: "  ".into(),
            ..params()
        };
        assert_matches!(
            p.validate(),
            Err(ParamsError::EmptyField { field: "keyword" })
        );
    }

    #[test]
    fn assignment_is_immutable() {
        let mut session = Session::new(params());
        session.assign("abc");
        session.assign("other");
        assert_eq!(session.key.assigned_id(), Some("abc"));
    }

    #[test]
    fn terminal_states() {
        assert!(!SessionState::Idle.is_terminal());
        assert!(!SessionState::AwaitingAssignment.is_terminal());
        assert!(!SessionState::Streaming.is_terminal());
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(SessionState::Closed.is_terminal());
    }

    #[test]
    fn session_title_is_the_question() {
        let session = Session::new(params());
        assert_eq!(session.title(), "How to cache?");
    }
}
