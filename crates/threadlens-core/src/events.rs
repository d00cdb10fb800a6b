//! Wire protocol: inbound frame parsing and outbound query frames.
//!
//! The backend multiplexes several semantic signals onto one JSON object —
//! presence of a field determines the signal. A single frame may legitimately
//! carry more than one signal (e.g. a status string alongside a terminal
//! result), so [`parse_frame`] routes *every* signal present as its own
//! [`ServerEvent`], in a fixed order, rather than stopping at the first match.
//!
//! Malformed frames return [`ProtocolError`]; callers log the diagnostic and
//! keep consuming the stream. A well-formed frame with no recognized field
//! parses to an empty event list.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;
use crate::session::QueryParams;

/// Status text the backend emits when a query finishes.
///
/// Treated as a completion *hint* only — arrival of a `results` field is the
/// authoritative completion signal. A session that sees this status but no
/// result before closure is flagged as a protocol conflict.
pub const COMPLETION_STATUS: &str = "Query completed";

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// Reference to the post a progress comment belongs to.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PostRef {
    /// Post id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Post title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Post author.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// One fetched comment, streamed as it is processed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentRef {
    /// Comment author.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Comment body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Comment score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    /// Unix timestamp of the comment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_utc: Option<f64>,
}

/// A fine-grained progress item: one comment attributed to its post.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressItem {
    /// The post the comment belongs to, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<PostRef>,
    /// The comment itself.
    pub comment: CommentRef,
}

impl ProgressItem {
    /// Render the item as transcript narration.
    #[must_use]
    pub fn describe(&self) -> String {
        let title = self
            .post
            .as_ref()
            .and_then(|p| p.title.as_deref())
            .unwrap_or("a post");
        let author = self.comment.author.as_deref().unwrap_or("Someone");
        let body = self.comment.body.as_deref().unwrap_or("said something.");
        format!("💬 Comment from u/{author} on \"{title}\":\n\"{body}\"")
    }
}

/// The terminal analysis payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// The question that was analyzed.
    pub question: String,
    /// Subreddit searched.
    pub subreddit: String,
    /// Search keyword.
    pub keyword: String,
    /// Number of posts that made it into the analysis.
    pub num_posts_analyzed: u32,
    /// Total comments considered.
    pub total_comments: u32,
    /// The analysis itself. Usually a string; older backends occasionally
    /// emit structured content, so this stays opaque until rendered.
    pub analysis: Value,
    /// URLs of the originating posts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_urls: Option<Vec<String>>,
}

impl AnalysisResult {
    /// Serialize the analysis to text. Called exactly once, at
    /// message-creation time.
    #[must_use]
    pub fn analysis_text(&self) -> String {
        match &self.analysis {
            Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        }
    }
}

/// Raw inbound frame. All fields optional; presence determines the event
/// tag set produced by [`parse_frame`].
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ServerFrame {
    /// Server-assigned session id.
    pub chat_id: Option<String>,
    /// Textual status update.
    pub status: Option<String>,
    /// Frame discriminator for progress items (`"comment"`).
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Post reference accompanying a progress comment.
    pub post: Option<PostRef>,
    /// Progress comment.
    pub comment: Option<CommentRef>,
    /// Terminal analysis payload.
    pub results: Option<AnalysisResult>,
    /// Server-reported application error.
    pub error: Option<String>,
}

/// One semantic signal routed out of an inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    /// The server bound its session id to this submission.
    Assigned {
        /// Server-assigned session id.
        chat_id: String,
    },
    /// Textual status update.
    Status {
        /// Status text.
        text: String,
    },
    /// Fine-grained progress item.
    Progress(ProgressItem),
    /// Terminal result payload.
    Result(AnalysisResult),
    /// Server-reported application error. Terminal for the session.
    Error {
        /// Error text, surfaced verbatim.
        message: String,
    },
}

impl ServerEvent {
    /// Tag name for logging.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Assigned { .. } => "assigned",
            Self::Status { .. } => "status",
            Self::Progress(_) => "progress",
            Self::Result(_) => "result",
            Self::Error { .. } => "error",
        }
    }
}

/// Parse a raw inbound frame into its semantic signals.
///
/// Signals are routed in a fixed order — assigned, status, progress, result,
/// error — so that an id assignment riding on the same frame as content is
/// applied before the content, and an error is always applied last.
///
/// Returns an empty vector for well-formed frames with no recognized field.
pub fn parse_frame(raw: &str) -> Result<Vec<ServerEvent>, ProtocolError> {
    let frame: ServerFrame = serde_json::from_str(raw)?;
    let mut events = Vec::new();

    if let Some(chat_id) = frame.chat_id {
        events.push(ServerEvent::Assigned { chat_id });
    }
    if let Some(text) = frame.status {
        events.push(ServerEvent::Status { text });
    }
    if frame.kind.as_deref() == Some("comment") {
        if let Some(comment) = frame.comment {
            events.push(ServerEvent::Progress(ProgressItem {
                post: frame.post,
                comment,
            }));
        }
    }
    if let Some(results) = frame.results {
        events.push(ServerEvent::Result(results));
    }
    if let Some(message) = frame.error {
        events.push(ServerEvent::Error { message });
    }

    Ok(events)
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// Payload of the outbound submission frame.
///
/// Field names match the backend exactly, including the two legacy camelCase
/// repeat fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryData {
    /// Subreddit to search.
    pub subreddit: String,
    /// Search keyword.
    pub keyword: String,
    /// The question to analyze.
    pub question: String,
    /// Number of posts to fetch.
    pub limit: u8,
    /// Post sort order.
    pub sort_order: crate::session::SortOrder,
    /// Hours between re-runs, omitted when no repeat is requested.
    #[serde(rename = "repeatHours", skip_serializing_if = "Option::is_none")]
    pub repeat_hours: Option<u32>,
    /// Minutes between re-runs, omitted when no repeat is requested.
    #[serde(rename = "repeatMinutes", skip_serializing_if = "Option::is_none")]
    pub repeat_minutes: Option<u32>,
}

/// Outbound submission frame: `{"type": "new_analysis", "data": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryFrame {
    /// Frame discriminator.
    #[serde(rename = "type")]
    pub kind: String,
    /// Query payload.
    pub data: QueryData,
}

impl QueryFrame {
    /// Build a `new_analysis` frame from validated params.
    #[must_use]
    pub fn new_analysis(params: &QueryParams) -> Self {
        Self {
            kind: "new_analysis".into(),
            data: QueryData {
                subreddit: params.subreddit.clone(),
                keyword: params.keyword.clone(),
                question: params.question.clone(),
                limit: params.limit,
                sort_order: params.sort_order,
                repeat_hours: params.repeat.map(|r| r.hours),
                repeat_minutes: params.repeat.map(|r| r.minutes),
            },
        }
    }

    /// Serialize for the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
