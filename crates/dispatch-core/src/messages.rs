//! Message types used by the dispatch core.
//!
//! These are **transport-agnostic** logical messages:
//! - [`Request`]: what a connection submits.
//! - [`OutputMessage`]: what is written back to a connection, either a
//!   correlated [`Response`] or a chat broadcast.
//!
//! Note: the JSON encoding lives in the `dispatch-protocol` crate;
//! this module is purely logical.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::action::{Action, Lane};

/// Identifier for a live connection.
///
/// Opaque; unique over the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

/// Client-chosen correlation id.
///
/// Never interpreted, only echoed back. `Null` when the client sent none.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestId(pub Value);

impl RequestId {
    pub fn none() -> Self {
        RequestId(Value::Null)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId(Value::String(id.to_string()))
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other),
        }
    }
}

/// One inbound request envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub request_id: RequestId,
    pub body: RequestBody,
}

impl Request {
    pub fn new(request_id: impl Into<RequestId>, body: RequestBody) -> Self {
        Request {
            request_id: request_id.into(),
            body,
        }
    }

    /// Wire name of the action, echoed in the response.
    pub fn action_name(&self) -> &str {
        self.body.action_name()
    }

    pub fn lane(&self) -> Lane {
        self.body.lane()
    }
}

/// Action-specific parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Heartbeat,
    GenerateCaption(MediaPrompt),
    GenerateThumbnail(MediaPrompt),
    Search(SearchQuery),
    GenerateVideo(VideoRequest),
    JoinChat(ChatTarget),
    ChatMessage(ChatPost),
    LeaveChat(ChatTarget),
    /// Unrecognised action, carrying whatever name the client sent.
    Unknown(String),
}

impl RequestBody {
    pub fn action(&self) -> Option<Action> {
        Some(match self {
            RequestBody::Heartbeat => Action::Heartbeat,
            RequestBody::GenerateCaption(_) => Action::GenerateCaption,
            RequestBody::GenerateThumbnail(_) => Action::GenerateThumbnail,
            RequestBody::Search(_) => Action::Search,
            RequestBody::GenerateVideo(_) => Action::GenerateVideo,
            RequestBody::JoinChat(_) => Action::JoinChat,
            RequestBody::ChatMessage(_) => Action::ChatMessage,
            RequestBody::LeaveChat(_) => Action::LeaveChat,
            RequestBody::Unknown(_) => return None,
        })
    }

    pub fn action_name(&self) -> &str {
        match self {
            RequestBody::Unknown(name) => name.as_str(),
            known => known.action().map(Action::as_str).unwrap_or_default(),
        }
    }

    /// Unknown actions are answered inline.
    pub fn lane(&self) -> Lane {
        self.action().map(Action::lane).unwrap_or(Lane::Inline)
    }
}

/// Title/description pair for caption and thumbnail generation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaPrompt {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchQuery {
    /// Raw query; trimmed and checked for emptiness by the search lane.
    pub query: String,
    pub search_count: u32,
    pub attempt_count: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VideoRequest {
    pub title: String,
    pub description: String,
    pub prompt_prefix: String,
    pub options: Map<String, Value>,
}

impl VideoRequest {
    /// Content id the clip belongs to: `options.video_id` when present.
    pub fn video_id(&self) -> Option<&str> {
        self.options.get("video_id").and_then(Value::as_str)
    }
}

/// Chat room a `join_chat` / `leave_chat` targets.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatTarget {
    pub topic_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatPost {
    pub topic_id: Option<String>,
    pub username: Option<String>,
    pub content: String,
}

/// A stored chat message, as replayed on join and broadcast on post.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "videoId")]
    pub topic_id: String,
    pub username: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        topic_id: impl Into<String>,
        username: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        ChatMessage {
            topic_id: topic_id.into(),
            username: username.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Success payload of a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Nothing beyond `success: true` (heartbeat, leave_chat).
    Ack,
    Caption(String),
    Thumbnail(String),
    SearchResult(Value),
    Video(String),
    /// Replayed history for `join_chat`.
    History(Vec<ChatMessage>),
    /// The stored/broadcast message for `chat_message`.
    Message(ChatMessage),
}

/// Correlated answer to exactly one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub action: String,
    pub request_id: RequestId,
    pub outcome: Result<Payload, String>,
}

impl Response {
    pub fn success(request: &Request, payload: Payload) -> Self {
        Response {
            action: request.action_name().to_string(),
            request_id: request.request_id.clone(),
            outcome: Ok(payload),
        }
    }

    pub fn failure(
        action: impl Into<String>,
        request_id: RequestId,
        error: impl Into<String>,
    ) -> Self {
        Response {
            action: action.into(),
            request_id,
            outcome: Err(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error(&self) -> Option<&str> {
        self.outcome.as_ref().err().map(String::as_str)
    }
}

/// Anything written back to a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputMessage {
    Response(Response),
    /// Chat message posted by another member of a joined room.
    Broadcast(ChatMessage),
}

impl OutputMessage {
    pub fn as_response(&self) -> Option<&Response> {
        match self {
            OutputMessage::Response(r) => Some(r),
            OutputMessage::Broadcast(_) => None,
        }
    }
}

impl From<Response> for OutputMessage {
    fn from(response: Response) -> Self {
        OutputMessage::Response(response)
    }
}
