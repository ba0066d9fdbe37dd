//! JSON encoding/decoding for dispatch-core messages.
//!
//! This module converts between:
//! - WebSocket text frames (`&str` / `String`)
//! - `dispatch_core::Request` / `OutputMessage`
//!
//! Decoding is lenient in the way clients expect: missing optional
//! fields take their defaults, fields of the wrong JSON type are treated
//! as absent, and an unrecognised (or missing) `action` decodes to
//! `RequestBody::Unknown` so the core can answer it. Only frames that
//! are not a JSON object at all are protocol errors.
//!
//! ```text
//! request   {"action":"search","requestId":"r1","query":"cats","searchCount":2}
//! response  {"action":"search","requestId":"r1","success":true,"result":{...}}
//! failure   {"action":"search","requestId":"r1","success":false,"error":"No results found"}
//! broadcast {"action":"chat_message","broadcast":true,"videoId":"T","username":"..","content":"..","timestamp":".."}
//! ```

use dispatch_core::{
    Action, ChatMessage, ChatPost, ChatTarget, MediaPrompt, OutputMessage, Payload, Request,
    RequestBody, RequestId, Response, SearchQuery, VideoRequest,
};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::wire_types::*;

type Object = Map<String, Value>;

/// Errors that can arise when decoding or encoding a frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not valid JSON.
    #[error("{0}")]
    Malformed(serde_json::Error),
    /// Valid JSON, but not an object.
    #[error("expected a JSON object")]
    NotAnObject,
    /// Client sent a binary frame.
    #[error("binary frames are not supported")]
    BinaryFrame,
    /// An outbound message could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(serde_json::Error),
}

/// Decode one text frame into a request.
pub fn decode_request(frame: &str) -> Result<Request, ProtocolError> {
    let value: Value = serde_json::from_str(frame).map_err(ProtocolError::Malformed)?;
    match value {
        Value::Object(obj) => Ok(request_from_object(&obj)),
        _ => Err(ProtocolError::NotAnObject),
    }
}

/// Build a request from an already-parsed envelope.
pub fn request_from_object(obj: &Object) -> Request {
    let request_id = RequestId(obj.get(REQUEST_ID).cloned().unwrap_or(Value::Null));
    let action = str_field(obj, ACTION).unwrap_or_default();

    let body = match Action::parse(action) {
        None => RequestBody::Unknown(action.to_string()),
        Some(Action::Heartbeat) => RequestBody::Heartbeat,
        Some(Action::GenerateCaption) => RequestBody::GenerateCaption(media_prompt(obj)),
        Some(Action::GenerateThumbnail) => RequestBody::GenerateThumbnail(media_prompt(obj)),
        Some(Action::Search) => RequestBody::Search(SearchQuery {
            query: string_field(obj, QUERY),
            search_count: count_field(obj, SEARCH_COUNT),
            attempt_count: count_field(obj, ATTEMPT_COUNT),
        }),
        Some(Action::GenerateVideo) => RequestBody::GenerateVideo(VideoRequest {
            title: string_field(obj, TITLE),
            description: string_field(obj, DESCRIPTION),
            prompt_prefix: string_field(obj, VIDEO_PROMPT_PREFIX),
            options: obj
                .get(OPTIONS)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        }),
        Some(Action::JoinChat) => RequestBody::JoinChat(ChatTarget {
            topic_id: topic_id(obj),
        }),
        Some(Action::LeaveChat) => RequestBody::LeaveChat(ChatTarget {
            topic_id: topic_id(obj),
        }),
        Some(Action::ChatMessage) => RequestBody::ChatMessage(ChatPost {
            topic_id: topic_id(obj),
            username: str_field(obj, USERNAME).map(str::to_string),
            content: string_field(obj, CONTENT),
        }),
    };

    Request { request_id, body }
}

fn str_field<'a>(obj: &'a Object, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

fn string_field(obj: &Object, key: &str) -> String {
    str_field(obj, key).unwrap_or_default().to_string()
}

/// Non-negative integer field, saturating at `u32::MAX`; anything else is 0.
fn count_field(obj: &Object, key: &str) -> u32 {
    obj.get(key)
        .and_then(Value::as_u64)
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

fn media_prompt(obj: &Object) -> MediaPrompt {
    let params = obj.get(PARAMS).and_then(Value::as_object);
    let field = |key: &str| params.and_then(|p| str_field(p, key)).map(str::to_string);
    MediaPrompt {
        title: field(TITLE),
        description: field(DESCRIPTION),
    }
}

fn topic_id(obj: &Object) -> Option<String> {
    TOPIC_ID_KEYS
        .iter()
        .find_map(|key| str_field(obj, key))
        .map(str::to_string)
}

/// Encode one outbound message as a text frame.
pub fn encode_output(msg: &OutputMessage) -> Result<String, ProtocolError> {
    let value = output_to_value(msg)?;
    serde_json::to_string(&value).map_err(ProtocolError::Encode)
}

pub fn output_to_value(msg: &OutputMessage) -> Result<Value, ProtocolError> {
    let obj = match msg {
        OutputMessage::Response(response) => response_object(response)?,
        OutputMessage::Broadcast(message) => broadcast_object(message)?,
    };
    Ok(Value::Object(obj))
}

fn response_object(response: &Response) -> Result<Object, ProtocolError> {
    let mut obj = Object::new();
    obj.insert(ACTION.into(), Value::String(response.action.clone()));
    obj.insert(REQUEST_ID.into(), response.request_id.0.clone());
    obj.insert(SUCCESS.into(), Value::Bool(response.is_success()));

    match &response.outcome {
        Ok(payload) => {
            if let Some((key, value)) = payload_entry(payload)? {
                obj.insert(key.into(), value);
            }
        }
        Err(error) => {
            obj.insert(ERROR.into(), Value::String(error.clone()));
        }
    }
    Ok(obj)
}

fn payload_entry(payload: &Payload) -> Result<Option<(&'static str, Value)>, ProtocolError> {
    let entry = match payload {
        Payload::Ack => return Ok(None),
        Payload::Caption(caption) => (CAPTION, Value::String(caption.clone())),
        Payload::Thumbnail(url) => (THUMBNAIL_URL, Value::String(url.clone())),
        Payload::SearchResult(result) => (RESULT, result.clone()),
        Payload::Video(video) => (VIDEO, Value::String(video.clone())),
        Payload::History(messages) => (MESSAGES, to_value(messages)?),
        Payload::Message(message) => (MESSAGE, to_value(message)?),
    };
    Ok(Some(entry))
}

fn broadcast_object(message: &ChatMessage) -> Result<Object, ProtocolError> {
    let mut obj = Object::new();
    obj.insert(ACTION.into(), Value::String(Action::ChatMessage.as_str().into()));
    obj.insert(BROADCAST.into(), Value::Bool(true));
    match to_value(message)? {
        Value::Object(fields) => obj.extend(fields),
        _ => return Err(ProtocolError::NotAnObject),
    }
    Ok(obj)
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ProtocolError> {
    serde_json::to_value(value).map_err(ProtocolError::Encode)
}

/// Response sent for a frame that never became a request.
pub fn frame_error(err: &ProtocolError) -> OutputMessage {
    OutputMessage::Response(Response::failure(
        UNKNOWN_ACTION,
        RequestId::none(),
        format!("Error processing message: {}", err),
    ))
}
