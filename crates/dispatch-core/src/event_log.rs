//! Per-content bounded history of generation and chat events.
//!
//! Used as context when generating the next clip of a stream. Logs are
//! created on first append and kept for the life of the process.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// Maximum events kept per content id, oldest evicted first.
pub const EVENT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    NewStreamClip { caption: String },
    NewChatMessage { username: String, data: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub time: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Default)]
pub struct EventLog {
    logs: RwLock<HashMap<String, VecDeque<Event>>>,
}

impl EventLog {
    pub fn new() -> Self {
        EventLog::default()
    }

    /// Timestamp `kind` now and append it to `content_id`'s log.
    pub fn append(&self, content_id: &str, kind: EventKind) {
        let event = Event {
            time: Utc::now(),
            kind,
        };
        let mut logs = self.logs.write();
        let log = logs.entry(content_id.to_string()).or_default();
        log.push_back(event);
        while log.len() > EVENT_HISTORY_LIMIT {
            log.pop_front();
        }
    }

    /// Current history in insertion order.
    pub fn history(&self, content_id: &str) -> Vec<Event> {
        self.logs
            .read()
            .get(content_id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, content_id: &str) -> usize {
        self.logs.read().get(content_id).map_or(0, VecDeque::len)
    }

    /// One JSON object per line, for prompt building.
    pub fn render_context(&self, content_id: &str) -> String {
        self.history(content_id)
            .iter()
            .filter_map(|event| serde_json::to_string(event).ok())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(n: usize) -> EventKind {
        EventKind::NewStreamClip {
            caption: format!("clip {}", n),
        }
    }

    #[test]
    fn evicts_oldest_past_limit() {
        let log = EventLog::new();
        for n in 0..EVENT_HISTORY_LIMIT + 7 {
            log.append("v1", clip(n));
        }

        let history = log.history("v1");
        assert_eq!(history.len(), EVENT_HISTORY_LIMIT);
        assert_eq!(history[0].kind, clip(7));
        assert_eq!(history[EVENT_HISTORY_LIMIT - 1].kind, clip(EVENT_HISTORY_LIMIT + 6));
    }

    #[test]
    fn logs_are_independent() {
        let log = EventLog::new();
        log.append("a", clip(1));
        log.append("b", clip(2));
        log.append("b", clip(3));

        assert_eq!(log.len("a"), 1);
        assert_eq!(log.len("b"), 2);
        assert_eq!(log.len("missing"), 0);
        assert!(log.history("missing").is_empty());
    }

    #[test]
    fn renders_json_lines() {
        let log = EventLog::new();
        log.append("v", clip(1));
        log.append(
            "v",
            EventKind::NewChatMessage {
                username: "MonkeyLover89".into(),
                data: "more squirrels plz".into(),
            },
        );

        let rendered = log.render_context("v");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "new_stream_clip");
        assert_eq!(first["caption"], "clip 1");
        assert!(first["time"].is_string());

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["event"], "new_chat_message");
        assert_eq!(second["username"], "MonkeyLover89");
    }
}
