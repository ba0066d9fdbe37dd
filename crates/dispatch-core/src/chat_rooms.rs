//! Per-topic chat rooms: bounded history plus broadcast membership.
//!
//! Rooms are created lazily on first join or post and live as long as the
//! registry. Members are held through weak senders, so a room never keeps
//! a connection's writer alive; a member whose connection is gone simply
//! fails delivery and is dropped from the room.

use std::collections::{HashMap, VecDeque};

use tokio::sync::mpsc::{UnboundedSender, WeakUnboundedSender};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::messages::{ChatMessage, ConnectionId, OutputMessage};

/// Maximum messages kept per room, oldest evicted first.
pub const HISTORY_LIMIT: usize = 100;

/// Maximum messages replayed to a joining member.
pub const REPLAY_LIMIT: usize = 50;

/// A connection's membership in a room.
#[derive(Debug, Clone)]
pub struct Member {
    id: ConnectionId,
    outbound: WeakUnboundedSender<OutputMessage>,
}

impl Member {
    pub fn new(id: ConnectionId, outbound: &UnboundedSender<OutputMessage>) -> Self {
        Member {
            id,
            outbound: outbound.downgrade(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// `false` when the connection is gone or its writer has stopped.
    fn deliver(&self, msg: OutputMessage) -> bool {
        match self.outbound.upgrade() {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }
}

#[derive(Debug, Default)]
struct Room {
    history: VecDeque<ChatMessage>,
    members: HashMap<ConnectionId, Member>,
}

impl Room {
    fn push(&mut self, message: ChatMessage) {
        self.history.push_back(message);
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
    }

    fn recent(&self, limit: usize) -> Vec<ChatMessage> {
        let skip = self.history.len().saturating_sub(limit);
        self.history.iter().skip(skip).cloned().collect()
    }
}

/// Registry of all chat rooms, shared by every session.
#[derive(Debug, Default)]
pub struct ChatRooms {
    rooms: RwLock<HashMap<String, Room>>,
}

impl ChatRooms {
    pub fn new() -> Self {
        ChatRooms::default()
    }

    /// Register `member` in `topic` and return up to [`REPLAY_LIMIT`]
    /// most recent messages, oldest first.
    pub async fn join(&self, topic: &str, member: Member) -> Vec<ChatMessage> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(topic.to_string()).or_default();
        debug!(topic, conn = member.id.0, "joined chat room");
        room.members.insert(member.id, member);
        room.recent(REPLAY_LIMIT)
    }

    /// Remove `member` from `topic`. Returns whether it was a member.
    pub async fn leave(&self, topic: &str, member: ConnectionId) -> bool {
        let mut rooms = self.rooms.write().await;
        rooms
            .get_mut(topic)
            .map(|room| room.members.remove(&member).is_some())
            .unwrap_or(false)
    }

    /// Remove `member` from every room it joined.
    pub async fn leave_all(&self, member: ConnectionId) {
        let mut rooms = self.rooms.write().await;
        for room in rooms.values_mut() {
            room.members.remove(&member);
        }
    }

    /// Append `message` to `topic`'s history, then deliver it to every
    /// current member except `sender`.
    ///
    /// Members whose delivery fails are removed; delivery to the rest
    /// continues. Returns the number of successful deliveries.
    pub async fn post(&self, topic: &str, sender: ConnectionId, message: ChatMessage) -> usize {
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(topic.to_string()).or_default();
        room.push(message.clone());

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, member) in room.members.iter() {
            if *id == sender {
                continue;
            }
            if member.deliver(OutputMessage::Broadcast(message.clone())) {
                delivered += 1;
            } else {
                dead.push(*id);
            }
        }

        for id in dead {
            warn!(topic, conn = id.0, "broadcast failed, dropping member");
            room.members.remove(&id);
        }

        delivered
    }

    /// Full stored history of `topic`, oldest first.
    pub async fn history(&self, topic: &str) -> Vec<ChatMessage> {
        let rooms = self.rooms.read().await;
        rooms
            .get(topic)
            .map(|room| room.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn is_member(&self, topic: &str, member: ConnectionId) -> bool {
        let rooms = self.rooms.read().await;
        rooms
            .get(topic)
            .is_some_and(|room| room.members.contains_key(&member))
    }

    pub async fn member_count(&self, topic: &str) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(topic).map_or(0, |room| room.members.len())
    }
}
