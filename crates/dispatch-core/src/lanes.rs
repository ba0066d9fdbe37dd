//! Handlers behind each lane.
//!
//! Validation happens here, at the top of each handler and before any
//! registry mutation or collaborator call. Because validation runs inside
//! the lane, a rejected request still gets its response in FIFO position.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use crate::chat_rooms::{ChatRooms, Member};
use crate::collaborator::{Generator, VideoJob};
use crate::endpoint_pool::EndpointPool;
use crate::error::{DispatchError, Result};
use crate::event_log::{EventKind, EventLog};
use crate::messages::{ChatMessage, MediaPrompt, Payload, Request, RequestBody, VideoRequest};
use crate::pipeline::LaneHandler;

const NO_TOPIC: &str = "No video ID provided";
const NO_QUERY: &str = "No search query provided";
const NO_MEDIA_FIELDS: &str = "Missing title or description";

fn misrouted(request: &Request) -> DispatchError {
    DispatchError::internal(format!(
        "action {} routed to the wrong lane",
        request.action_name()
    ))
}

fn require_topic(topic_id: Option<&str>) -> Result<&str> {
    match topic_id {
        Some(topic) if !topic.is_empty() => Ok(topic),
        _ => Err(DispatchError::validation(NO_TOPIC)),
    }
}

/// join_chat, chat_message, leave_chat for one connection.
pub struct ChatLane {
    rooms: Arc<ChatRooms>,
    events: Arc<EventLog>,
    member: Member,
}

impl ChatLane {
    pub fn new(rooms: Arc<ChatRooms>, events: Arc<EventLog>, member: Member) -> Self {
        ChatLane {
            rooms,
            events,
            member,
        }
    }
}

#[async_trait]
impl LaneHandler for ChatLane {
    async fn handle(&self, request: &Request) -> Result<Payload> {
        match &request.body {
            RequestBody::JoinChat(target) => {
                let topic = require_topic(target.topic_id.as_deref())?;
                let history = self.rooms.join(topic, self.member.clone()).await;
                Ok(Payload::History(history))
            }
            RequestBody::ChatMessage(post) => {
                let topic = require_topic(post.topic_id.as_deref())?;
                let username = post.username.as_deref().unwrap_or("Anonymous");

                self.events.append(
                    topic,
                    EventKind::NewChatMessage {
                        username: username.to_string(),
                        data: post.content.clone(),
                    },
                );

                let message = ChatMessage::new(topic, username, post.content.as_str());
                let delivered = self
                    .rooms
                    .post(topic, self.member.id(), message.clone())
                    .await;
                debug!(topic, delivered, "chat message broadcast");
                Ok(Payload::Message(message))
            }
            RequestBody::LeaveChat(target) => {
                let topic = require_topic(target.topic_id.as_deref())?;
                self.rooms.leave(topic, self.member.id()).await;
                Ok(Payload::Ack)
            }
            _ => Err(misrouted(request)),
        }
    }
}

/// search: one generated result per request.
pub struct SearchLane {
    generator: Arc<dyn Generator>,
}

impl SearchLane {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        SearchLane { generator }
    }
}

#[async_trait]
impl LaneHandler for SearchLane {
    async fn handle(&self, request: &Request) -> Result<Payload> {
        let RequestBody::Search(search) = &request.body else {
            return Err(misrouted(request));
        };

        let query = search.query.trim();
        if query.is_empty() {
            return Err(DispatchError::validation(NO_QUERY));
        }

        info!(
            query,
            search_count = search.search_count,
            attempt = search.attempt_count,
            "processing search"
        );
        match self
            .generator
            .search_video(query, search.search_count, search.attempt_count)
            .await?
        {
            Some(result) => Ok(Payload::SearchResult(result)),
            None => Err(DispatchError::NoResults),
        }
    }
}

/// generate_video: holds an endpoint lease for the duration of the call.
pub struct GenerationLane {
    pool: Arc<EndpointPool>,
    events: Arc<EventLog>,
    generator: Arc<dyn Generator>,
    acquire_timeout: Duration,
}

impl GenerationLane {
    pub fn new(
        pool: Arc<EndpointPool>,
        events: Arc<EventLog>,
        generator: Arc<dyn Generator>,
        acquire_timeout: Duration,
    ) -> Self {
        GenerationLane {
            pool,
            events,
            generator,
            acquire_timeout,
        }
    }
}

/// `"<prefix> - <title> - <description>"`, title and description trimmed.
pub fn clip_caption(video: &VideoRequest) -> String {
    format!(
        "{} - {} - {}",
        video.prompt_prefix,
        video.title.trim(),
        video.description.trim()
    )
}

#[async_trait]
impl LaneHandler for GenerationLane {
    async fn handle(&self, request: &Request) -> Result<Payload> {
        let RequestBody::GenerateVideo(video) = &request.body else {
            return Err(misrouted(request));
        };

        let video_id = video
            .video_id()
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let caption = clip_caption(video);

        self.events.append(
            &video_id,
            EventKind::NewStreamClip {
                caption: caption.clone(),
            },
        );

        let lease = self.pool.acquire(self.acquire_timeout).await?;
        debug!(endpoint = lease.id(), video_id = %video_id, "generating clip");

        let job = VideoJob {
            video_id,
            title: video.title.clone(),
            description: video.description.clone(),
            prompt_prefix: video.prompt_prefix.clone(),
            caption,
            options: video.options.clone(),
            endpoint_url: lease.url().to_string(),
        };
        let video_ref = self.generator.generate_video(&job).await?;
        drop(lease);

        Ok(Payload::Video(video_ref))
    }
}

/// Requests answered on the receive path: heartbeat, caption,
/// thumbnail and unrecognised actions.
pub struct InlineHandler {
    generator: Arc<dyn Generator>,
}

impl InlineHandler {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        InlineHandler { generator }
    }
}

fn require_media(prompt: &MediaPrompt) -> Result<(&str, &str)> {
    match (prompt.title.as_deref(), prompt.description.as_deref()) {
        (Some(title), Some(description)) if !title.is_empty() && !description.is_empty() => {
            Ok((title, description))
        }
        _ => Err(DispatchError::validation(NO_MEDIA_FIELDS)),
    }
}

#[async_trait]
impl LaneHandler for InlineHandler {
    async fn handle(&self, request: &Request) -> Result<Payload> {
        match &request.body {
            RequestBody::Heartbeat => Ok(Payload::Ack),
            RequestBody::GenerateCaption(prompt) => {
                let (title, description) = require_media(prompt)?;
                let caption = self.generator.generate_caption(title, description).await?;
                Ok(Payload::Caption(caption))
            }
            RequestBody::GenerateThumbnail(prompt) => {
                let (title, description) = require_media(prompt)?;
                let thumbnail = self
                    .generator
                    .generate_thumbnail(title, description)
                    .await?;
                Ok(Payload::Thumbnail(thumbnail))
            }
            RequestBody::Unknown(action) => Err(DispatchError::validation(format!(
                "Unknown action: {}",
                action
            ))),
            _ => Err(misrouted(request)),
        }
    }
}
