//! dispatch-core
//!
//! Transport-agnostic request dispatch:
//! - actions and lane classification
//! - request / response messages
//! - exclusive-use endpoint pool
//! - chat rooms and per-content event log
//! - lane workers and their handlers
//! - per-connection session lifecycle

pub mod action;
pub mod messages;
pub mod error;
pub mod endpoint_pool;
pub mod chat_rooms;
pub mod event_log;
pub mod collaborator;
pub mod pipeline;
pub mod lanes;
pub mod session;

pub use action::{Action, Lane};

pub use messages::{
    ChatMessage,
    ChatPost,
    ChatTarget,
    ConnectionId,
    MediaPrompt,
    OutputMessage,
    Payload,
    Request,
    RequestBody,
    RequestId,
    Response,
    SearchQuery,
    VideoRequest,
};

pub use chat_rooms::{ChatRooms, Member};
pub use collaborator::{Generator, VideoJob};
pub use endpoint_pool::{Endpoint, EndpointLease, EndpointPool};
pub use error::DispatchError;
pub use event_log::{Event, EventKind, EventLog};
pub use pipeline::{Concurrency, LaneHandler, Outbound, PipelineWorker};
pub use session::{Services, Session, SessionState};
