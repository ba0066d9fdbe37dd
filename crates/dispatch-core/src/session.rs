//! Per-connection session: three lane queues and the workers that drain them.
//!
//! Lifecycle: `Connecting -> Active -> Closing -> Closed`.
//!
//! - `start` spawns the chat, search and generation workers and moves to
//!   `Active`, the only state in which `submit` accepts work.
//! - `close` cancels all three workers (and through them any in-flight
//!   generation task), waits for them to stop, removes the connection
//!   from every chat room and moves to `Closed`. Requests still queued
//!   at that point are discarded.
//!
//! The session owns its workers outright; dropping a session without
//! closing it still cancels them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::action::Lane;
use crate::chat_rooms::{ChatRooms, Member};
use crate::collaborator::Generator;
use crate::endpoint_pool::{EndpointPool, DEFAULT_ACQUIRE_TIMEOUT};
use crate::error::{DispatchError, Result};
use crate::event_log::EventLog;
use crate::lanes::{ChatLane, GenerationLane, InlineHandler, SearchLane};
use crate::messages::{ConnectionId, Request};
use crate::pipeline::{dispatch_one, Concurrency, LaneTx, Outbound, PipelineWorker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

/// Process-wide services shared by every session.
///
/// Built once at server start and handed to each session by reference.
#[derive(Clone)]
pub struct Services {
    pub pool: Arc<EndpointPool>,
    pub rooms: Arc<ChatRooms>,
    pub events: Arc<EventLog>,
    pub generator: Arc<dyn Generator>,
    pub acquire_timeout: Duration,
}

impl Services {
    pub fn new(pool: EndpointPool, generator: Arc<dyn Generator>) -> Self {
        Services {
            pool: Arc::new(pool),
            rooms: Arc::new(ChatRooms::new()),
            events: Arc::new(EventLog::new()),
            generator,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

pub struct Session {
    id: ConnectionId,
    state: SessionState,
    services: Services,
    outbound: Outbound,
    chat: LaneTx,
    search: LaneTx,
    generation: LaneTx,
    inline: Arc<InlineHandler>,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl Session {
    /// Spawn the lane workers for a new connection.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(id: ConnectionId, services: Services, outbound: Outbound) -> Self {
        let cancel = CancellationToken::new();
        let member = Member::new(id, &outbound);

        let (chat, chat_rx) = mpsc::unbounded_channel();
        let (search, search_rx) = mpsc::unbounded_channel();
        let (generation, generation_rx) = mpsc::unbounded_channel();

        let mut session = Session {
            id,
            state: SessionState::Connecting,
            inline: Arc::new(InlineHandler::new(Arc::clone(&services.generator))),
            services,
            outbound,
            chat,
            search,
            generation,
            cancel,
            workers: Vec::with_capacity(3),
        };

        let services = &session.services;
        let chat_worker = PipelineWorker::new(
            Lane::Chat,
            Arc::new(ChatLane::new(
                Arc::clone(&services.rooms),
                Arc::clone(&services.events),
                member,
            )),
            session.outbound.clone(),
            Concurrency::Sequential,
            session.cancel.child_token(),
        );
        let search_worker = PipelineWorker::new(
            Lane::Search,
            Arc::new(SearchLane::new(Arc::clone(&services.generator))),
            session.outbound.clone(),
            Concurrency::Sequential,
            session.cancel.child_token(),
        );
        // Never more generation calls in flight than endpoints to serve them.
        let generation_worker = PipelineWorker::new(
            Lane::Generation,
            Arc::new(GenerationLane::new(
                Arc::clone(&services.pool),
                Arc::clone(&services.events),
                Arc::clone(&services.generator),
                services.acquire_timeout,
            )),
            session.outbound.clone(),
            Concurrency::Bounded(services.pool.size()),
            session.cancel.child_token(),
        );

        session.workers.push(chat_worker.spawn(chat_rx));
        session.workers.push(search_worker.spawn(search_rx));
        session.workers.push(generation_worker.spawn(generation_rx));
        session.state = SessionState::Active;

        info!(conn = id.0, "session active");
        session
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Route one request to its lane.
    ///
    /// Queued lanes return as soon as the request is enqueued. Inline
    /// requests are processed before returning, behind the same per-item
    /// fault boundary as the lanes.
    pub async fn submit(&self, request: Request) -> Result<()> {
        if self.state != SessionState::Active {
            return Err(DispatchError::SessionClosed);
        }

        let lane = request.lane();
        debug!(
            conn = self.id.0,
            action = request.action_name(),
            request_id = %request.request_id,
            lane = lane.as_str(),
            "routing request"
        );

        let queue = match lane {
            Lane::Chat => &self.chat,
            Lane::Search => &self.search,
            Lane::Generation => &self.generation,
            Lane::Inline => {
                let handler = Arc::clone(&self.inline);
                dispatch_one(Lane::Inline, handler, request, self.outbound.clone()).await;
                return Ok(());
            }
        };

        queue.send(request).map_err(|_| DispatchError::SessionClosed)
    }

    /// Cancel the lanes and wait for them to stop. Idempotent.
    pub async fn close(&mut self) {
        if matches!(self.state, SessionState::Closing | SessionState::Closed) {
            return;
        }
        self.state = SessionState::Closing;
        self.cancel.cancel();

        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                if e.is_panic() {
                    error!(conn = self.id.0, error = %e, "lane worker panicked");
                }
            }
        }

        self.services.rooms.leave_all(self.id).await;
        self.state = SessionState::Closed;
        info!(conn = self.id.0, "session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
