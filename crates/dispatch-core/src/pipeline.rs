//! Lane workers.
//!
//! A [`PipelineWorker`] consumes one lane's queue and emits exactly one
//! correlated [`Response`] per request on the connection's outbound
//! channel. It runs in one of two modes:
//!
//! - **Sequential** (chat, search): one request is processed to
//!   completion before the next is dequeued, so responses leave in FIFO
//!   order.
//! - **Bounded** (generation): up to `limit` requests run as independent
//!   tasks. New requests are admitted as soon as a slot frees up; a slow
//!   request never blocks admission below the ceiling.
//!
//! In both modes a failure (error, panic, dead outbound channel) is
//! confined to the request that caused it and the loop keeps going.
//! Cancellation through the session's token stops the loop and aborts
//! every in-flight task, which drops any endpoint lease they hold.
//!
//! Queues are unbounded: under sustained overload they grow rather than
//! reject or drop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::action::Lane;
use crate::error::{DispatchError, Result};
use crate::messages::{OutputMessage, Payload, Request, Response};

/// Channel into a connection's writer.
pub type Outbound = UnboundedSender<OutputMessage>;

/// Queue feeding one lane.
pub type LaneTx = UnboundedSender<Request>;
pub type LaneRx = UnboundedReceiver<Request>;

/// Per-lane request processing.
#[async_trait]
pub trait LaneHandler: Send + Sync + 'static {
    async fn handle(&self, request: &Request) -> Result<Payload>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    Sequential,
    /// At most this many requests in flight. Zero is treated as one.
    Bounded(usize),
}

pub struct PipelineWorker {
    lane: Lane,
    handler: Arc<dyn LaneHandler>,
    outbound: Outbound,
    concurrency: Concurrency,
    cancel: CancellationToken,
}

impl PipelineWorker {
    pub fn new(
        lane: Lane,
        handler: Arc<dyn LaneHandler>,
        outbound: Outbound,
        concurrency: Concurrency,
        cancel: CancellationToken,
    ) -> Self {
        PipelineWorker {
            lane,
            handler,
            outbound,
            concurrency,
            cancel,
        }
    }

    pub fn spawn(self, rx: LaneRx) -> JoinHandle<()> {
        tokio::spawn(self.run(rx))
    }

    pub async fn run(self, rx: LaneRx) {
        match self.concurrency {
            Concurrency::Sequential => self.run_sequential(rx).await,
            Concurrency::Bounded(limit) => self.run_bounded(rx, limit.max(1)).await,
        }
        info!(lane = self.lane.as_str(), "lane worker stopped");
    }

    async fn run_sequential(&self, mut rx: LaneRx) {
        loop {
            let request = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(request) => request,
                    None => break,
                },
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = dispatch_one(self.lane, Arc::clone(&self.handler), request, self.outbound.clone()) => {}
            }
        }
    }

    async fn run_bounded(&self, mut rx: LaneRx, limit: usize) {
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        if !e.is_cancelled() {
                            error!(lane = self.lane.as_str(), error = %e, "lane task failed");
                        }
                    }
                }
                next = rx.recv(), if in_flight.len() < limit => match next {
                    Some(request) => {
                        debug!(
                            lane = self.lane.as_str(),
                            in_flight = in_flight.len() + 1,
                            limit,
                            "admitting request"
                        );
                        in_flight.spawn(dispatch_one(
                            self.lane,
                            Arc::clone(&self.handler),
                            request,
                            self.outbound.clone(),
                        ));
                    }
                    None => {
                        // Queue closed without cancellation: let admitted work finish.
                        tokio::select! {
                            _ = self.cancel.cancelled() => {}
                            _ = async { while in_flight.join_next().await.is_some() {} } => {}
                        }
                        break;
                    }
                },
            }
        }

        in_flight.shutdown().await;
    }
}

/// Process one request and send its response.
///
/// This is the per-item fault boundary shared by every lane, including
/// inline requests on the receive path.
pub(crate) async fn dispatch_one(
    lane: Lane,
    handler: Arc<dyn LaneHandler>,
    request: Request,
    outbound: Outbound,
) {
    let outcome = AssertUnwindSafe(handler.handle(&request))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(DispatchError::internal(panic_message(&*panic))));

    let response = match outcome {
        Ok(payload) => Response::success(&request, payload),
        Err(e) => {
            let action = request.action_name();
            if e.is_fault() {
                error!(
                    lane = lane.as_str(),
                    action,
                    request_id = %request.request_id,
                    error = %e,
                    "request failed"
                );
            } else {
                debug!(lane = lane.as_str(), action, request_id = %request.request_id, error = %e, "request rejected");
            }
            Response::failure(action, request.request_id.clone(), e.client_message(action))
        }
    };

    if outbound.send(OutputMessage::Response(response)).is_err() {
        warn!(
            lane = lane.as_str(),
            request_id = %request.request_id,
            "connection writer gone, response dropped"
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}
