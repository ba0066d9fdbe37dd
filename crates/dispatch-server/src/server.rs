//! WebSocket listener and top-level server wiring.
//!
//! This module:
//! - Listens on the configured address/port.
//! - Builds the process-wide services (endpoint pool, chat rooms, event
//!   log, generator) once.
//! - Accepts new TCP connections, assigns each a `ConnectionId` and
//!   spawns a per-connection task.
//!
//! The per-connection WebSocket handling lives in `client`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use dispatch_core::{ConnectionId, EndpointPool, Generator, Services};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::client;
use crate::config::Config;
use crate::generator::RemoteGenerator;

/// Counter for assigning process-unique `ConnectionId`s.
static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

fn next_connection_id() -> ConnectionId {
    ConnectionId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Bind, then serve until Ctrl-C.
pub async fn run(config: Config) -> Result<()> {
    let generator = Arc::new(RemoteGenerator::new(config.backend.clone())?);

    let addr = config.socket_addr_string();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, endpoints = config.endpoint_urls.len(), "listening");

    tokio::select! {
        res = serve(listener, config, generator) => res,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            Ok(())
        }
    }
}

/// Accept connections on an already-bound listener.
pub async fn serve(
    listener: TcpListener,
    config: Config,
    generator: Arc<dyn Generator>,
) -> Result<()> {
    let pool = EndpointPool::new(config.endpoint_urls.iter().cloned());
    let services = Services::new(pool, generator).with_acquire_timeout(config.acquire_timeout);
    let connected = Arc::new(AtomicUsize::new(0));

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };

        if connected.load(Ordering::SeqCst) >= config.max_clients {
            warn!(
                %peer_addr,
                max_clients = config.max_clients,
                "rejecting connection: max_clients reached"
            );
            // Dropping the stream closes it.
            continue;
        }

        let id = next_connection_id();
        info!(conn = id.0, %peer_addr, "accepted connection");

        let slot = ConnectedSlot::take(&connected);
        let services = services.clone();
        let max_message_bytes = config.max_message_bytes;

        tokio::spawn(async move {
            let _slot = slot;
            match client::run_client(id, stream, services, max_message_bytes).await {
                Ok(()) => info!(conn = id.0, "client disconnected"),
                Err(e) => warn!(conn = id.0, error = %e, "client error"),
            }
        });
    }
}

/// One occupied client slot, given back on drop.
struct ConnectedSlot(Arc<AtomicUsize>);

impl ConnectedSlot {
    fn take(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        ConnectedSlot(Arc::clone(counter))
    }
}

impl Drop for ConnectedSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
