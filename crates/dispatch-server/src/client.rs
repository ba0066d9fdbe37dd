// crates/dispatch-server/src/client.rs

use anyhow::Result;
use dispatch_core::{ConnectionId, OutputMessage, Services, Session};
use dispatch_protocol::{decode_request, encode_output, frame_error, ProtocolError};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async_with_config;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, warn};

/// Run the WebSocket I/O loop for a single connection.
///
/// Frames go out through a single writer task fed by one channel, so
/// lane responses, chat broadcasts and frame errors never interleave
/// mid-frame. Returns once the peer has gone and the session has shut
/// down.
pub async fn run_client(
    id: ConnectionId,
    stream: TcpStream,
    services: Services,
    max_message_bytes: usize,
) -> Result<()> {
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(max_message_bytes);
    ws_config.max_frame_size = Some(max_message_bytes);

    let ws = accept_async_with_config(stream, Some(ws_config)).await?;
    let (mut sink, mut source) = ws.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutputMessage>();

    // Writer task: encode OutputMessages and write them as text frames.
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let frame = match encode_output(&msg) {
                Ok(frame) => frame,
                Err(e) => {
                    error!(conn = id.0, error = %e, "failed to encode frame");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(frame)).await {
                debug!(conn = id.0, error = %e, "write failed, stopping writer");
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut session = Session::start(id, services, out_tx.clone());

    while let Some(frame) = source.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(_)) => {
                warn!(conn = id.0, "binary frame rejected");
                let _ = out_tx.send(frame_error(&ProtocolError::BinaryFrame));
                continue;
            }
            Ok(Message::Close(_)) => break,
            // Ping/pong are answered by tungstenite itself.
            Ok(_) => continue,
            Err(e) => {
                warn!(conn = id.0, error = %e, "read error");
                break;
            }
        };

        debug!(conn = id.0, len = text.len(), "frame received");
        match decode_request(&text) {
            Ok(request) => {
                if let Err(e) = session.submit(request).await {
                    warn!(conn = id.0, error = %e, "session refused request");
                    break;
                }
            }
            Err(e) => {
                warn!(conn = id.0, error = %e, "undecodable frame");
                let _ = out_tx.send(frame_error(&e));
            }
        }
    }

    session.close().await;

    // The writer ends once every sender is gone and the queue is drained.
    drop(session);
    drop(out_tx);
    let _ = writer.await;

    Ok(())
}
