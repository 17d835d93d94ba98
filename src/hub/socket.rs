use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, warn};

use super::connection::{ConnectionHandle, Outbound};
use super::control::SocketState;
use super::registry::ConnectionRegistry;

/// How long the writer gets to flush its close frame once the reader is done.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Drive one upgraded WebSocket until either side closes it.
///
/// Outbound traffic goes through a bounded queue drained by a writer task;
/// the reader loop feeds text frames to the control dispatcher. Both tasks
/// also watch the handle's close signal, so a superseded or evicted
/// connection shuts down even when its queue is full.
pub async fn serve_socket(socket: WebSocket, registry: ConnectionRegistry, buffer: usize) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (handle, mut outbound) = ConnectionHandle::new(buffer);
    let connection_id = handle.id();
    let closed = handle.close_signal();
    debug!("Connection {} opened", connection_id);

    let writer_closed = closed.clone();
    let mut writer = tokio::spawn(async move {
        loop {
            // A close request wins over whatever is still queued.
            let item = tokio::select! {
                biased;
                _ = writer_closed.cancelled() => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
                item = outbound.recv() => item,
            };
            let Some(item) = item else { break };

            let frame = match item {
                Outbound::Message(message) => match message.to_json() {
                    Ok(json) => Message::Text(json.into()),
                    Err(e) => {
                        error!("Failed to encode outbound message: {}", e);
                        continue;
                    }
                },
                Outbound::Probe => Message::Ping(Vec::<u8>::new().into()),
            };
            if ws_sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    let mut state = SocketState::new(registry, handle);
    let mut writer_done = false;

    loop {
        let frame = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            _ = &mut writer => {
                writer_done = true;
                break;
            }
            frame = ws_receiver.next() => frame,
        };
        let Some(frame) = frame else { break };

        match frame {
            Ok(Message::Text(text)) => {
                if let Err(e) = state.handle_text(text.as_str()) {
                    warn!("Discarding control message on {}: {}", connection_id, e);
                }
            }
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => {
                    if let Err(e) = state.handle_text(text) {
                        warn!("Discarding control message on {}: {}", connection_id, e);
                    }
                }
                Err(_) => warn!("Discarding non-UTF-8 frame on {}", connection_id),
            },
            Ok(Message::Pong(_)) => state.handle().mark_alive(),
            Ok(Message::Ping(_)) => state.handle().mark_alive(),
            Ok(Message::Close(_)) => break,
            Err(e) => {
                debug!("Connection {} errored: {}", connection_id, e);
                break;
            }
        }
    }

    state.close();
    state.handle().close();
    if !writer_done && tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
    debug!("Connection {} closed", connection_id);
}
