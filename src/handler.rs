//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, JSON event
//! framing, and the connection's read/write tasks. Inbound events are
//! processed inline in the read loop so each connection's events apply in
//! arrival order; outbound events flow through the session's channel.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::event::{ClientEvent, ServerEvent};
use crate::session::{ChatState, Session};
use crate::types::ConnectionId;

/// Outbound channel depth per connection
const OUTBOUND_BUFFER_SIZE: usize = 32;

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, runs the session until the client
/// disconnects, then completes cleanup before returning.
pub async fn handle_connection(stream: TcpStream, state: Arc<ChatState>) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let connection_id = ConnectionId::new();
    info!("Connection {} established from {}", connection_id, peer_addr);

    // Channel for server -> client events; the broadcast dispatcher gets the
    // sending half once the session joins a room.
    let (event_tx, mut event_rx) = mpsc::channel::<ServerEvent>(OUTBOUND_BUFFER_SIZE);
    let mut session = Session::new(connection_id, state, event_tx);

    // Write task (ServerEvent -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize event: {}", e);
                    // Continue - don't break on serialization errors
                }
            }
        }
        debug!("Write task ended for connection");

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Read loop (WebSocket -> session), inline to preserve event order
    while let Some(frame_result) = ws_receiver.next().await {
        match frame_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => session.handle_event(event).await,
                Err(e) => {
                    warn!("Invalid JSON from {}: {}", connection_id, e);
                }
            },
            Ok(Message::Close(_)) => {
                debug!("Connection {} sent close frame", connection_id);
                break;
            }
            Ok(Message::Ping(_)) => {
                // Pong is handled automatically by tungstenite
                debug!("Ping from {}", connection_id);
            }
            Ok(Message::Pong(_)) => {
                debug!("Pong from {}", connection_id);
            }
            Ok(_) => {
                // Binary or other frame types - ignore
            }
            Err(e) => {
                error!("WebSocket error for {}: {}", connection_id, e);
                break;
            }
        }
    }

    // Cleanup runs to completion before the connection's resources go away
    session.disconnect().await;

    // Dropping the session closes the outbound channel, ending the write task
    drop(session);
    let _ = write_task.await;

    info!("Connection {} closed", connection_id);

    Ok(())
}
