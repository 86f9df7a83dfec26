//! Session and event orchestration
//!
//! A session represents one connected client. It validates inbound events
//! against the connection's state machine (unjoined → joined → disconnected),
//! calls into the room store and identity registry, and triggers broadcasts.
//! Events for one connection are processed strictly in arrival order by the
//! connection's read loop.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::broadcast;
use crate::error::SendError;
use crate::event::{ClientEvent, ServerEvent};
use crate::palette::ColorAllocator;
use crate::registry::IdentityRegistry;
use crate::room::{MessageDelete, MessageEdit, MessageInfo};
use crate::store::RoomStore;
use crate::types::{now_ms, Color, ConnectionId};

/// Shared process state handed to every session
///
/// Owned explicitly and passed by handle so tests can build a fresh instance
/// instead of relying on ambient globals.
#[derive(Debug, Default)]
pub struct ChatState {
    pub registry: IdentityRegistry,
    pub rooms: RoomStore,
    pub palette: ColorAllocator,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Identity fixed at a successful join, immutable for the connection's life
#[derive(Debug)]
struct Identity {
    user_name: String,
    room_name: String,
    color: Color,
}

/// One connected client's view of the chat core
///
/// Holds the outbound event channel the broadcast dispatcher also delivers
/// to once the session has joined a room.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    state: Arc<ChatState>,
    outbound: mpsc::Sender<ServerEvent>,
    identity: Option<Identity>,
}

impl Session {
    pub fn new(id: ConnectionId, state: Arc<ChatState>, outbound: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            id,
            state,
            outbound,
            identity: None,
        }
    }

    /// Process one inbound event according to the connection state machine
    ///
    /// Before a join succeeds only join events are accepted; afterwards a
    /// second join is ignored deterministically.
    pub async fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Join {
                room_name,
                user_name,
                timestamp,
            } => {
                if self.identity.is_some() {
                    warn!("Connection {} sent a second join, ignoring", self.id);
                    return;
                }
                self.handle_join(room_name, user_name, timestamp).await;
            }
            _ if self.identity.is_none() => {
                warn!("Connection {} sent an event before joining, dropping", self.id);
            }
            ClientEvent::Message { text } => self.handle_message(text).await,
            ClientEvent::Edit { text } => self.handle_edit(text).await,
            ClientEvent::Delete { text } => self.handle_delete(text).await,
            ClientEvent::Typing {
                user_name,
                is_typing,
                ..
            } => self.handle_typing(&user_name, is_typing).await,
        }
    }

    /// Join protocol: claim the name, allocate a color, enter the room,
    /// and bring the requester up to date before confirming.
    async fn handle_join(&mut self, room_name: String, user_name: String, timestamp: u64) {
        if let Err(err) = self.state.registry.register(&user_name).await {
            info!(
                "Connection {} join rejected, name '{}' taken",
                self.id, user_name
            );
            let _ = self
                .send(ServerEvent::JoinResponse {
                    room_name,
                    user_name,
                    color: None,
                    error: Some(err.to_string()),
                })
                .await;
            return;
        }

        let color = self.state.palette.allocate().await;
        let room = self.state.rooms.get(&room_name).await;
        room.insert_member(user_name.clone(), color, self.outbound.clone())
            .await;
        broadcast::broadcast_presence(&room).await;

        // A joiner may arrive mid-composition; send them the current typing
        // set once, directly.
        let users = room.typing_snapshot().await;
        let _ = self.send(ServerEvent::Typing { users }).await;

        // The join moment travelled with the request; preserve the client's
        // clock on the system message.
        room.add_message(MessageInfo {
            sender: String::new(),
            text: format!("{user_name} has joined the room"),
            color: None,
            timestamp: Some(timestamp),
        })
        .await;
        broadcast::broadcast_log(&room).await;

        let _ = self
            .send(ServerEvent::JoinResponse {
                room_name: room_name.clone(),
                user_name: user_name.clone(),
                color: Some(color),
                error: None,
            })
            .await;

        info!(
            "Connection {} joined room '{}' as '{}'",
            self.id, room_name, user_name
        );
        self.identity = Some(Identity {
            user_name,
            room_name,
            color,
        });
    }

    /// Append a chat message, stamped with server time at insertion
    async fn handle_message(&self, text: String) {
        let Some(identity) = &self.identity else {
            return;
        };
        let room = self.state.rooms.get(&identity.room_name).await;
        room.add_message(MessageInfo {
            sender: identity.user_name.clone(),
            text,
            color: Some(identity.color),
            timestamp: None,
        })
        .await;
        broadcast::broadcast_log(&room).await;
    }

    /// Edit the sender's most recent message
    async fn handle_edit(&self, text: String) {
        let Some(identity) = &self.identity else {
            return;
        };
        if text.trim().is_empty() {
            debug!(
                "Connection {} sent an empty edit, dropping",
                self.id
            );
            return;
        }
        let room = self.state.rooms.get(&identity.room_name).await;
        room.update_message(MessageEdit {
            sender: identity.user_name.clone(),
            text,
            color: Some(identity.color),
            timestamp: now_ms(),
        })
        .await;
        broadcast::broadcast_log(&room).await;
    }

    /// Tombstone the sender's most recent message
    async fn handle_delete(&self, tombstone: String) {
        let Some(identity) = &self.identity else {
            return;
        };
        let room = self.state.rooms.get(&identity.room_name).await;
        room.delete_message(MessageDelete {
            sender: identity.user_name.clone(),
            tombstone,
            timestamp: now_ms(),
            edited: false,
        })
        .await;
        broadcast::broadcast_log(&room).await;
    }

    /// Update the typing set and push it to the whole room
    ///
    /// Broadcast unconditionally: typing events are already debounced on the
    /// client and handling them idempotently is simpler than diffing.
    async fn handle_typing(&self, claimed_name: &str, is_typing: bool) {
        let Some(identity) = &self.identity else {
            return;
        };
        if claimed_name != identity.user_name {
            debug!(
                "Connection {} claimed typing name '{}', using '{}'",
                self.id, claimed_name, identity.user_name
            );
        }
        let room = self.state.rooms.get(&identity.room_name).await;
        room.update_typing(&identity.user_name, is_typing).await;
        broadcast::broadcast_typing(&room).await;
    }

    /// Disconnect cleanup: every step is idempotent and none aborts the rest
    ///
    /// Order: leave the room (also clears typing), free the name and color,
    /// append the departure message, then push log, presence, and typing to
    /// the remaining members.
    pub async fn disconnect(&mut self) {
        let Some(identity) = self.identity.take() else {
            debug!("Connection {} disconnected before joining", self.id);
            return;
        };

        let room = self.state.rooms.get(&identity.room_name).await;
        room.remove_member(&identity.user_name).await;
        self.state.registry.unregister(&identity.user_name).await;
        self.state.palette.release(identity.color).await;

        room.add_message(MessageInfo {
            sender: String::new(),
            text: format!("{} has left the room", identity.user_name),
            color: None,
            timestamp: None,
        })
        .await;
        broadcast::broadcast_log(&room).await;
        broadcast::broadcast_presence(&room).await;
        broadcast::broadcast_typing(&room).await;

        info!(
            "Connection {} left room '{}' as '{}'",
            self.id, identity.room_name, identity.user_name
        );
    }

    /// Send an event to this session's own client
    ///
    /// Returns an error if the channel is closed (client disconnected).
    async fn send(&self, event: ServerEvent) -> Result<(), SendError> {
        self.outbound
            .send(event)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }
}
