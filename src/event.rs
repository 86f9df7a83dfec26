//! Wire event definitions
//!
//! JSON-based bidirectional event protocol using Serde's tagged enum
//! for type-safe serialization/deserialization.

use serde::{Deserialize, Serialize};

use crate::room::Message;
use crate::types::Color;

/// Client → Server event
///
/// All events from client to server. Uses tagged enum with snake_case naming.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Join a named room under a globally unique user name
    ///
    /// `timestamp` is the client's clock at the moment it pressed join,
    /// in milliseconds since the Unix epoch. It is preserved on the
    /// "joined the room" system message.
    Join {
        room_name: String,
        user_name: String,
        timestamp: u64,
    },
    /// Send a chat message (timestamped by the server at insertion)
    Message { text: String },
    /// Edit the sender's most recent message
    Edit { text: String },
    /// Delete the sender's most recent message, displaying `text` in its place
    Delete { text: String },
    /// Start or stop composing
    Typing {
        room_name: String,
        user_name: String,
        is_typing: bool,
    },
}

/// Server → Client event
///
/// All events from server to client. Uses tagged enum with snake_case naming.
/// Room-scoped events always carry the whole current snapshot, never a diff.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Result of a join, sent to the requester only
    ///
    /// On success echoes the room name, user name, and assigned color.
    /// On failure `error` is set and `color` is absent.
    JoinResponse {
        room_name: String,
        user_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        color: Option<Color>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Full message log of the room, sent after any log mutation
    ChatUpdate { log: Vec<Message> },
    /// Names currently composing in the room
    Typing { users: Vec<String> },
    /// Current room membership with display colors
    UpdateRoomUsers { users: Vec<RoomUser> },
}

/// One entry of the membership snapshot
#[derive(Debug, Clone, Serialize)]
pub struct RoomUser {
    pub user_name: String,
    pub color: Color,
}
