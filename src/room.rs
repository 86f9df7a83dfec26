//! Room state engine
//!
//! A room owns the authoritative message log, membership set, and typing set
//! for one named room. Every operation locks the room's state, so mutations
//! on one room are linearizable while different rooms proceed independently.

use std::collections::{HashMap, HashSet};
use std::mem;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::event::{RoomUser, ServerEvent};
use crate::types::{now_ms, Color};

/// One entry of a room's message log
///
/// `sender` is empty for system messages ("joined"/"left"), which also carry
/// no color. `previous_text` holds the pre-deletion text once a message has
/// been tombstoned.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub sender: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    pub timestamp: u64,
    pub edited: bool,
    pub deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_text: Option<String>,
}

/// A message about to be appended
///
/// `timestamp: None` means "stamp with server time at insertion" (user chat
/// messages). System joined/left messages pass `Some` to preserve the moment
/// of the event that triggered them, which for a join is the client's clock.
#[derive(Debug)]
pub struct MessageInfo {
    pub sender: String,
    pub text: String,
    pub color: Option<Color>,
    pub timestamp: Option<u64>,
}

/// An edit targeting the sender's most recent message
///
/// `color` is only used when the edit degrades into an insert (no prior
/// message by this sender).
#[derive(Debug)]
pub struct MessageEdit {
    pub sender: String,
    pub text: String,
    pub color: Option<Color>,
    pub timestamp: u64,
}

/// A deletion targeting the sender's most recent message
///
/// `tombstone` replaces the message text; the original is kept in
/// `previous_text`. The `edited` flag is written through as supplied.
#[derive(Debug)]
pub struct MessageDelete {
    pub sender: String,
    pub tombstone: String,
    pub timestamp: u64,
    pub edited: bool,
}

/// A joined user as seen by the room: color plus outbound event channel
#[derive(Debug)]
struct Member {
    color: Color,
    sender: mpsc::Sender<ServerEvent>,
}

/// Mutable room state, guarded by the room's mutex
#[derive(Debug, Default)]
struct RoomState {
    log: Vec<Message>,
    members: HashMap<String, Member>,
    typing: HashSet<String>,
}

/// A named chat room
///
/// Created by the room store on first reference and kept for the process
/// lifetime. All mutation goes through `&self` methods that serialize on the
/// internal lock.
#[derive(Debug)]
pub struct Room {
    name: String,
    state: Mutex<RoomState>,
}

impl Room {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(RoomState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a message to the log
    ///
    /// Stamps the message with server time unless the caller supplied a
    /// timestamp that must be preserved.
    pub async fn add_message(&self, info: MessageInfo) {
        let timestamp = info.timestamp.unwrap_or_else(now_ms);
        let mut state = self.state.lock().await;
        state.log.push(Message {
            sender: info.sender,
            text: info.text,
            color: info.color,
            timestamp,
            edited: false,
            deleted: false,
            previous_text: None,
        });
    }

    /// Apply an edit to the sender's most recent message
    ///
    /// No prior message by this sender: the edit becomes a fresh insert with
    /// `edited = false` (indistinguishable from a race with the original
    /// message, so it degrades instead of failing). A deleted target or an
    /// edit repeating the current text leaves the log untouched.
    pub async fn update_message(&self, edit: MessageEdit) {
        let mut state = self.state.lock().await;
        let Some(index) = state.log.iter().rposition(|m| m.sender == edit.sender) else {
            state.log.push(Message {
                sender: edit.sender,
                text: edit.text,
                color: edit.color,
                timestamp: edit.timestamp,
                edited: false,
                deleted: false,
                previous_text: None,
            });
            return;
        };

        let message = &mut state.log[index];
        if message.deleted {
            debug!(
                "Edit by '{}' in '{}' targets a deleted message, ignoring",
                edit.sender, self.name
            );
        } else if message.text == edit.text {
            debug!(
                "Edit by '{}' in '{}' repeats the current text, ignoring",
                edit.sender, self.name
            );
        } else {
            message.text = edit.text;
            message.timestamp = edit.timestamp;
            message.edited = true;
        }
    }

    /// Tombstone the sender's most recent message
    ///
    /// Aborts when the sender has no message (deletion cannot create one) and
    /// is idempotent on an already-deleted target.
    pub async fn delete_message(&self, delete: MessageDelete) {
        let mut state = self.state.lock().await;
        let Some(index) = state.log.iter().rposition(|m| m.sender == delete.sender) else {
            debug!(
                "Delete by '{}' in '{}' has no target, ignoring",
                delete.sender, self.name
            );
            return;
        };

        let message = &mut state.log[index];
        if message.deleted {
            debug!(
                "Delete by '{}' in '{}' targets a deleted message, ignoring",
                delete.sender, self.name
            );
        } else {
            message.previous_text = Some(mem::replace(&mut message.text, delete.tombstone));
            message.timestamp = delete.timestamp;
            message.edited = delete.edited;
            message.deleted = true;
        }
    }

    /// Add or remove a name from the typing set (idempotent)
    ///
    /// Only current members are ever added, so the typing set stays a subset
    /// of the membership.
    pub async fn update_typing(&self, user_name: &str, is_typing: bool) {
        let mut state = self.state.lock().await;
        if is_typing {
            if state.members.contains_key(user_name) {
                state.typing.insert(user_name.to_owned());
            }
        } else {
            state.typing.remove(user_name);
        }
    }

    /// Register a joined user with their color and outbound channel
    pub async fn insert_member(
        &self,
        user_name: String,
        color: Color,
        sender: mpsc::Sender<ServerEvent>,
    ) {
        let mut state = self.state.lock().await;
        state.members.insert(user_name, Member { color, sender });
    }

    /// Remove a user, clearing any typing status they held
    pub async fn remove_member(&self, user_name: &str) {
        let mut state = self.state.lock().await;
        state.members.remove(user_name);
        state.typing.remove(user_name);
    }

    /// Names currently composing, as an order-independent sequence
    pub async fn typing_snapshot(&self) -> Vec<String> {
        self.state.lock().await.typing.iter().cloned().collect()
    }

    /// Log snapshot plus the channels to deliver it to, under one lock
    pub(crate) async fn log_view(&self) -> (Vec<Message>, Vec<mpsc::Sender<ServerEvent>>) {
        let state = self.state.lock().await;
        (state.log.clone(), Self::targets(&state))
    }

    /// Typing snapshot plus delivery channels, under one lock
    pub(crate) async fn typing_view(&self) -> (Vec<String>, Vec<mpsc::Sender<ServerEvent>>) {
        let state = self.state.lock().await;
        (
            state.typing.iter().cloned().collect(),
            Self::targets(&state),
        )
    }

    /// Membership snapshot plus delivery channels, under one lock
    pub(crate) async fn presence_view(&self) -> (Vec<RoomUser>, Vec<mpsc::Sender<ServerEvent>>) {
        let state = self.state.lock().await;
        let users = state
            .members
            .iter()
            .map(|(user_name, member)| RoomUser {
                user_name: user_name.clone(),
                color: member.color,
            })
            .collect();
        (users, Self::targets(&state))
    }

    fn targets(state: &RoomState) -> Vec<mpsc::Sender<ServerEvent>> {
        state
            .members
            .values()
            .map(|member| member.sender.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn chat(sender: &str, text: &str) -> MessageInfo {
        MessageInfo {
            sender: sender.to_string(),
            text: text.to_string(),
            color: Some(Color("#e6194b")),
            timestamp: None,
        }
    }

    fn edit(sender: &str, text: &str, timestamp: u64) -> MessageEdit {
        MessageEdit {
            sender: sender.to_string(),
            text: text.to_string(),
            color: Some(Color("#e6194b")),
            timestamp,
        }
    }

    fn delete(sender: &str, timestamp: u64) -> MessageDelete {
        MessageDelete {
            sender: sender.to_string(),
            tombstone: "message deleted".to_string(),
            timestamp,
            edited: false,
        }
    }

    async fn log_of(room: &Room) -> Vec<Message> {
        room.log_view().await.0
    }

    #[tokio::test]
    async fn test_add_message_stamps_server_time() {
        let room = Room::new("lab");
        let before = now_ms();
        room.add_message(chat("alice", "hi")).await;

        let log = log_of(&room).await;
        assert_eq!(log.len(), 1);
        assert!(log[0].timestamp >= before);
        assert!(!log[0].edited);
        assert!(!log[0].deleted);
    }

    #[tokio::test]
    async fn test_add_message_preserves_supplied_timestamp() {
        let room = Room::new("lab");
        room.add_message(MessageInfo {
            sender: String::new(),
            text: "alice has joined the room".to_string(),
            color: None,
            timestamp: Some(1000),
        })
        .await;

        let log = log_of(&room).await;
        assert_eq!(log[0].timestamp, 1000);
        assert_eq!(log[0].sender, "");
    }

    #[tokio::test]
    async fn test_edit_without_prior_message_inserts() {
        let room = Room::new("lab");
        room.update_message(edit("alice", "hello", 42)).await;

        let log = log_of(&room).await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].text, "hello");
        assert_eq!(log[0].timestamp, 42);
        assert!(!log[0].edited);
    }

    #[tokio::test]
    async fn test_edit_targets_most_recent_by_sender() {
        let room = Room::new("lab");
        room.add_message(chat("alice", "first")).await;
        room.add_message(chat("alice", "second")).await;
        room.add_message(chat("bob", "hi")).await;

        room.update_message(edit("alice", "second!", 42)).await;

        let log = log_of(&room).await;
        assert_eq!(log[0].text, "first");
        assert_eq!(log[1].text, "second!");
        assert!(log[1].edited);
        assert_eq!(log[2].text, "hi");
        assert!(!log[2].edited);
    }

    #[tokio::test]
    async fn test_edit_with_same_text_is_noop() {
        let room = Room::new("lab");
        room.update_message(edit("alice", "hello", 5)).await;
        room.update_message(edit("alice", "hello", 9)).await;

        let log = log_of(&room).await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].timestamp, 5);
        assert!(!log[0].edited);
    }

    #[tokio::test]
    async fn test_edit_on_deleted_message_is_rejected() {
        let room = Room::new("lab");
        room.add_message(chat("alice", "oops")).await;
        room.delete_message(delete("alice", 10)).await;
        room.update_message(edit("alice", "take it back", 20)).await;

        let log = log_of(&room).await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].text, "message deleted");
        assert!(log[0].deleted);
        assert_eq!(log[0].timestamp, 10);
    }

    #[tokio::test]
    async fn test_delete_keeps_previous_text() {
        let room = Room::new("lab");
        room.add_message(chat("alice", "secret")).await;
        room.delete_message(delete("alice", 10)).await;

        let log = log_of(&room).await;
        assert_eq!(log[0].text, "message deleted");
        assert_eq!(log[0].previous_text.as_deref(), Some("secret"));
        assert!(log[0].deleted);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let room = Room::new("lab");
        room.add_message(chat("alice", "secret")).await;
        room.delete_message(delete("alice", 10)).await;
        room.delete_message(delete("alice", 99)).await;

        let log = log_of(&room).await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].text, "message deleted");
        assert_eq!(log[0].previous_text.as_deref(), Some("secret"));
        assert_eq!(log[0].timestamp, 10);
    }

    #[tokio::test]
    async fn test_delete_without_target_is_aborted() {
        let room = Room::new("lab");
        room.delete_message(delete("alice", 10)).await;
        assert!(log_of(&room).await.is_empty());
    }

    #[tokio::test]
    async fn test_typing_is_idempotent() {
        let (tx, _rx) = mpsc::channel(8);
        let room = Room::new("lab");
        room.insert_member("alice".to_string(), Color("#e6194b"), tx)
            .await;

        room.update_typing("alice", true).await;
        room.update_typing("alice", true).await;
        assert_eq!(room.typing_snapshot().await, vec!["alice".to_string()]);

        room.update_typing("alice", false).await;
        room.update_typing("alice", false).await;
        assert!(room.typing_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_typing_requires_membership() {
        let room = Room::new("lab");
        room.update_typing("ghost", true).await;
        assert!(room.typing_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_member_clears_typing() {
        let (tx, _rx) = mpsc::channel(8);
        let room = Room::new("lab");
        room.insert_member("alice".to_string(), Color("#e6194b"), tx)
            .await;
        room.update_typing("alice", true).await;

        room.remove_member("alice").await;

        assert!(room.typing_snapshot().await.is_empty());
        let (users, _) = room.presence_view().await;
        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_adds_lose_nothing() {
        let room = Arc::new(Room::new("lab"));
        let mut tasks = Vec::new();

        for i in 0..50 {
            let room = Arc::clone(&room);
            tasks.push(tokio::spawn(async move {
                room.add_message(chat(&format!("user{i}"), "hi")).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let log = log_of(&room).await;
        assert_eq!(log.len(), 50);
        let senders: std::collections::HashSet<_> =
            log.iter().map(|m| m.sender.clone()).collect();
        assert_eq!(senders.len(), 50);
    }

    #[tokio::test]
    async fn test_concurrent_edits_both_apply() {
        let room = Arc::new(Room::new("lab"));
        room.add_message(chat("alice", "a")).await;
        room.add_message(chat("bob", "b")).await;

        let r1 = Arc::clone(&room);
        let r2 = Arc::clone(&room);
        let t1 = tokio::spawn(async move { r1.update_message(edit("alice", "a2", 1)).await });
        let t2 = tokio::spawn(async move { r2.update_message(edit("bob", "b2", 2)).await });
        t1.await.unwrap();
        t2.await.unwrap();

        let log = log_of(&room).await;
        assert!(log.iter().any(|m| m.text == "a2" && m.edited));
        assert!(log.iter().any(|m| m.text == "b2" && m.edited));
    }
}
