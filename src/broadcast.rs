//! Broadcast dispatcher
//!
//! Pushes whole-state room snapshots to every session joined to a room.
//! Snapshots and the delivery list are taken together under the room's lock,
//! so each broadcast reflects the state the triggering mutation committed;
//! delivery itself runs after the lock is released.

use tokio::sync::mpsc;
use tracing::debug;

use crate::event::ServerEvent;
use crate::room::Room;

/// Send the room's full message log to all members
pub async fn broadcast_log(room: &Room) {
    let (log, targets) = room.log_view().await;
    deliver(targets, ServerEvent::ChatUpdate { log }).await;
}

/// Send the room's current typing set to all members
pub async fn broadcast_typing(room: &Room) {
    let (users, targets) = room.typing_view().await;
    deliver(targets, ServerEvent::Typing { users }).await;
}

/// Send the room's membership (names and colors) to all members
pub async fn broadcast_presence(room: &Room) {
    let (users, targets) = room.presence_view().await;
    deliver(targets, ServerEvent::UpdateRoomUsers { users }).await;
}

/// Fire-and-forget delivery: a session that disconnected before delivery
/// simply does not receive the event.
async fn deliver(targets: Vec<mpsc::Sender<ServerEvent>>, event: ServerEvent) {
    for target in targets {
        if target.send(event.clone()).await.is_err() {
            debug!("Broadcast target disconnected, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::MessageInfo;
    use crate::types::Color;

    #[tokio::test]
    async fn test_log_broadcast_reaches_all_members() {
        let room = Room::new("lab");
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        room.insert_member("alice".to_string(), Color("#e6194b"), tx_a)
            .await;
        room.insert_member("bob".to_string(), Color("#3cb44b"), tx_b)
            .await;

        room.add_message(MessageInfo {
            sender: "alice".to_string(),
            text: "hi".to_string(),
            color: Some(Color("#e6194b")),
            timestamp: None,
        })
        .await;
        broadcast_log(&room).await;

        for rx in [&mut rx_a, &mut rx_b] {
            match rx.recv().await.unwrap() {
                ServerEvent::ChatUpdate { log } => {
                    assert_eq!(log.len(), 1);
                    assert_eq!(log[0].text, "hi");
                }
                other => panic!("Expected ChatUpdate, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_closed_channel_does_not_stop_delivery() {
        let room = Room::new("lab");
        let (tx_gone, rx_gone) = mpsc::channel(8);
        let (tx_live, mut rx_live) = mpsc::channel(8);
        room.insert_member("gone".to_string(), Color("#e6194b"), tx_gone)
            .await;
        room.insert_member("live".to_string(), Color("#3cb44b"), tx_live)
            .await;
        drop(rx_gone);

        broadcast_presence(&room).await;

        match rx_live.recv().await.unwrap() {
            ServerEvent::UpdateRoomUsers { users } => assert_eq!(users.len(), 2),
            other => panic!("Expected UpdateRoomUsers, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_typing_broadcast_carries_snapshot() {
        let room = Room::new("lab");
        let (tx, mut rx) = mpsc::channel(8);
        room.insert_member("alice".to_string(), Color("#e6194b"), tx)
            .await;
        room.update_typing("alice", true).await;

        broadcast_typing(&room).await;

        match rx.recv().await.unwrap() {
            ServerEvent::Typing { users } => assert_eq!(users, vec!["alice".to_string()]),
            other => panic!("Expected Typing, got {other:?}"),
        }
    }
}
