//! Room store
//!
//! Keyed collection of rooms, created lazily on first reference and retained
//! for the process lifetime. `get` is the sole creation path.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::room::Room;

/// Name-keyed room collection
///
/// Get-or-create runs under the store's lock, so creation is exactly-once
/// even when several sessions reference a new room name at the same moment.
/// The lock covers only the map; room mutation happens on the room's own
/// lock, so rooms stay independent of each other.
#[derive(Debug, Default)]
pub struct RoomStore {
    rooms: Mutex<HashMap<String, Arc<Room>>>,
}

impl RoomStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the room with this name, creating it on first reference
    ///
    /// The same name always yields the same instance.
    pub async fn get(&self, name: &str) -> Arc<Room> {
        let mut rooms = self.rooms.lock().await;
        Arc::clone(rooms.entry(name.to_owned()).or_insert_with(|| {
            info!("Room '{}' created", name);
            Arc::new(Room::new(name))
        }))
    }
}
