//! Basic type definitions for the chat server
//!
//! Provides newtype wrappers for type safety:
//! - `ConnectionId`: UUID-based unique connection identifier
//! - `Color`: a display color drawn from the fixed avatar palette

use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Unique connection identifier (newtype pattern)
///
/// Wraps a UUID v4 to correlate transport-level log lines for one socket.
/// Users are identified by name once joined; the connection ID exists before
/// a join succeeds and outlives the name in disconnect logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display color assigned to a joined user
///
/// Wraps a CSS hex string from the fixed palette in [`crate::palette`].
/// Copyable and comparable so the allocator can track which entries are out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Color(pub &'static str);

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
///
/// Matches the timestamp unit clients send with their join event.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_color_serializes_as_string() {
        let json = serde_json::to_string(&Color("#e6194b")).unwrap();
        assert_eq!(json, "\"#e6194b\"");
    }

    #[test]
    fn test_now_ms_is_recent() {
        // Any plausible present-day clock is far past this
        assert!(now_ms() > 1_600_000_000_000);
    }
}
