//! Room-Scoped WebSocket Chat Server Library
//!
//! A real-time chat backend built with tokio-tungstenite: clients join named
//! rooms, exchange messages, see live presence and typing indicators, and may
//! edit or delete their own most recent message.
//!
//! # Features
//! - WebSocket connection handling with JSON event framing
//! - Globally unique user names for the life of a connection
//! - Rooms created lazily on first reference
//! - Whole-state broadcasts (log, typing set, membership) after every mutation
//! - Message editing and deletion targeting the sender's last message
//! - Display colors allocated from a fixed palette
//!
//! # Architecture
//! Shared state lives in [`ChatState`], handed to each connection's
//! [`Session`]. Every room guards its own state with a mutex, so mutations on
//! one room are linearizable while different rooms proceed concurrently.
//! Broadcast snapshots are taken under the same lock as the mutation that
//! triggered them.
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use veilednexus::{handle_connection, ChatState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:9000").await.unwrap();
//!     let state = Arc::new(ChatState::new());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         let state = Arc::clone(&state);
//!         tokio::spawn(handle_connection(stream, state));
//!     }
//! }
//! ```

pub mod broadcast;
pub mod error;
pub mod event;
pub mod handler;
pub mod palette;
pub mod registry;
pub mod room;
pub mod session;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use error::{AppError, SendError};
pub use event::{ClientEvent, RoomUser, ServerEvent};
pub use handler::handle_connection;
pub use palette::ColorAllocator;
pub use registry::IdentityRegistry;
pub use room::{Message, MessageDelete, MessageEdit, MessageInfo, Room};
pub use session::{ChatState, Session};
pub use store::RoomStore;
pub use types::{Color, ConnectionId};
