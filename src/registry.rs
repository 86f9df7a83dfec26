//! Identity registry
//!
//! Tracks the user names currently claimed by live connections. Names are
//! compared byte-for-byte, case-sensitive, with no normalization.

use std::collections::HashSet;

use tokio::sync::Mutex;
use tracing::info;

use crate::error::AppError;

/// Registry of user names in use across all rooms
///
/// Registration is atomic: under concurrent joins with the same name,
/// exactly one wins. Owned explicitly rather than living in a global so
/// tests can construct a fresh registry.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    names: Mutex<HashSet<String>>,
}

impl IdentityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a user name for the duration of a connection
    ///
    /// Returns [`AppError::NameTaken`] if a live connection already holds it.
    pub async fn register(&self, name: &str) -> Result<(), AppError> {
        let mut names = self.names.lock().await;
        if !names.insert(name.to_owned()) {
            return Err(AppError::NameTaken(name.to_owned()));
        }
        info!("User registered: {}", name);
        Ok(())
    }

    /// Release a user name
    ///
    /// Unknown names are ignored, so disconnect cleanup stays idempotent.
    pub async fn unregister(&self, name: &str) {
        if self.names.lock().await.remove(name) {
            info!("User removed: {}", name);
        }
    }

    /// Check whether a name is currently claimed
    pub async fn is_taken(&self, name: &str) -> bool {
        self.names.lock().await.contains(name)
    }
}
