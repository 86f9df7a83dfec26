//! Avatar color allocator
//!
//! Hands out display colors from a fixed palette, one per connected user,
//! and takes them back on disconnect.

use rand::Rng;
use tokio::sync::Mutex;
use tracing::debug;

use crate::types::Color;

/// Fixed avatar palette (distinguishable hues, dark text friendly)
pub const PALETTE: [&str; 12] = [
    "#e6194b", "#3cb44b", "#ffe119", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6",
    "#bcf60c", "#fabebe", "#008080", "#e6beff",
];

/// Allocator over the fixed palette
///
/// `allocate` prefers an unused entry, chosen at random so early joiners do
/// not always get the same hue. Once the palette is exhausted further
/// allocations reuse random entries; such duplicates are not tracked, and
/// releasing them is a no-op, so the free list never exceeds the palette.
#[derive(Debug)]
pub struct ColorAllocator {
    free: Mutex<Vec<Color>>,
}

impl ColorAllocator {
    /// Create an allocator with the whole palette free
    pub fn new() -> Self {
        Self {
            free: Mutex::new(PALETTE.iter().map(|&hex| Color(hex)).collect()),
        }
    }

    /// Assign a color for a newly joined user
    pub async fn allocate(&self) -> Color {
        let mut free = self.free.lock().await;
        if free.is_empty() {
            let index = rand::thread_rng().gen_range(0..PALETTE.len());
            let color = Color(PALETTE[index]);
            debug!("Palette exhausted, reusing {}", color);
            return color;
        }
        let index = rand::thread_rng().gen_range(0..free.len());
        free.swap_remove(index)
    }

    /// Return a color when its user disconnects
    ///
    /// Releasing a color that is already free (or was an over-capacity
    /// duplicate) is a no-op.
    pub async fn release(&self, color: Color) {
        let mut free = self.free.lock().await;
        if free.len() < PALETTE.len() && !free.contains(&color) {
            free.push(color);
        }
    }
}

impl Default for ColorAllocator {
    fn default() -> Self {
        Self::new()
    }
}
