//! Request DTOs for the journal API
//!
//! Defines the structure of incoming query strings and request bodies.

use serde::Deserialize;

/// Largest window a single items request may ask for
pub const MAX_WINDOW: usize = 1000;

fn default_len() -> usize {
    50
}

/// Query string for GET /items
///
/// # Fields
/// - `start`: Index of the first slot (default 0)
/// - `len`: Number of slots to read (default 50, at most [`MAX_WINDOW`])
#[derive(Debug, Clone, Deserialize)]
pub struct ItemsQuery {
    #[serde(default)]
    pub start: usize,
    #[serde(default = "default_len")]
    pub len: usize,
}

impl ItemsQuery {
    /// Returns an error message if the window is unusable, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.len == 0 {
            return Some("len must be at least 1".to_string());
        }
        if self.len > MAX_WINDOW {
            return Some(format!("len exceeds maximum window of {}", MAX_WINDOW));
        }
        None
    }
}

/// Request body for PUT /visibility
#[derive(Debug, Clone, Deserialize)]
pub struct VisibilityRequest {
    /// Whether the consumer currently shows the first item
    pub first_item_is_visible: bool,
}
