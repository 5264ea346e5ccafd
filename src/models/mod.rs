//! Request and Response models for the journal API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{ItemsQuery, VisibilityRequest, MAX_WINDOW};
pub use responses::{
    ErrorResponse, HealthResponse, ItemsResponse, LoadMoreResponse, SlotView, StatsResponse,
};
