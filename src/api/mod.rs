//! API Module
//!
//! HTTP handlers and routing for the journal REST API.
//!
//! # Endpoints
//! - `GET /items` - Read a window of slots
//! - `GET /state` - Follower flags and count
//! - `POST /more` - Reload from the head
//! - `PUT /visibility` - Report first-item visibility
//! - `POST /recount` - Refresh the count
//! - `GET /stats` - Cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
