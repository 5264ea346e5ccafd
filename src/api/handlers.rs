//! API Handlers
//!
//! HTTP request handlers for each journal endpoint. Every handler forwards to
//! the journal owner task through its handle.

use axum::{
    extract::{Query, State},
    Json,
};

use crate::cache::TailSnapshot;
use crate::error::{CacheError, Result};
use crate::models::{
    HealthResponse, ItemsQuery, ItemsResponse, LoadMoreResponse, StatsResponse, VisibilityRequest,
};
use crate::provider::JournalRecord;
use crate::tasks::JournalHandle;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Client of the task owning the journal cache
    pub journal: JournalHandle<JournalRecord>,
}

impl AppState {
    pub fn new(journal: JournalHandle<JournalRecord>) -> Self {
        Self { journal }
    }
}

/// Handler for GET /items?start=&len=
///
/// Returns the requested window of slots. Slots whose page is still being
/// fetched come back with status "loading".
pub async fn items_handler(
    State(state): State<AppState>,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<ItemsResponse>> {
    if let Some(error_msg) = query.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let window = state.journal.items(query.start, query.len).await?;
    Ok(Json(ItemsResponse::from(window)))
}

/// Handler for GET /state
pub async fn state_handler(State(state): State<AppState>) -> Result<Json<TailSnapshot>> {
    Ok(Json(state.journal.state().await?))
}

/// Handler for POST /more
///
/// Reloads from the head of the journal and clears `has_more_items` once the
/// first page has landed.
pub async fn more_handler(State(state): State<AppState>) -> Result<Json<LoadMoreResponse>> {
    let started = state.journal.load_more().await?;
    let snapshot = state.journal.state().await?;

    Ok(Json(LoadMoreResponse {
        started,
        state: snapshot,
    }))
}

/// Handler for PUT /visibility
pub async fn visibility_handler(
    State(state): State<AppState>,
    Json(req): Json<VisibilityRequest>,
) -> Result<Json<TailSnapshot>> {
    let snapshot = state
        .journal
        .set_first_item_visible(req.first_item_is_visible)
        .await?;
    Ok(Json(snapshot))
}

/// Handler for POST /recount
pub async fn recount_handler(State(state): State<AppState>) -> Result<Json<TailSnapshot>> {
    state.journal.recount().await?;
    Ok(Json(state.journal.state().await?))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let stats = state.journal.stats().await?;
    Ok(Json(StatsResponse::from(stats)))
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let owner_running = state.journal.state().await.is_ok();
    Json(HealthResponse::new(owner_running))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TailFollower;
    use crate::config::CacheOptions;
    use crate::provider::MemoryJournal;
    use crate::tasks::{spawn_journal_owner, wait_for_window};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::task::JoinHandle;

    fn create_state(records: usize) -> (AppState, Arc<MemoryJournal>, JoinHandle<()>) {
        let journal = Arc::new(MemoryJournal::with_records(records));
        let tail = TailFollower::with_current_runtime(
            journal.clone(),
            CacheOptions::new(10, Duration::from_secs(60)),
        )
        .unwrap();
        let (handle, owner) = spawn_journal_owner(tail);
        (AppState::new(handle), journal, owner)
    }

    #[tokio::test]
    async fn test_items_handler() {
        let (state, _, _owner) = create_state(25);
        wait_for_window(&state.journal, 0, 5).await;

        let query = ItemsQuery { start: 0, len: 5 };
        let response = items_handler(State(state), Query(query)).await.unwrap();
        assert_eq!(response.count, 25);
        assert_eq!(response.items.len(), 5);
        assert_eq!(response.items[0].record.as_ref().unwrap().id, 24);
    }

    #[tokio::test]
    async fn test_items_handler_invalid_window() {
        let (state, _, _owner) = create_state(5);

        let query = ItemsQuery { start: 0, len: 0 };
        let result = items_handler(State(state), Query(query)).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_visibility_handler() {
        let (state, _, _owner) = create_state(5);

        let req = VisibilityRequest {
            first_item_is_visible: true,
        };
        let response = visibility_handler(State(state), Json(req)).await.unwrap();
        assert!(response.first_item_is_visible);
    }

    #[tokio::test]
    async fn test_more_handler() {
        let (state, journal, _owner) = create_state(5);
        wait_for_window(&state.journal, 0, 5).await;

        journal.append("test", "late");
        let response = more_handler(State(state.clone())).await.unwrap();
        assert!(response.started);

        let window = wait_for_window(&state.journal, 0, 10).await;
        assert_eq!(window.count, 6);
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let (state, _, _owner) = create_state(5);

        let response = stats_handler(State(state)).await.unwrap();
        assert_eq!(response.stats.hits, 0);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let (state, _, owner) = create_state(0);

        let response = health_handler(State(state.clone())).await;
        assert_eq!(response.status, "healthy");

        owner.abort();
        let _ = owner.await;
        let response = health_handler(State(state)).await;
        assert_eq!(response.status, "degraded");
    }
}
