//! Response DTOs for the journal API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{CacheStats, SlotState, TailSnapshot};
use crate::provider::JournalRecord;
use crate::tasks::ItemsWindow;

/// One slot as seen by a client
#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    pub index: usize,
    /// "loaded", "loading" or "failed"
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<JournalRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SlotView {
    pub fn new(index: usize, state: SlotState<JournalRecord>) -> Self {
        let (status, record, error) = match state {
            SlotState::Loading => ("loading", None, None),
            SlotState::Loaded(record) => ("loaded", Some(record), None),
            SlotState::Failed(message) => ("failed", None, Some(message.to_string())),
        };
        Self {
            index,
            status,
            record,
            error,
        }
    }
}

/// Response body for GET /items
#[derive(Debug, Clone, Serialize)]
pub struct ItemsResponse {
    pub start: usize,
    /// Total records known to the cache
    pub count: usize,
    pub items: Vec<SlotView>,
}

impl From<ItemsWindow<JournalRecord>> for ItemsResponse {
    fn from(window: ItemsWindow<JournalRecord>) -> Self {
        Self {
            start: window.start,
            count: window.count,
            items: window
                .items
                .into_iter()
                .map(|(index, state)| SlotView::new(index, state))
                .collect(),
        }
    }
}

/// Response body for POST /more
#[derive(Debug, Clone, Serialize)]
pub struct LoadMoreResponse {
    /// False when a reload was already running
    pub started: bool,
    pub state: TailSnapshot,
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            stats,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy" while the journal owner answers, "degraded" otherwise
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn new(owner_running: bool) -> Self {
        let status = if owner_running { "healthy" } else { "degraded" };
        Self {
            status: status.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    fn record(id: i64) -> JournalRecord {
        JournalRecord {
            id,
            timestamp: Utc::now(),
            source: "test".to_string(),
            message: format!("line {}", id),
        }
    }

    #[test]
    fn test_slot_view_statuses() {
        let loaded = serde_json::to_value(SlotView::new(0, SlotState::Loaded(record(7)))).unwrap();
        assert_eq!(loaded["status"], "loaded");
        assert_eq!(loaded["record"]["id"], 7);
        assert!(loaded.get("error").is_none());

        let loading = serde_json::to_value(SlotView::new(1, SlotState::Loading)).unwrap();
        assert_eq!(loading["status"], "loading");
        assert!(loading.get("record").is_none());

        let failed =
            serde_json::to_value(SlotView::new(2, SlotState::Failed(Arc::from("boom")))).unwrap();
        assert_eq!(failed["status"], "failed");
        assert_eq!(failed["error"], "boom");
    }

    #[test]
    fn test_items_response_from_window() {
        let window = ItemsWindow {
            start: 4,
            count: 10,
            items: vec![(4, SlotState::Loaded(record(4))), (5, SlotState::Loading)],
        };
        let resp = ItemsResponse::from(window);
        assert_eq!(resp.count, 10);
        assert_eq!(resp.items[1].index, 5);
        assert_eq!(resp.items[1].status, "loading");
    }

    #[test]
    fn test_stats_response_flattens() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_miss();
        let json = serde_json::to_value(StatsResponse::from(stats)).unwrap();
        assert_eq!(json["hits"], 1);
        assert!((json["hit_rate"].as_f64().unwrap() - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_health_response_serialize() {
        let json = serde_json::to_string(&HealthResponse::new(true)).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
        assert_eq!(HealthResponse::new(false).status, "degraded");
    }

    #[test]
    fn test_error_response_serialize() {
        let json = serde_json::to_string(&ErrorResponse::new("Something went wrong")).unwrap();
        assert!(json.contains("Something went wrong"));
    }
}
