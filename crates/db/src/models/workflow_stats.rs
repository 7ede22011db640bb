//! Workflow execution-count cache rows.

use agentdays_core::stats_cache::CachedCount;
use agentdays_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `workflow_stats_cache` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkflowStatsCacheEntry {
    pub id: DbId,
    pub workflow_name: String,
    pub execution_count: i64,
    pub cached_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WorkflowStatsCacheEntry {
    pub fn cached_count(&self) -> CachedCount {
        CachedCount {
            count: self.execution_count,
            cached_at: self.cached_at,
        }
    }
}

/// DTO for writing a freshly fetched count.
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertWorkflowStats {
    pub workflow_name: String,
    pub execution_count: i64,
    /// When the count was obtained; also written to `updated_at`.
    pub cached_at: Timestamp,
}
