//! Repository for the `workflow_stats_cache` table.

use sqlx::PgPool;

use crate::models::workflow_stats::{UpsertWorkflowStats, WorkflowStatsCacheEntry};

/// Column list for `workflow_stats_cache` queries.
const COLUMNS: &str = "\
    id, workflow_name, execution_count, cached_at, created_at, updated_at";

/// Provides data access for cached workflow execution counts.
pub struct WorkflowStatsRepo;

impl WorkflowStatsRepo {
    /// Get the cached count for a workflow, if one was ever stored.
    pub async fn find_by_name(
        pool: &PgPool,
        workflow_name: &str,
    ) -> Result<Option<WorkflowStatsCacheEntry>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflow_stats_cache WHERE workflow_name = $1");
        sqlx::query_as::<_, WorkflowStatsCacheEntry>(&query)
            .bind(workflow_name)
            .fetch_optional(pool)
            .await
    }

    /// Insert or overwrite the cached count for a workflow.
    ///
    /// Uses `ON CONFLICT (workflow_name) DO UPDATE` and overwrites the count
    /// and both timestamps unconditionally; concurrent writers are
    /// last-write-wins.
    pub async fn upsert(
        pool: &PgPool,
        dto: &UpsertWorkflowStats,
    ) -> Result<WorkflowStatsCacheEntry, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflow_stats_cache \
                 (workflow_name, execution_count, cached_at, updated_at) \
             VALUES ($1, $2, $3, $3) \
             ON CONFLICT (workflow_name) DO UPDATE SET \
                 execution_count = EXCLUDED.execution_count, \
                 cached_at = EXCLUDED.cached_at, \
                 updated_at = EXCLUDED.updated_at \
             RETURNING {COLUMNS}"
        );
        let entry = sqlx::query_as::<_, WorkflowStatsCacheEntry>(&query)
            .bind(&dto.workflow_name)
            .bind(dto.execution_count)
            .bind(dto.cached_at)
            .fetch_one(pool)
            .await?;

        tracing::debug!(
            workflow = %entry.workflow_name,
            count = entry.execution_count,
            "Workflow stats cache row written",
        );
        Ok(entry)
    }
}
