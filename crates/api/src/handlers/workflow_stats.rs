//! `get-workflow-stats` proxy function.

use agentdays_core::stats_cache::{should_refresh, WorkflowStatsRequest, WorkflowStatsResponse};
use agentdays_db::models::workflow_stats::{UpsertWorkflowStats, WorkflowStatsCacheEntry};
use agentdays_db::repositories::WorkflowStatsRepo;
use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use chrono::Utc;

use crate::error::{AppError, AppResult};
use crate::handlers::parse_json;
use crate::state::AppState;

/// POST /functions/v1/get-workflow-stats
///
/// Answers from `workflow_stats_cache` while the row is younger than the
/// TTL. Otherwise the count is fetched upstream and the row rewritten. If
/// that fetch fails and a stale row exists, the stale count is served.
pub async fn get_workflow_stats(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<WorkflowStatsResponse>> {
    let vellum = state.vellum()?;

    let request: WorkflowStatsRequest = if body.iter().all(u8::is_ascii_whitespace) {
        WorkflowStatsRequest::default()
    } else {
        parse_json(&body)?
    };

    let name = request.workflow_deployment_name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest(
            "workflowDeploymentName is required".to_string(),
        ));
    }

    let now = Utc::now();
    let cached = WorkflowStatsRepo::find_by_name(&state.pool, name).await?;

    let refresh = should_refresh(
        cached.as_ref().map(|entry| entry.cached_at),
        request.force_refresh,
        now,
        state.config.stats_ttl,
    );
    if let (false, Some(entry)) = (refresh, &cached) {
        tracing::debug!(workflow = %name, count = entry.execution_count, "Serving cached count");
        return Ok(Json(cached_response(entry)));
    }

    tracing::info!(workflow = %name, force = request.force_refresh, "Fetching execution count");

    let count = match vellum.fetch_execution_count(name).await {
        Ok(count) => count,
        Err(err) => match cached {
            Some(entry) => {
                tracing::warn!(
                    workflow = %name,
                    error = %err,
                    cached_at = %entry.cached_at,
                    "Refresh failed, serving stale count",
                );
                return Ok(Json(cached_response(&entry)));
            }
            None => return Err(err.into()),
        },
    };

    let entry = WorkflowStatsRepo::upsert(
        &state.pool,
        &UpsertWorkflowStats {
            workflow_name: name.to_string(),
            execution_count: count,
            cached_at: now,
        },
    )
    .await?;

    tracing::info!(workflow = %name, count, "Execution count refreshed");

    Ok(Json(WorkflowStatsResponse {
        count: entry.execution_count,
        cached: false,
        cached_at: Some(entry.cached_at),
    }))
}

fn cached_response(entry: &WorkflowStatsCacheEntry) -> WorkflowStatsResponse {
    WorkflowStatsResponse {
        count: entry.execution_count,
        cached: true,
        cached_at: Some(entry.cached_at),
    }
}
