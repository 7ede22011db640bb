pub mod health;

use axum::routing::post;
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/functions/v1` route tree.
///
/// ```text
/// /execute-workflow        run a workflow deployment (POST)
/// /get-workflow-stats      cached execution count (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/execute-workflow",
            post(handlers::execute_workflow::execute_workflow),
        )
        .route(
            "/get-workflow-stats",
            post(handlers::workflow_stats::get_workflow_stats),
        )
}
