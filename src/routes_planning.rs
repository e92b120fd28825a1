// --------------------------------------------------
// Handles API endpoints for a house's cleaning planning.
//
// Responsibilities:
// - Read / replace a house's task list
// - Toggle done, assign staff (user-owned fields)
// - Trigger a sync pass on demand
// --------------------------------------------------

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::app::AppState;
use crate::models::Task;
use crate::store::StoreError;

pub(crate) fn store_failure(e: &StoreError) -> axum::response::Response {
    match e {
        StoreError::InvalidKey(_) => (StatusCode::BAD_REQUEST, "invalid house name").into_response(),
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "not found").into_response(),
        _ => {
            error!(error = %e, "storage failure");
            (StatusCode::INTERNAL_SERVER_ERROR, "storage failure").into_response()
        }
    }
}

// -----------------------------
// GET /api/planning/:maison
// -----------------------------
pub async fn get_planning(State(state): State<AppState>, Path(maison): Path<String>) -> impl IntoResponse {
    match state.plannings.get(&maison).await {
        Ok(tasks) => Json(tasks).into_response(),
        Err(e) => store_failure(&e),
    }
}

// -----------------------------
// POST /api/planning/:maison
// Replaces the whole list (manual edits from the UI)
// -----------------------------
pub async fn put_planning(
    State(state): State<AppState>,
    Path(maison): Path<String>,
    Json(tasks): Json<Vec<Task>>,
) -> impl IntoResponse {
    match state.plannings.replace(&maison, tasks).await {
        Ok(_) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(e) => store_failure(&e),
    }
}

// -----------------------------
// POST /api/planning/:maison/:id/toggle
// -----------------------------
pub async fn toggle_task(
    State(state): State<AppState>,
    Path((maison, id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.plannings.toggle_done(&maison, &id).await {
        Ok(Some(task)) => Json(task).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "task not found").into_response(),
        Err(e) => store_failure(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct AssignInput {
    pub employe: String, // "" to unassign
}

// -----------------------------
// PUT /api/planning/:maison/:id/assign
// -----------------------------
pub async fn assign_task(
    State(state): State<AppState>,
    Path((maison, id)): Path<(String, String)>,
    Json(input): Json<AssignInput>,
) -> impl IntoResponse {
    match state.plannings.assign(&maison, &id, &input.employe).await {
        Ok(Some(task)) => Json(task).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "task not found").into_response(),
        Err(e) => store_failure(&e),
    }
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub synced: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

// -----------------------------
// POST /api/sync
// Runs a pass now; 409 while one is already running
// -----------------------------
pub async fn trigger_sync(State(state): State<AppState>) -> impl IntoResponse {
    let Some(report) = state.scheduler.run_pass().await else {
        return (StatusCode::CONFLICT, "sync already running").into_response();
    };

    let errors = report
        .results
        .iter()
        .filter_map(|(_, r)| r.as_ref().err().map(ToString::to_string))
        .collect();

    Json(SyncResponse {
        synced: report.synced(),
        skipped: report.skipped(),
        failed: report.failed(),
        errors,
    })
    .into_response()
}
