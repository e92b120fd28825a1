// --------------------------------------------------
// Handles API endpoints for houses, staff and
// the per-day task order of each staff member.
// --------------------------------------------------

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::app::AppState;
use crate::models::{Employee, Property};
use crate::routes_planning::store_failure;

fn ok() -> axum::response::Response {
    Json(serde_json::json!({ "success": true })).into_response()
}

// -----------------------------
// GET /api/maisons
// -----------------------------
pub async fn get_maisons(State(state): State<AppState>) -> impl IntoResponse {
    match state.properties.list().await {
        Ok(list) => Json(list).into_response(),
        Err(e) => store_failure(&e),
    }
}

// -----------------------------
// POST /api/maisons
// Replaces the whole house list
// -----------------------------
pub async fn put_maisons(State(state): State<AppState>, Json(list): Json<Vec<Property>>) -> impl IntoResponse {
    match state.properties.save_all(&list).await {
        Ok(()) => ok(),
        Err(e) => store_failure(&e),
    }
}

// -----------------------------
// DELETE /api/maisons/:id
// The house's planning file is kept
// -----------------------------
pub async fn delete_maison(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.properties.delete(&id).await {
        Ok(()) => ok(),
        Err(e) => store_failure(&e),
    }
}

// -----------------------------
// GET /api/employes
// -----------------------------
pub async fn get_employes(State(state): State<AppState>) -> impl IntoResponse {
    match state.staff.employees().await {
        Ok(list) => Json(list).into_response(),
        Err(e) => store_failure(&e),
    }
}

// -----------------------------
// POST /api/employes
// -----------------------------
pub async fn put_employes(State(state): State<AppState>, Json(list): Json<Vec<Employee>>) -> impl IntoResponse {
    match state.staff.save_employees(&list).await {
        Ok(()) => ok(),
        Err(e) => store_failure(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderQuery {
    pub date: String, // "YYYY-MM-DD"
}

fn valid_date(date: &str) -> bool {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok()
}

// -----------------------------
// GET /api/ordre-taches?date=YYYY-MM-DD
// -----------------------------
pub async fn get_order(State(state): State<AppState>, Query(q): Query<OrderQuery>) -> impl IntoResponse {
    if !valid_date(&q.date) {
        return (StatusCode::BAD_REQUEST, "invalid date").into_response();
    }
    match state.staff.day_order(&q.date).await {
        Ok(order) => Json(order).into_response(),
        Err(e) => store_failure(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct SaveOrderInput {
    pub date: String,
    pub employe: String,
    pub ordre: Vec<String>, // task ids
}

// -----------------------------
// POST /api/sauver-ordre-taches
// -----------------------------
pub async fn save_order(State(state): State<AppState>, Json(input): Json<SaveOrderInput>) -> impl IntoResponse {
    if !valid_date(&input.date) {
        return (StatusCode::BAD_REQUEST, "invalid date").into_response();
    }
    if input.employe.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "employe required").into_response();
    }
    match state.staff.save_order(&input.date, &input.employe, input.ordre).await {
        Ok(()) => ok(),
        Err(e) => store_failure(&e),
    }
}
