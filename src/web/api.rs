use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::ApiState;

/// Routes for the read-only inspection API. Grounded on the teacher's
/// `web::api` router-building shape (one `get` route per resource, JSON
/// bodies via `axum::Json`), trimmed of its HTML dashboard templating.
pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/health", get(health))
        .route("/current-coin", get(current_coin))
        .route("/trades", get(trades))
        .route("/scout-history", get(scout_history))
        .route("/notifications", get(notifications))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<i64>,
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn current_coin(State(state): State<ApiState>) -> Json<Value> {
    match state.store.get_current_coin().await {
        Ok(Some(coin)) => Json(json!(coin)),
        Ok(None) => Json(json!(null)),
        Err(e) => Json(json!({ "error": e.to_string() })),
    }
}

async fn trades(State(state): State<ApiState>, Query(q): Query<LimitQuery>) -> Json<Value> {
    let limit = q.limit.unwrap_or(50).clamp(1, 500);
    match state.store.recent_trades(limit).await {
        Ok(trades) => Json(json!(trades)),
        Err(e) => Json(json!({ "error": e.to_string() })),
    }
}

async fn scout_history(State(state): State<ApiState>, Query(q): Query<LimitQuery>) -> Json<Value> {
    let limit = q.limit.unwrap_or(50).clamp(1, 500);
    match state.store.recent_scout_entries(limit).await {
        Ok(entries) => Json(json!(entries)),
        Err(e) => Json(json!({ "error": e.to_string() })),
    }
}

async fn notifications(State(state): State<ApiState>, Query(q): Query<LimitQuery>) -> Json<Value> {
    let limit = q.limit.unwrap_or(50).clamp(1, 500) as usize;
    let recent = state.notifications.get_recent(limit).await;
    Json(json!(recent))
}
