use crate::api::routes::AppState;
use axum::{Json, extract::State};
use serde_json::{Value, json};

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let connections = state.registry.connections();
    let connected = connections.iter().filter(|c| c.is_connected()).count();

    Json(json!({
        "status": "ok",
        "kieservers": {
            "configured": connections.len(),
            "connected": connected,
        },
        "scheduled_jobs": state.scheduler.pending_jobs().await,
    }))
}
