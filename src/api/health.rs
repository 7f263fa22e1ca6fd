use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::AppState;

const SERVICE: &str = "storeops";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(|| async { Json(json!({"service": SERVICE, "version": env!("CARGO_PKG_VERSION")})) }))
        .route("/health", get(health))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "service": SERVICE}))
}
