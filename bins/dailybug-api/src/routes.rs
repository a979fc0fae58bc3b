// Route table for the dailybug API

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/problem", get(handlers::get_problem))
        .route("/run", post(handlers::run_code))
        .route("/status", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
}
