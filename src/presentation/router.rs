// Route table for the dashboard service
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    dashboard_page, get_dashboard, health_check, refresh, traffic_jams, update_filter,
};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(dashboard_page))
        .route("/healthz", get(health_check))
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/filter", post(update_filter))
        .route("/api/refresh", post(refresh))
        .route("/api/traffic_jams", get(traffic_jams))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
