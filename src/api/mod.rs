mod handlers;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::missions::MissionService;

pub fn create_router(service: MissionService) -> Router {
    let api = Router::new()
        // Missions
        .route("/missions", get(handlers::list_missions))
        .route("/missions", post(handlers::define_mission))
        .route("/missions/{id}", get(handlers::get_mission_status))
        .route("/missions/{id}", delete(handlers::delete_mission))
        .route("/missions/{id}/activate", post(handlers::activate_mission))
        .route("/missions/{id}/attempts", post(handlers::submit_attempt))
        .route("/missions/{id}/abort", post(handlers::abort_mission))
        .route("/missions/{id}/checkpoints", get(handlers::list_checkpoints))
        .route("/missions/{id}/checkpoints", post(handlers::save_checkpoint))
        // Store
        .route("/store/metrics", get(handlers::store_metrics))
        .route("/store/flush", post(handlers::flush_store))
        .route("/store/sweep", post(handlers::sweep_store))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}
