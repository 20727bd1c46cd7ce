//! HTTP route handlers (§6) and the router they assemble into.

mod clip;
mod confirm;
mod device;
mod dto;
mod enroll;
mod healthz;
mod identify;
mod meeting;
mod speakers;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/enroll", post(enroll::enroll))
        .route("/api/enroll-from-meeting", post(confirm::enroll_from_meeting))
        .route("/api/identify", post(identify::identify))
        .route("/api/meeting/{id}", get(meeting::get_meeting))
        .route("/api/meeting/{id}/speaker/{sid}/clip", get(clip::get_clip))
        .route("/api/meeting/{id}/cleanup", post(meeting::cleanup_meeting))
        .route("/api/meeting/{id}/summary", post(meeting::post_summary))
        .route("/api/confirm-speaker", post(confirm::confirm_speaker))
        .route("/api/speakers", get(speakers::list_speakers))
        .route("/api/speakers/{name}", delete(speakers::delete_speaker))
        .route("/api/speakers/sync", post(speakers::sync_speakers))
        .route("/healthz", get(healthz::healthz))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(tower_http::trace::DefaultMakeSpan::new().include_headers(false)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
