use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;

use crate::clip;
use crate::error::AppResult;
use crate::state::AppState;

pub async fn get_clip(
    State(state): State<Arc<AppState>>,
    Path((meeting_id, speaker_id)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    tokio::fs::create_dir_all(&state.config.work_dir).await.ok();
    let out_path = state
        .config
        .work_dir
        .join(format!("clip-{}-{}.wav", meeting_id, uuid::Uuid::new_v4()));
    let bytes = clip::build_clip(&state.session_store, &meeting_id, &speaker_id, &out_path).await?;
    Ok(([(header::CONTENT_TYPE, "audio/wav")], bytes))
}
