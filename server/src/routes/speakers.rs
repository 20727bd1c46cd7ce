use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

use super::dto::{OkDto, SpeakerListEntryDto, SpeakerListResponseDto, SyncResponseDto};

pub async fn list_speakers(State(state): State<Arc<AppState>>) -> AppResult<Json<SpeakerListResponseDto>> {
    let entries = state.registry.list().await?;
    Ok(Json(SpeakerListResponseDto {
        speakers: entries
            .into_iter()
            .map(|(name, samples)| SpeakerListEntryDto { name, samples })
            .collect(),
    }))
}

pub async fn delete_speaker(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> AppResult<Json<OkDto>> {
    if state.registry.get(&name).await?.is_none() {
        return Err(AppError::NotFound(format!("no enrolled speaker named {name}")));
    }
    state.registry.delete(&name).await?;
    Ok(Json(OkDto { ok: true }))
}

pub async fn sync_speakers(State(state): State<Arc<AppState>>) -> AppResult<Json<SyncResponseDto>> {
    let count = state.registry.sync_from_store().await?;
    Ok(Json(SyncResponseDto { count }))
}
