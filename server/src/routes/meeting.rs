use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

use super::dto::{MeetingSnapshotDto, OkDto, SummaryResponseDto};

pub async fn get_meeting(
    State(state): State<Arc<AppState>>,
    Path(meeting_id): Path<String>,
) -> AppResult<Json<MeetingSnapshotDto>> {
    let session = state
        .session_store
        .get(&meeting_id)
        .ok_or_else(|| AppError::NotFound(format!("no session for meeting {meeting_id}")))?;
    Ok(Json(MeetingSnapshotDto::from(&session)))
}

pub async fn cleanup_meeting(
    State(state): State<Arc<AppState>>,
    Path(meeting_id): Path<String>,
) -> AppResult<Json<OkDto>> {
    if state.session_store.get(&meeting_id).is_none() {
        return Err(AppError::NotFound(format!("no session for meeting {meeting_id}")));
    }
    state.session_store.delete(&meeting_id).await;
    Ok(Json(OkDto { ok: true }))
}

pub async fn post_summary(
    State(state): State<Arc<AppState>>,
    Path(meeting_id): Path<String>,
) -> AppResult<Json<SummaryResponseDto>> {
    let session = state
        .session_store
        .get(&meeting_id)
        .ok_or_else(|| AppError::NotFound(format!("no session for meeting {meeting_id}")))?;

    let mut speaker_names = std::collections::HashMap::new();
    for (label, result) in &session.speakers {
        if let Some(name) = &result.assigned_name {
            speaker_names.insert(label.clone(), name.clone());
        }
    }

    let summary = tokio::time::timeout(
        state.config.summary_timeout,
        state.summary_provider.summarize(&session.utterances, &speaker_names),
    )
    .await
    .map_err(|_| AppError::ProviderTimeout("summary provider timed out".to_string()))??;

    state.session_store.set_summary(&meeting_id, summary.0.clone());
    state.session_store.cleanup_if_complete(&meeting_id).await;

    Ok(Json(SummaryResponseDto { summary: summary.0 }))
}
