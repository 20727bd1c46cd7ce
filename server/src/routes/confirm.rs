use std::sync::Arc;

use axum::extract::{Form, State};
use axum::Json;

use crate::confirm;
use crate::error::AppResult;
use crate::state::AppState;

use super::dto::{ConfirmSpeakerFormDto, EnrollFromMeetingFormDto, EnrollFromMeetingResponseDto, OkDto};

pub async fn confirm_speaker(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ConfirmSpeakerFormDto>,
) -> AppResult<Json<OkDto>> {
    confirm::confirm_speaker(
        &state.session_store,
        &state.registry,
        &form.meeting_id,
        &form.speaker_id,
        &form.confirmed_name,
        form.enroll,
    )
    .await?;
    Ok(Json(OkDto { ok: true }))
}

pub async fn enroll_from_meeting(
    State(state): State<Arc<AppState>>,
    Form(form): Form<EnrollFromMeetingFormDto>,
) -> AppResult<Json<EnrollFromMeetingResponseDto>> {
    let total_samples = confirm::enroll_from_meeting(
        &state.session_store,
        &state.registry,
        &form.meeting_id,
        &form.speaker_id,
        &form.speaker_name,
    )
    .await?;
    Ok(Json(EnrollFromMeetingResponseDto { speaker: form.speaker_name, total_samples }))
}
