//! Confirmation and enroll-from-meeting (C10): post-identification mutations that
//! resolve a pending speaker label to a name, per §4.10.

use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::matching::{Confidence, MatchResult};
use crate::registry::VoiceprintRegistry;
use crate::session::SessionStore;

/// `confirm-speaker(meeting_id, label, confirmed_name, enroll)`. Requires the label
/// to currently be pending with confidence `medium`.
pub async fn confirm_speaker(
    session_store: &SessionStore,
    registry: &Arc<VoiceprintRegistry>,
    meeting_id: &str,
    label: &str,
    confirmed_name: &str,
    enroll: bool,
) -> AppResult<()> {
    let session = session_store
        .get(meeting_id)
        .ok_or_else(|| AppError::NotFound(format!("no session for meeting {meeting_id}")))?;

    if !session.pending_speakers.contains(label) {
        return Err(AppError::InvalidInput(format!(
            "speaker {label} is not pending confirmation"
        )));
    }
    let existing = session
        .speakers
        .get(label)
        .ok_or_else(|| AppError::NotFound(format!("unknown speaker label {label}")))?;
    if !matches!(existing.confidence, Confidence::Medium) {
        return Err(AppError::InvalidInput(format!(
            "speaker {label} does not have medium confidence"
        )));
    }

    let is_low_quality = session.low_quality.get(label).copied().unwrap_or(false);
    if enroll && !is_low_quality {
        if let Some(embedding) = session.speaker_embeddings.get(label) {
            registry.enroll_from_meeting(confirmed_name, embedding).await?;
        }
    }

    let updated = MatchResult {
        confidence: Confidence::High,
        assigned_name: Some(confirmed_name.to_string()),
        top_score: existing.top_score,
        margin: existing.margin,
        candidates: existing.candidates.clone(),
    };
    session_store
        .mark_handled(meeting_id, label, updated)
        .ok_or_else(|| AppError::NotFound(format!("no session for meeting {meeting_id}")))?;
    session_store.cleanup_if_complete(meeting_id).await;
    Ok(())
}

/// `enroll-from-meeting(meeting_id, label, name)`. Requires the label's stored
/// segment not to be `low_quality`.
pub async fn enroll_from_meeting(
    session_store: &SessionStore,
    registry: &Arc<VoiceprintRegistry>,
    meeting_id: &str,
    label: &str,
    name: &str,
) -> AppResult<u32> {
    let session = session_store
        .get(meeting_id)
        .ok_or_else(|| AppError::NotFound(format!("no session for meeting {meeting_id}")))?;

    if session.low_quality.get(label).copied().unwrap_or(true) {
        return Err(AppError::InsufficientSpeech(format!(
            "speaker {label} has insufficient speech for enrollment"
        )));
    }

    let embedding = session
        .speaker_embeddings
        .get(label)
        .ok_or_else(|| AppError::NotFound(format!("no embedding stored for speaker {label}")))?;
    let total_samples = registry.enroll_from_meeting(name, embedding).await?;

    let existing = session.speakers.get(label);
    let updated = MatchResult {
        confidence: Confidence::High,
        assigned_name: Some(name.to_string()),
        top_score: existing.map(|m| m.top_score).unwrap_or(-1.0),
        margin: existing.map(|m| m.margin).unwrap_or(0.0),
        candidates: existing.map(|m| m.candidates.clone()).unwrap_or_default(),
    };
    session_store
        .mark_handled(meeting_id, label, updated)
        .ok_or_else(|| AppError::NotFound(format!("no session for meeting {meeting_id}")))?;
    session_store.cleanup_if_complete(meeting_id).await;
    Ok(total_samples)
}
