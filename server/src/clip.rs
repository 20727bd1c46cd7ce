//! Clip service (C11): build a VAD-cleaned playback clip from a session's stored
//! per-speaker segments, per §4.11.

use std::path::Path;

use crate::audio;
use crate::error::{AppError, AppResult};
use crate::session::SessionStore;

pub const CLIP_MAX_DURATION_MS: i64 = 5_000;

/// Build the clip for `meeting_id`/`label` at `out_path` and return it as a WAV
/// byte buffer. Fails with `NotFound` if the session, label, or audio file is gone.
pub async fn build_clip(
    session_store: &SessionStore,
    meeting_id: &str,
    label: &str,
    out_path: &Path,
) -> AppResult<Vec<u8>> {
    let session = session_store
        .get(meeting_id)
        .ok_or_else(|| AppError::NotFound(format!("no session for meeting {meeting_id}")))?;

    let segments = session
        .speaker_segments
        .get(label)
        .ok_or_else(|| AppError::NotFound(format!("no segments for speaker {label}")))?;

    if !session.audio_path.exists() {
        return Err(AppError::NotFound("meeting audio is no longer available".to_string()));
    }

    let audio_path = session.audio_path.clone();
    let segments = segments.clone();
    let out_path_owned = out_path.to_path_buf();
    let out_for_blocking = out_path_owned.clone();

    tokio::task::spawn_blocking(move || -> AppResult<()> {
        audio::stitch(&audio_path, &segments, &out_for_blocking)?;
        let stitched = audio::read_wav(&out_for_blocking)?;
        let cleaned = audio::strip_silence(&stitched);
        let truncated_samples = truncate_to_ms(&cleaned, CLIP_MAX_DURATION_MS);
        audio::toolkit::write_wav(&truncated_samples, cleaned.sample_rate, &out_for_blocking)
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!("clip build task panicked: {e}")))??;

    let bytes = tokio::fs::read(&out_path_owned)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("cannot read built clip: {e}")))?;
    let _ = tokio::fs::remove_file(&out_path_owned).await;
    Ok(bytes)
}

fn truncate_to_ms(wave: &audio::Waveform, max_ms: i64) -> Vec<f32> {
    let max_samples = ((max_ms as i64 * wave.sample_rate as i64) / 1000).max(0) as usize;
    wave.samples.iter().copied().take(max_samples).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Waveform;

    #[test]
    fn truncate_caps_at_max_duration() {
        let wave = Waveform::new(vec![0.5; 16_000 * 10], 16_000); // 10s
        let truncated = truncate_to_ms(&wave, CLIP_MAX_DURATION_MS);
        assert_eq!(truncated.len(), 16_000 * 5);
    }

    #[test]
    fn truncate_is_noop_when_shorter_than_max() {
        let wave = Waveform::new(vec![0.5; 16_000 * 2], 16_000); // 2s
        let truncated = truncate_to_ms(&wave, CLIP_MAX_DURATION_MS);
        assert_eq!(truncated.len(), wave.samples.len());
    }
}
