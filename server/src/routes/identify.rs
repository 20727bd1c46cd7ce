use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use futures_util::stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};
use crate::pipeline::{self, PipelineEvent};
use crate::state::AppState;

use super::device::device_id;

/// `POST /api/identify`: persists the upload, then streams `progress`/heartbeat/
/// `done`-or-`error` events per §4.9. Client disconnect cancels the cancellation
/// token passed into the pipeline (dropped guard below), which the pipeline checks
/// between stages.
pub async fn identify(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let device = device_id(&headers);

    let mut audio_path: Option<std::path::PathBuf> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("malformed multipart body: {e}")))?
    {
        if field.name() == Some("audio") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::InvalidInput(format!("bad audio field: {e}")))?;
            tokio::fs::create_dir_all(&state.config.work_dir)
                .await
                .map_err(|e| AppError::Internal(anyhow::anyhow!("cannot create work dir: {e}")))?;
            let path = state.config.work_dir.join(format!("upload-{}", uuid::Uuid::new_v4()));
            tokio::fs::write(&path, &bytes)
                .await
                .map_err(|e| AppError::Internal(anyhow::anyhow!("cannot persist upload: {e}")))?;
            audio_path = Some(path);
        }
    }
    let audio_path = audio_path.ok_or_else(|| AppError::InvalidInput("missing audio field".to_string()))?;

    let cancel = CancellationToken::new();
    let stream = pipeline::run(state, device, audio_path, cancel.clone()).await?;

    let cancel_on_drop = CancelOnDrop(cancel);
    let sse_stream = stream.map(move |event| {
        let _ = &cancel_on_drop; // keep alive; cancels the pipeline when this stream drops
        Ok(to_sse_event(event))
    });

    Ok(Sse::new(sse_stream))
}

fn to_sse_event(event: PipelineEvent) -> Event {
    match event {
        PipelineEvent::Heartbeat => Event::default().comment("hb"),
        PipelineEvent::Progress { stage, message } => Event::default()
            .event("progress")
            .json_data(serde_json::json!({ "stage": stage, "message": message }))
            .unwrap_or_else(|_| Event::default().event("progress")),
        PipelineEvent::Done { meeting_id, speakers, utterances, audio_duration_ms, language } => {
            Event::default()
                .event("done")
                .json_data(serde_json::json!({
                    "meeting_id": meeting_id,
                    "speakers": speakers,
                    "utterances": utterances,
                    "audio_duration_ms": audio_duration_ms,
                    "language": language,
                }))
                .unwrap_or_else(|_| Event::default().event("done"))
        }
        PipelineEvent::Error { message } => Event::default()
            .event("error")
            .json_data(serde_json::json!({ "message": message }))
            .unwrap_or_else(|_| Event::default().event("error")),
    }
}

/// Cancels the pipeline's [`CancellationToken`] when the SSE stream itself is
/// dropped, which axum does as soon as the client disconnects.
struct CancelOnDrop(CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
