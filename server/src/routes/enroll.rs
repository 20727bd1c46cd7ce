use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::Json;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

use super::dto::EnrollResponseDto;

pub async fn enroll(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> AppResult<Json<EnrollResponseDto>> {
    let mut name: Option<String> = None;
    let mut audio_path: Option<std::path::PathBuf> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or("") {
            "name" => {
                name = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::InvalidInput(format!("bad name field: {e}")))?,
                );
            }
            "audio" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("bad audio field: {e}")))?;
                tokio::fs::create_dir_all(&state.config.work_dir)
                    .await
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("cannot create work dir: {e}")))?;
                let path = state.config.work_dir.join(format!("enroll-upload-{}", uuid::Uuid::new_v4()));
                tokio::fs::write(&path, &bytes)
                    .await
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("cannot persist upload: {e}")))?;
                audio_path = Some(path);
            }
            _ => {}
        }
    }

    let name = name.ok_or_else(|| AppError::InvalidInput("missing name field".to_string()))?;
    if name.trim().is_empty() {
        return Err(AppError::InvalidInput("name must not be empty".to_string()));
    }
    let audio_path = audio_path.ok_or_else(|| AppError::InvalidInput("missing audio field".to_string()))?;

    let result = state.registry.enroll(&name, &audio_path, 2, &state.config.work_dir).await;
    let _ = tokio::fs::remove_file(&audio_path).await;
    let outcome = result?;

    Ok(Json(EnrollResponseDto {
        speaker: outcome.speaker,
        total_samples: outcome.total_samples,
        warning: outcome.warning,
    }))
}
