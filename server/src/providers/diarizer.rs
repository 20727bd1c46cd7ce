//! Transcription + diarization provider (§1, out-of-scope collaborator, specified
//! only at its interface): given an audio file, returns utterances with
//! provider-local speaker labels plus the detected language.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// One turn of speech as reported by the provider. `speaker_label` is an opaque,
/// provider-assigned string (e.g. "A") with no meaning outside this meeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiarizedUtterance {
    pub speaker_label: String,
    pub text: String,
    pub start_ms: i64,
    pub end_ms: i64,
}

#[derive(Debug, Clone)]
pub struct DiarizationResult {
    pub utterances: Vec<DiarizedUtterance>,
    pub language: String,
}

#[async_trait]
pub trait DiarizationProvider: Send + Sync {
    async fn diarize(&self, audio_path: &Path) -> Result<DiarizationResult, AppError>;
}

#[derive(Deserialize)]
struct DiarizeResponse {
    utterances: Vec<DiarizedUtterance>,
    language: String,
}

/// Adapter that POSTs the audio file as multipart form data to a configured HTTP
/// endpoint and expects a JSON body of utterances + language back.
pub struct HttpDiarizationProvider {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpDiarizationProvider {
    pub fn new(client: Client, endpoint: String, api_key: String) -> Self {
        Self { client, endpoint, api_key }
    }
}

#[async_trait]
impl DiarizationProvider for HttpDiarizationProvider {
    async fn diarize(&self, audio_path: &Path) -> Result<DiarizationResult, AppError> {
        let bytes = tokio::fs::read(audio_path)
            .await
            .map_err(|e| AppError::InvalidInput(format!("cannot read upload: {e}")))?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("audio", part);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::ProviderError(format!("diarization request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::ProviderError(format!(
                "diarization provider returned {}",
                response.status()
            )));
        }

        let parsed: DiarizeResponse = response
            .json()
            .await
            .map_err(|e| AppError::ProviderError(format!("malformed diarization response: {e}")))?;

        Ok(DiarizationResult {
            utterances: parsed.utterances,
            language: parsed.language,
        })
    }
}
