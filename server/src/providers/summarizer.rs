//! Text summarization provider (§1, out-of-scope collaborator): given a labeled
//! transcript, returns a structured summary object.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::providers::diarizer::DiarizedUtterance;

/// Opaque structured summary; the shape is owned by the summarization provider, not
/// by this service, so it is passed through as-is rather than modeled field by field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary(pub Value);

#[async_trait]
pub trait SummaryProvider: Send + Sync {
    async fn summarize(
        &self,
        utterances: &[DiarizedUtterance],
        speaker_names: &std::collections::HashMap<String, String>,
    ) -> Result<Summary, AppError>;
}

#[derive(Serialize)]
struct SummarizeRequest<'a> {
    utterances: &'a [DiarizedUtterance],
    speaker_names: &'a std::collections::HashMap<String, String>,
}

pub struct HttpSummaryProvider {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpSummaryProvider {
    pub fn new(client: Client, endpoint: String, api_key: String) -> Self {
        Self { client, endpoint, api_key }
    }
}

#[async_trait]
impl SummaryProvider for HttpSummaryProvider {
    async fn summarize(
        &self,
        utterances: &[DiarizedUtterance],
        speaker_names: &std::collections::HashMap<String, String>,
    ) -> Result<Summary, AppError> {
        let body = SummarizeRequest { utterances, speaker_names };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ProviderError(format!("summary request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::ProviderError(format!(
                "summary provider returned {}",
                response.status()
            )));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| AppError::ProviderError(format!("malformed summary response: {e}")))?;
        Ok(Summary(value))
    }
}
