//! Vector store adapter (C4): upsert/fetch/delete named 192-float vectors with
//! sample-count metadata, plus top-k cosine-similarity query. The store is the
//! source of truth for voiceprints (§4.5); this adapter does not retry failed
//! requests — failures are surfaced to the caller, which decides how to react.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub sample_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub name: String,
    pub vector: Vec<f32>,
    pub metadata: VectorMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    pub name: String,
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, name: &str, vector: &[f32], metadata: VectorMetadata) -> Result<(), AppError>;
    async fn get(&self, name: &str) -> Result<Option<VectorRecord>, AppError>;
    async fn delete(&self, name: &str) -> Result<(), AppError>;
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<VectorMatch>, AppError>;
    async fn list_all(&self) -> Result<Vec<VectorRecord>, AppError>;
}

/// Adapter over a generic vector-database HTTP API: one named index, reached as
/// `{endpoint}/indexes/{index}/...`.
pub struct HttpVectorStore {
    client: Client,
    endpoint: String,
    index: String,
}

impl HttpVectorStore {
    pub fn new(client: Client, endpoint: String, index: String) -> Self {
        Self { client, endpoint, index }
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/indexes/{}{}", self.endpoint.trim_end_matches('/'), self.index, suffix)
    }

    fn provider_err(context: &str, e: reqwest::Error) -> AppError {
        AppError::ProviderError(format!("{context}: {e}"))
    }
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    name: &'a str,
    vector: &'a [f32],
    metadata: VectorMetadata,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    vector: &'a [f32],
    k: usize,
}

#[derive(Deserialize)]
struct QueryResponse {
    matches: Vec<VectorMatch>,
}

#[derive(Deserialize)]
struct ListAllResponse {
    records: Vec<VectorRecord>,
}

#[async_trait]
impl VectorStore for HttpVectorStore {
    async fn upsert(&self, name: &str, vector: &[f32], metadata: VectorMetadata) -> Result<(), AppError> {
        let response = self
            .client
            .put(self.url(&format!("/vectors/{name}")))
            .json(&UpsertRequest { name, vector, metadata })
            .send()
            .await
            .map_err(|e| Self::provider_err("vector upsert failed", e))?;
        if !response.status().is_success() {
            return Err(AppError::ProviderError(format!(
                "vector store upsert returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<VectorRecord>, AppError> {
        let response = self
            .client
            .get(self.url(&format!("/vectors/{name}")))
            .send()
            .await
            .map_err(|e| Self::provider_err("vector get failed", e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AppError::ProviderError(format!(
                "vector store get returned {}",
                response.status()
            )));
        }
        let record: VectorRecord = response
            .json()
            .await
            .map_err(|e| Self::provider_err("malformed vector get response", e))?;
        Ok(Some(record))
    }

    async fn delete(&self, name: &str) -> Result<(), AppError> {
        let response = self
            .client
            .delete(self.url(&format!("/vectors/{name}")))
            .send()
            .await
            .map_err(|e| Self::provider_err("vector delete failed", e))?;
        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::ProviderError(format!(
                "vector store delete returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<VectorMatch>, AppError> {
        let response = self
            .client
            .post(self.url("/query"))
            .json(&QueryRequest { vector, k })
            .send()
            .await
            .map_err(|e| Self::provider_err("vector query failed", e))?;
        if !response.status().is_success() {
            return Err(AppError::ProviderError(format!(
                "vector store query returned {}",
                response.status()
            )));
        }
        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| Self::provider_err("malformed vector query response", e))?;
        Ok(parsed.matches)
    }

    async fn list_all(&self) -> Result<Vec<VectorRecord>, AppError> {
        let response = self
            .client
            .get(self.url("/vectors"))
            .send()
            .await
            .map_err(|e| Self::provider_err("vector list_all failed", e))?;
        if !response.status().is_success() {
            return Err(AppError::ProviderError(format!(
                "vector store list_all returned {}",
                response.status()
            )));
        }
        let parsed: ListAllResponse = response
            .json()
            .await
            .map_err(|e| Self::provider_err("malformed vector list_all response", e))?;
        Ok(parsed.records)
    }
}
