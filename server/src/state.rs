//! Composition root state (§9: "construct them in a composition root, pass them
//! into handlers"). `AppState` is the one process-wide singleton shared across
//! route handlers.

use std::sync::Arc;

use dashmap::DashSet;
use reqwest::Client;

use crate::config::Config;
use crate::providers::diarizer::DiarizationProvider;
use crate::providers::summarizer::SummaryProvider;
use crate::providers::vector_store::VectorStore;
use crate::providers::{HttpDiarizationProvider, HttpSummaryProvider, HttpVectorStore};
use crate::registry::VoiceprintRegistry;
use crate::session::SessionStore;

pub struct AppState {
    pub config: Config,
    pub http_client: Client,
    pub diarization_provider: Arc<dyn DiarizationProvider>,
    pub summary_provider: Arc<dyn SummaryProvider>,
    pub vector_store: Arc<dyn VectorStore>,
    pub registry: Arc<VoiceprintRegistry>,
    pub session_store: SessionStore,
    pub in_flight: DashSet<String>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let http_client = Client::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;

        let vector_store: Arc<dyn VectorStore> = Arc::new(HttpVectorStore::new(
            http_client.clone(),
            config.vector_store_endpoint.clone(),
            config.vector_store_index.clone(),
        ));
        let diarization_provider: Arc<dyn DiarizationProvider> = Arc::new(HttpDiarizationProvider::new(
            http_client.clone(),
            config.transcription_provider_endpoint.clone(),
            config.transcription_provider_key.clone(),
        ));
        let summary_provider: Arc<dyn SummaryProvider> = Arc::new(HttpSummaryProvider::new(
            http_client.clone(),
            config.summary_provider_endpoint.clone(),
            config.summary_provider_key.clone(),
        ));
        let registry = Arc::new(VoiceprintRegistry::new(
            vector_store.clone(),
            config.voiceprint_mirror_path.clone(),
        ));
        let session_store = SessionStore::new(config.session_ttl);

        Ok(Arc::new(Self {
            http_client,
            diarization_provider,
            summary_provider,
            vector_store,
            registry,
            session_store,
            in_flight: DashSet::new(),
            config,
        }))
    }
}
