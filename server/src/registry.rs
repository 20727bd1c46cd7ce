//! Voiceprint registry (C5): enrollment, weighted averaging, EMA updates, and the
//! durable local mirror that accelerates listings without becoming a second source
//! of truth (§4.5). Writes for a given name are serialized by a per-name async
//! mutex, mirroring the registry's per-name single-writer model in §5; writes for
//! distinct names proceed independently.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;

use crate::audio::{self, Waveform};
use crate::embedding::{self, EMBEDDING_DIM};
use crate::error::{AppError, AppResult};
use crate::providers::vector_store::{VectorMetadata, VectorRecord, VectorStore};

/// EMA boundary: samples `n_old + 1 <= EMA_MIN_SAMPLES` use the weighted-mean rule;
/// beyond that, the exponential moving average rule takes over.
pub const EMA_MIN_SAMPLES: u32 = 4;
pub const EMA_ALPHA: f32 = 0.3;

pub const ENROLL_MIN_DURATION_MS: i64 = 5_000;
pub const ENROLL_MIN_SPEECH_MS: i64 = 3_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorEntry {
    pub samples: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollOutcome {
    pub speaker: String,
    pub total_samples: u32,
    pub warning: Option<String>,
}

/// In-process registry of voiceprints, backed by a [`VectorStore`] (source of truth)
/// and mirrored to a local JSON document for fast listings.
pub struct VoiceprintRegistry {
    store: Arc<dyn VectorStore>,
    mirror_path: PathBuf,
    name_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl VoiceprintRegistry {
    pub fn new(store: Arc<dyn VectorStore>, mirror_path: PathBuf) -> Self {
        Self {
            store,
            mirror_path,
            name_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        self.name_locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Enroll `weight` raw samples' worth of voice for `name` from an audio file on
    /// disk. Applies the duration gate (>=5s raw), converts to 16kHz mono, applies
    /// the VAD gate (>=3s speech), extracts the embedding, then runs the update rule.
    pub async fn enroll(
        &self,
        name: &str,
        audio_path: &std::path::Path,
        weight: u32,
        work_dir: &std::path::Path,
    ) -> AppResult<EnrollOutcome> {
        let wav_path = work_dir.join(format!("enroll-{}.wav", uuid::Uuid::new_v4()));
        audio::to_wav_16k_mono(audio_path, &wav_path)?;
        let wave = audio::read_wav(&wav_path)?;
        let raw_duration_ms = wave.duration_ms();
        let _ = fs::remove_file(&wav_path).await;

        if raw_duration_ms < ENROLL_MIN_DURATION_MS {
            return Err(AppError::InvalidInput(format!(
                "enrollment audio must be at least {ENROLL_MIN_DURATION_MS}ms, got {raw_duration_ms}ms"
            )));
        }

        let speech = audio::strip_silence(&wave);
        let speech_ms = audio::speech_duration_ms(&speech);
        if speech_ms < ENROLL_MIN_SPEECH_MS {
            return Err(AppError::InvalidInput(format!(
                "enrollment audio needs at least {ENROLL_MIN_SPEECH_MS}ms of speech, got {speech_ms}ms"
            )));
        }

        let v_new = embedding::embed(&wave)?;
        let warning = if speech_ms < ENROLL_MIN_DURATION_MS {
            Some(format!(
                "only {speech_ms}ms of speech detected after voice-activity filtering"
            ))
        } else {
            None
        };

        let total_samples = self.apply_update(name, &v_new, weight).await?;
        Ok(EnrollOutcome { speaker: name.to_string(), total_samples, warning })
    }

    /// Enroll using a pre-computed embedding (no re-extraction), per §4.5's
    /// `enroll_from_meeting` contract. Always weight 1.
    pub async fn enroll_from_meeting(&self, name: &str, embedding: &[f32]) -> AppResult<u32> {
        self.apply_update(name, embedding, 1).await
    }

    /// Apply the weighted-mean / EMA update rule under the per-name lock, write
    /// through to the vector store, then refresh the local mirror.
    async fn apply_update(&self, name: &str, v_new: &[f32], weight: u32) -> AppResult<u32> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let existing = self.store.get(name).await?;
        let (v_updated, sample_count) = match existing {
            Some(record) => {
                let n_old = record.metadata.sample_count;
                if n_old + 1 <= EMA_MIN_SAMPLES {
                    let blended: Vec<f32> = record
                        .vector
                        .iter()
                        .zip(v_new.iter())
                        .map(|(old, new)| {
                            (old * n_old as f32 + new * weight as f32) / (n_old + weight) as f32
                        })
                        .collect();
                    (embedding::normalize(&blended), n_old + weight)
                } else {
                    let blended: Vec<f32> = record
                        .vector
                        .iter()
                        .zip(v_new.iter())
                        .map(|(old, new)| (1.0 - EMA_ALPHA) * old + EMA_ALPHA * new)
                        .collect();
                    (embedding::normalize(&blended), n_old + 1)
                }
            }
            None => (embedding::normalize(v_new), weight),
        };

        self.store
            .upsert(name, &v_updated, VectorMetadata { sample_count })
            .await?;

        if let Err(e) = self.refresh_mirror_entry(name, sample_count).await {
            warn!(name, error = %e, "failed to update local voiceprint mirror; scheduling rebuild on next sync");
        }

        Ok(sample_count)
    }

    pub async fn delete(&self, name: &str) -> AppResult<()> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        self.store.delete(name).await?;
        let mut mirror = self.load_mirror().await.unwrap_or_default();
        mirror.remove(name);
        self.write_mirror(&mirror).await?;
        Ok(())
    }

    /// Rebuild the local mirror entirely from the vector store (the source of truth).
    pub async fn sync_from_store(&self) -> AppResult<usize> {
        let records = self.store.list_all().await?;
        let mut mirror = HashMap::new();
        for record in &records {
            mirror.insert(
                record.name.clone(),
                MirrorEntry { samples: record.metadata.sample_count, updated_at: Utc::now() },
            );
        }
        let count = mirror.len();
        self.write_mirror(&mirror).await?;
        Ok(count)
    }

    pub async fn list(&self) -> AppResult<Vec<(String, u32)>> {
        let mirror = self.load_mirror().await?;
        let mut entries: Vec<(String, u32)> =
            mirror.into_iter().map(|(name, entry)| (name, entry.samples)).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    pub async fn get(&self, name: &str) -> AppResult<Option<VectorRecord>> {
        self.store.get(name).await
    }

    async fn refresh_mirror_entry(&self, name: &str, sample_count: u32) -> AppResult<()> {
        let mut mirror = self.load_mirror().await.unwrap_or_default();
        mirror.insert(
            name.to_string(),
            MirrorEntry { samples: sample_count, updated_at: Utc::now() },
        );
        self.write_mirror(&mirror).await
    }

    async fn load_mirror(&self) -> AppResult<HashMap<String, MirrorEntry>> {
        match fs::read_to_string(&self.mirror_path).await {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt voiceprint mirror: {e}"))),
            Err(_) => Ok(HashMap::new()),
        }
    }

    /// Overwrite the mirror file atomically: write to a sibling temp file, then
    /// rename over the destination (§4.5, §6).
    async fn write_mirror(&self, mirror: &HashMap<String, MirrorEntry>) -> AppResult<()> {
        if let Some(parent) = self.mirror_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Internal(anyhow::anyhow!("cannot create mirror dir: {e}")))?;
        }
        let serialized = serde_json::to_vec_pretty(mirror)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("cannot serialize mirror: {e}")))?;
        let tmp_path = self.mirror_path.with_extension("json.tmp");
        fs::write(&tmp_path, &serialized)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("cannot write mirror temp file: {e}")))?;
        fs::rename(&tmp_path, &self.mirror_path)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("cannot rename mirror temp file: {e}")))?;
        Ok(())
    }
}

#[allow(dead_code)]
fn assert_embedding_dim(v: &[f32]) {
    debug_assert_eq!(v.len(), EMBEDDING_DIM);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::vector_store::VectorMatch;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct FakeStore {
        records: StdMutex<HashMap<String, VectorRecord>>,
    }

    impl FakeStore {
        fn new() -> Self {
            Self { records: StdMutex::new(HashMap::new()) }
        }
    }

    #[async_trait]
    impl VectorStore for FakeStore {
        async fn upsert(&self, name: &str, vector: &[f32], metadata: VectorMetadata) -> AppResult<()> {
            self.records.lock().unwrap().insert(
                name.to_string(),
                VectorRecord { name: name.to_string(), vector: vector.to_vec(), metadata },
            );
            Ok(())
        }
        async fn get(&self, name: &str) -> AppResult<Option<VectorRecord>> {
            Ok(self.records.lock().unwrap().get(name).cloned())
        }
        async fn delete(&self, name: &str) -> AppResult<()> {
            self.records.lock().unwrap().remove(name);
            Ok(())
        }
        async fn query(&self, _vector: &[f32], _k: usize) -> AppResult<Vec<VectorMatch>> {
            Ok(vec![])
        }
        async fn list_all(&self) -> AppResult<Vec<VectorRecord>> {
            Ok(self.records.lock().unwrap().values().cloned().collect())
        }
    }

    fn unit_vec(dims: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dims];
        v[hot] = 1.0;
        v
    }

    #[tokio::test]
    async fn first_enrollment_is_weight_as_sample_count() {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            VoiceprintRegistry::new(Arc::new(FakeStore::new()), dir.path().join("mirror.json"));
        let count = registry.apply_update("alice", &unit_vec(4, 0), 2).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn weighted_mean_regime_then_ema_regime() {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            VoiceprintRegistry::new(Arc::new(FakeStore::new()), dir.path().join("mirror.json"));

        registry.apply_update("bob", &unit_vec(4, 0), 2).await.unwrap(); // n=2
        let count = registry.apply_update("bob", &unit_vec(4, 0), 2).await.unwrap(); // n=4, still weighted-mean boundary
        assert_eq!(count, 4);

        // n_old=4, n_old+1=5 > EMA_MIN_SAMPLES(4) -> EMA regime, increments by 1.
        let count = registry.apply_update("bob", &unit_vec(4, 1), 1).await.unwrap();
        assert_eq!(count, 5);
    }

    #[tokio::test]
    async fn update_keeps_vector_unit_norm() {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            VoiceprintRegistry::new(Arc::new(FakeStore::new()), dir.path().join("mirror.json"));
        registry.apply_update("carol", &unit_vec(4, 0), 2).await.unwrap();
        registry.apply_update("carol", &unit_vec(4, 1), 5).await.unwrap();
        let record = registry.get("carol").await.unwrap().unwrap();
        let norm = (record.vector.iter().map(|x| x * x).sum::<f32>()).sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn delete_removes_from_mirror_and_store() {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            VoiceprintRegistry::new(Arc::new(FakeStore::new()), dir.path().join("mirror.json"));
        registry.apply_update("dana", &unit_vec(4, 0), 2).await.unwrap();
        registry.refresh_mirror_entry("dana", 2).await.unwrap();
        registry.delete("dana").await.unwrap();
        assert!(registry.get("dana").await.unwrap().is_none());
        let listed = registry.list().await.unwrap();
        assert!(listed.iter().all(|(name, _)| name != "dana"));
    }
}
