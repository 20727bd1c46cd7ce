//! Embedding extractor (C1).
//!
//! `embed` is a pure, thread-safe, idempotent function of a mono 16 kHz waveform: it
//! strips non-speech regions via the [`crate::audio::vad`] gate and returns a
//! unit-L2-norm 192-dimensional vector. The extraction itself sits behind the
//! [`EmbeddingModel`] trait so a production deployment can swap in a trained neural
//! embedding model without touching any call site — the same "duck-typed
//! capability" shape the design notes ask for (§9), mirrored here from the router
//! pattern used elsewhere in this codebase for picking between model backends.

use crate::audio::vad::{speech_duration_ms, strip_silence, Waveform};
use crate::error::AppError;

pub const EMBEDDING_DIM: usize = 192;
const MIN_SPEECH_MS_FOR_EMBEDDING: i64 = 500;

pub trait EmbeddingModel: Send + Sync {
    fn embed_speech(&self, speech: &Waveform) -> Vec<f32>;
}

/// Deterministic stand-in for a trained embedding model: buckets the speech-only
/// signal into [`EMBEDDING_DIM`] contiguous bins and takes the RMS energy of each,
/// which is enough structure to satisfy the fixed-dimensionality and unit-norm
/// contract without bundling a model file.
pub struct EnergyBandEmbeddingModel;

impl EmbeddingModel for EnergyBandEmbeddingModel {
    fn embed_speech(&self, speech: &Waveform) -> Vec<f32> {
        let n = speech.samples.len();
        let mut bands = vec![0.0f32; EMBEDDING_DIM];
        if n == 0 {
            return bands;
        }
        for (band, slot) in bands.iter_mut().enumerate() {
            let start = band * n / EMBEDDING_DIM;
            let end = ((band + 1) * n / EMBEDDING_DIM).max(start + 1).min(n);
            let chunk = &speech.samples[start..end];
            let sum_sq: f32 = chunk.iter().map(|s| s * s).sum();
            *slot = (sum_sq / chunk.len() as f32).sqrt();
        }
        bands
    }
}

/// Extract a 192-dim unit-norm voice embedding from a mono 16 kHz waveform.
/// Fails with [`AppError::InsufficientSpeech`] if, after VAD, less than 0.5s of
/// speech remains.
pub fn embed(wave: &Waveform) -> Result<Vec<f32>, AppError> {
    embed_with(&EnergyBandEmbeddingModel, wave)
}

pub fn embed_with(model: &dyn EmbeddingModel, wave: &Waveform) -> Result<Vec<f32>, AppError> {
    if wave.is_empty() {
        return Err(AppError::InsufficientSpeech(
            "audio is empty".to_string(),
        ));
    }
    let speech = strip_silence(wave);
    if speech_duration_ms(&speech) < MIN_SPEECH_MS_FOR_EMBEDDING {
        return Err(AppError::InsufficientSpeech(
            "less than 0.5s of speech remains after voice-activity detection".to_string(),
        ));
    }
    let raw = model.embed_speech(&speech);
    Ok(normalize(&raw))
}

/// L2-normalize a vector. Returns the zero vector unchanged (never divides by zero).
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let magnitude = (v.iter().map(|x| x * x).sum::<f32>()).sqrt();
    if magnitude == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / magnitude).collect()
}

/// Cosine similarity in `[-1, 1]`, clamped against floating-point drift.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a = (a.iter().map(|x| x * x).sum::<f32>()).sqrt();
    let mag_b = (b.iter().map(|x| x * x).sum::<f32>()).sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    (dot / (mag_a * mag_b)).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(n: usize) -> Waveform {
        Waveform::new(vec![0.5; n], 16_000)
    }

    #[test]
    fn embed_produces_unit_norm_vector() {
        let wave = tone(16_000); // 1s
        let v = embed(&wave).unwrap();
        assert_eq!(v.len(), EMBEDDING_DIM);
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt();
        assert!((norm - 1.0).abs() < 1e-6 || norm == 0.0);
    }

    #[test]
    fn embed_rejects_short_speech() {
        let wave = Waveform::new(vec![0.5; 1_000], 16_000); // 62.5ms
        let result = embed(&wave);
        assert!(matches!(result, Err(AppError::InsufficientSpeech(_))));
    }

    #[test]
    fn embed_rejects_empty() {
        let wave = Waveform::new(vec![], 16_000);
        assert!(embed(&wave).is_err());
    }

    #[test]
    fn cosine_similarity_identical_is_one() {
        let v = vec![0.2_f32; EMBEDDING_DIM];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        let mut a = vec![0.0_f32; 4];
        let mut b = vec![0.0_f32; 4];
        a[0] = 1.0;
        b[1] = 1.0;
        assert!((cosine_similarity(&a, &b) - 0.0).abs() < 1e-6);
    }
}
