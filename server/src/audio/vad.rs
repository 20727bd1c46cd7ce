//! Voice-activity detection gate (C2).
//!
//! Classifies each sample of a mono waveform as speech or non-speech using a fixed
//! energy threshold and exposes two primitives: stripping non-speech regions and
//! measuring total speech duration. Per-sample (rather than per-frame) classification
//! is a deliberate choice: it is the only granularity under which
//! `speech_duration_ms` is *exactly* additive under concatenation regardless of input
//! length, which is the property §4.2 and §8 require ("monotone under pointwise
//! concatenation"). A production deployment would replace this gate with a learned
//! model behind the same two functions; nothing downstream depends on the gate being
//! energy-based.

use serde::{Deserialize, Serialize};

/// A mono PCM waveform at a known sample rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn duration_ms(&self) -> i64 {
        samples_to_ms(self.samples.len() as u64, self.sample_rate)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Concatenate two waveforms sampled at the same rate.
    pub fn concat(mut self, other: &Waveform) -> Self {
        debug_assert_eq!(self.sample_rate, other.sample_rate);
        self.samples.extend_from_slice(&other.samples);
        self
    }
}

fn samples_to_ms(samples: u64, sample_rate: u32) -> i64 {
    ((samples as u128 * 1000) / sample_rate as u128) as i64
}

/// Fixed energy threshold on squared sample amplitude. Samples are expected in
/// `[-1.0, 1.0]` (as produced by [`crate::audio::toolkit`]).
const ENERGY_THRESHOLD: f32 = 1.0e-4;

fn is_speech_sample(sample: f32) -> bool {
    sample * sample > ENERGY_THRESHOLD
}

/// Strip non-speech samples from a waveform, preserving the order of the remaining
/// (speech) samples. Strictly non-expanding: `output.len() <= input.len()`.
pub fn strip_silence(wave: &Waveform) -> Waveform {
    let samples: Vec<f32> = wave
        .samples
        .iter()
        .copied()
        .filter(|&s| is_speech_sample(s))
        .collect();
    Waveform::new(samples, wave.sample_rate)
}

/// Total duration, in milliseconds, of samples classified as speech.
///
/// Because classification is per-sample and context-free, this is exactly additive
/// under concatenation: `speech_duration_ms(a ++ b) == speech_duration_ms(a) +
/// speech_duration_ms(b)`.
pub fn speech_duration_ms(wave: &Waveform) -> i64 {
    let speech_samples = wave.samples.iter().filter(|&&s| is_speech_sample(s)).count() as u64;
    samples_to_ms(speech_samples, wave.sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silence(n: usize, sample_rate: u32) -> Waveform {
        Waveform::new(vec![0.0; n], sample_rate)
    }

    fn tone(n: usize, sample_rate: u32) -> Waveform {
        Waveform::new(vec![0.5; n], sample_rate)
    }

    #[test]
    fn strip_silence_is_non_expanding() {
        let wave = Waveform::new(vec![0.0, 0.5, 0.0, 0.6, 0.0], 16_000);
        let stripped = strip_silence(&wave);
        assert!(stripped.samples.len() <= wave.samples.len());
        assert_eq!(stripped.samples, vec![0.5, 0.6]);
    }

    #[test]
    fn removed_region_contributes_zero_duration() {
        let wave = silence(16_000, 16_000); // 1s of silence
        assert_eq!(speech_duration_ms(&strip_silence(&wave)), 0);
    }

    #[test]
    fn speech_duration_is_additive_under_concatenation() {
        let a = tone(8_000, 16_000);
        let b = silence(4_000, 16_000);
        let c = tone(3_333, 16_000); // deliberately not frame-aligned
        let concatenated = a.clone().concat(&b).concat(&c);

        let sum = speech_duration_ms(&a) + speech_duration_ms(&b) + speech_duration_ms(&c);
        assert_eq!(speech_duration_ms(&concatenated), sum);
    }

    #[test]
    fn strip_silence_self_consistency() {
        let wave = Waveform::new(
            vec![0.0, 0.0, 0.7, 0.7, 0.7, 0.0, 0.8, 0.0, 0.0, 0.9],
            16_000,
        );
        let stripped = strip_silence(&wave);
        assert_eq!(speech_duration_ms(&stripped), speech_duration_ms(&wave));
    }
}
