//! Segment selector (C6): for each diarized speaker, assemble the audio sample that
//! best supports identification under the speaker-level duration/count constraints
//! of §4.6.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::audio;
use crate::error::AppResult;
use crate::providers::diarizer::DiarizedUtterance;

pub const STITCHING_TARGET_SPEECH_MS: i64 = 10_000;
pub const STITCHING_MAX_SINGLE_MS: i64 = 20_000;
pub const STITCHING_MIN_UTTERANCE_MS: i64 = 2_000;
pub const STITCHING_MAX_COUNT: usize = 5;
pub const MIN_IDENTIFICATION_SPEECH_MS: i64 = 8_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionResult {
    pub segments: Vec<(i64, i64)>,
    pub stitched_wav_path: Option<std::path::PathBuf>,
    pub speech_ms: i64,
    pub low_quality: bool,
}

/// Choose and stitch the segments used to identify one diarized speaker.
///
/// `utterances` must already be the speaker's own turns, sorted by `start_ms`.
/// `wav_path` is the full-meeting 16kHz mono WAV; `out_path` is where the stitched
/// clip is written (caller owns cleanup).
pub fn select_and_stitch(
    utterances: &[&DiarizedUtterance],
    wav_path: &Path,
    out_path: &Path,
    scratch_dir: &Path,
) -> AppResult<SelectionResult> {
    if utterances.is_empty() {
        return Ok(SelectionResult {
            segments: vec![],
            stitched_wav_path: None,
            speech_ms: 0,
            low_quality: true,
        });
    }

    let longest = utterances
        .iter()
        .max_by_key(|u| u.end_ms - u.start_ms)
        .expect("non-empty checked above");

    let scratch_prefix = out_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("selection")
        .to_string();

    let chosen: Vec<(i64, i64)> = if longest.end_ms - longest.start_ms >= STITCHING_TARGET_SPEECH_MS {
        let clipped_end = (longest.start_ms + STITCHING_MAX_SINGLE_MS).min(longest.end_ms);
        vec![(longest.start_ms, clipped_end)]
    } else {
        admit_by_descending_duration(utterances, wav_path, scratch_dir, &scratch_prefix)?
    };

    let mut ordered = chosen;
    ordered.sort_by_key(|&(start, _)| start);

    audio::stitch(wav_path, &ordered, out_path)?;
    let stitched = audio::read_wav(out_path)?;
    let speech_ms = audio::speech_duration_ms(&audio::strip_silence(&stitched));

    Ok(SelectionResult {
        segments: ordered,
        stitched_wav_path: Some(out_path.to_path_buf()),
        speech_ms,
        low_quality: speech_ms < MIN_IDENTIFICATION_SPEECH_MS,
    })
}

/// Admit utterances in descending duration order, gated by `STITCHING_MIN_UTTERANCE_MS`,
/// tracking the running post-VAD speech total of the already-admitted set, measured
/// once per candidate by extracting it to a scratch file.
fn admit_by_descending_duration(
    utterances: &[&DiarizedUtterance],
    wav_path: &Path,
    scratch_dir: &Path,
    scratch_prefix: &str,
) -> AppResult<Vec<(i64, i64)>> {
    let mut candidates: Vec<&DiarizedUtterance> = utterances.to_vec();
    candidates.sort_by_key(|u| std::cmp::Reverse(u.end_ms - u.start_ms));

    let mut chosen = Vec::new();
    let mut accumulated_ms: i64 = 0;

    for utterance in candidates {
        if chosen.len() == STITCHING_MAX_COUNT || accumulated_ms >= STITCHING_TARGET_SPEECH_MS {
            break;
        }
        let duration = utterance.end_ms - utterance.start_ms;
        if duration < STITCHING_MIN_UTTERANCE_MS {
            continue;
        }
        let scratch_path =
            scratch_dir.join(format!("{}-cand-{}-{}.wav", scratch_prefix, utterance.start_ms, chosen.len()));
        audio::extract(wav_path, utterance.start_ms, utterance.end_ms, &scratch_path)?;
        let wave = audio::read_wav(&scratch_path)?;
        let speech_ms = audio::speech_duration_ms(&audio::strip_silence(&wave));
        let _ = std::fs::remove_file(&scratch_path);

        chosen.push((utterance.start_ms, utterance.end_ms));
        accumulated_ms += speech_ms;
    }

    Ok(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utterance(start: i64, end: i64) -> DiarizedUtterance {
        DiarizedUtterance {
            speaker_label: "A".to_string(),
            text: String::new(),
            start_ms: start,
            end_ms: end,
        }
    }

    #[test]
    fn empty_utterances_yield_low_quality_empty_selection() {
        let refs: Vec<&DiarizedUtterance> = vec![];
        let dir = tempfile::tempdir().unwrap();
        let wav_path = dir.path().join("nonexistent.wav");
        let out_path = dir.path().join("out.wav");
        let result = select_and_stitch(&refs, &wav_path, &out_path, dir.path()).unwrap();
        assert!(result.segments.is_empty());
        assert!(result.low_quality);
        assert_eq!(result.speech_ms, 0);
    }

    fn write_16k_wav(path: &std::path::Path, samples: &[f32]) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn single_long_utterance_is_clipped_to_max_single() {
        let u = utterance(0, 25_000);
        let refs = vec![&u];
        let dir = tempfile::tempdir().unwrap();
        let wav_path = dir.path().join("in.wav");
        let samples: Vec<f32> = (0..(30_000 * 16))
            .map(|i| if (i / 16) % 2 == 0 { 0.5 } else { 0.0 })
            .collect();
        write_16k_wav(&wav_path, &samples);
        let out_path = dir.path().join("out.wav");
        let result = select_and_stitch(&refs, &wav_path, &out_path, dir.path()).unwrap();
        assert_eq!(result.segments, vec![(0, STITCHING_MAX_SINGLE_MS)]);
    }
}
