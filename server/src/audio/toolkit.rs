//! Audio toolkit (C3): container transcoding, exclusive-end slicing, and stitching.
//!
//! Decoding arbitrary containers is delegated to `symphonia`, resampling to
//! `rubato`, and PCM WAV I/O to `hound` — the same division of labor the wider
//! example pack uses for audio pipelines, just without the live-capture and
//! GPU-accelerated transcription machinery this service doesn't need (that lives
//! behind the external diarization provider, §1).

use std::fs::File;
use std::path::Path;

use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::vad::Waveform;
use crate::error::AppError;

pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Decode any container symphonia supports into mono f32 samples at the container's
/// native rate, failing with `InvalidInput` if the file has no audio stream.
fn decode_to_mono_f32(path: &Path) -> Result<(Vec<f32>, u32), AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::InvalidInput(format!("cannot open audio file: {e}")))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|_| AppError::InvalidInput("unrecognized or missing audio stream".to_string()))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| AppError::InvalidInput("file has no audio stream".to_string()))?
        .clone();

    let source_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AppError::InvalidInput("audio stream has no sample rate".to_string()))?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AppError::InvalidInput(format!("unsupported codec: {e}")))?;

    let track_id = track.id;
    let mut mono: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(_)) => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(AppError::InvalidInput(format!("demux error: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                if sample_buf.is_none() {
                    let spec = *decoded.spec();
                    let duration = decoded.capacity() as u64;
                    sample_buf = Some(SampleBuffer::new(duration, spec));
                }
                if let Some(buf) = &mut sample_buf {
                    buf.copy_interleaved_ref(decoded);
                    let interleaved = buf.samples();
                    if channels <= 1 {
                        mono.extend_from_slice(interleaved);
                    } else {
                        for frame in interleaved.chunks(channels) {
                            let sum: f32 = frame.iter().sum();
                            mono.push(sum / channels as f32);
                        }
                    }
                }
            }
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(AppError::InvalidInput(format!("decode error: {e}"))),
        }
    }

    if mono.is_empty() {
        return Err(AppError::InvalidInput("file has no audio stream".to_string()));
    }
    Ok((mono, source_rate))
}

fn resample_to_16k(samples: Vec<f32>, source_rate: u32) -> Result<Vec<f32>, AppError> {
    if source_rate == TARGET_SAMPLE_RATE {
        return Ok(samples);
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = TARGET_SAMPLE_RATE as f64 / source_rate as f64;
    let chunk_size = samples.len().max(1);
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, 1)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("resampler init failed: {e}")))?;

    let waves_in = vec![samples];
    let waves_out = resampler
        .process(&waves_in, None)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("resample failed: {e}")))?;
    Ok(waves_out.into_iter().next().unwrap_or_default())
}

/// Write mono PCM samples at an arbitrary sample rate to a WAV file.
pub fn write_wav(samples: &[f32], sample_rate: u32, out_path: &Path) -> Result<(), AppError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(out_path, spec)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("cannot create wav: {e}")))?;
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer
            .write_sample((clamped * i16::MAX as f32) as i16)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("wav write failed: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("wav finalize failed: {e}")))?;
    Ok(())
}

fn write_wav_16k_mono(samples: &[f32], out_path: &Path) -> Result<(), AppError> {
    write_wav(samples, TARGET_SAMPLE_RATE, out_path)
}

/// Convert an arbitrary supported container into a 16 kHz mono PCM WAV file.
/// Fatal (`InvalidInput`) if the input has no audio stream.
pub fn to_wav_16k_mono(input_path: &Path, out_path: &Path) -> Result<(), AppError> {
    let (samples, source_rate) = decode_to_mono_f32(input_path)?;
    let resampled = resample_to_16k(samples, source_rate)?;
    write_wav_16k_mono(&resampled, out_path)
}

/// Load a 16 kHz mono WAV file into a [`Waveform`].
pub fn read_wav(path: &Path) -> Result<Waveform, AppError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| AppError::InvalidInput(format!("cannot read wav: {e}")))?;
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i32>()
            .map(|s| s.unwrap_or(0) as f32 / i16::MAX as f32)
            .collect(),
        hound::SampleFormat::Float => reader.samples::<f32>().map(|s| s.unwrap_or(0.0)).collect(),
    };
    Ok(Waveform::new(samples, spec.sample_rate))
}

fn ms_to_sample_index(ms: i64, sample_rate: u32) -> usize {
    ((ms.max(0) as i64 * sample_rate as i64) / 1000).max(0) as usize
}

/// Extract the exclusive-end slice `[t0_ms, t1_ms)` from `wav_path` into `out_path`.
pub fn extract(wav_path: &Path, t0_ms: i64, t1_ms: i64, out_path: &Path) -> Result<(), AppError> {
    if t1_ms <= t0_ms {
        return Err(AppError::InvalidInput(
            "extract requires t1_ms > t0_ms".to_string(),
        ));
    }
    let wave = read_wav(wav_path)?;
    let start = ms_to_sample_index(t0_ms, wave.sample_rate).min(wave.samples.len());
    let end = ms_to_sample_index(t1_ms, wave.sample_rate).min(wave.samples.len());
    let slice = wave.samples.get(start..end).unwrap_or(&[]).to_vec();
    write_wav_16k_mono(&slice, out_path)?;
    Ok(())
}

/// Concatenate the given `[t0, t1)` slices of `wav_path`, in order, with no gap.
pub fn stitch(wav_path: &Path, segments: &[(i64, i64)], out_path: &Path) -> Result<(), AppError> {
    let wave = read_wav(wav_path)?;
    let mut combined: Vec<f32> = Vec::new();
    for &(t0, t1) in segments {
        let start = ms_to_sample_index(t0, wave.sample_rate).min(wave.samples.len());
        let end = ms_to_sample_index(t1, wave.sample_rate).min(wave.samples.len());
        if end > start {
            combined.extend_from_slice(&wave.samples[start..end]);
        }
    }
    write_wav_16k_mono(&combined, out_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_test_wav(path: &Path, samples: &[f32]) {
        write_wav_16k_mono(samples, path).unwrap();
    }

    #[test]
    fn extract_is_exclusive_end() {
        let dir = tempdir().unwrap();
        let wav_path = dir.path().join("in.wav");
        // 1 second of samples at 16kHz, value equal to the sample index / max for easy checking.
        let samples: Vec<f32> = (0..16_000).map(|i| (i % 100) as f32 / 1000.0).collect();
        write_test_wav(&wav_path, &samples);

        let out_path = dir.path().join("out.wav");
        extract(&wav_path, 0, 500, &out_path).unwrap();
        let sliced = read_wav(&out_path).unwrap();
        assert_eq!(sliced.samples.len(), 8_000);
    }

    #[test]
    fn stitch_has_no_gap() {
        let dir = tempdir().unwrap();
        let wav_path = dir.path().join("in.wav");
        let samples: Vec<f32> = (0..16_000).map(|i| (i % 100) as f32 / 1000.0).collect();
        write_test_wav(&wav_path, &samples);

        let out_path = dir.path().join("stitched.wav");
        stitch(&wav_path, &[(0, 250), (500, 750)], &out_path).unwrap();
        let stitched = read_wav(&out_path).unwrap();
        // 250ms + 250ms of 16kHz audio == 8000 samples total, no gap inserted.
        assert_eq!(stitched.samples.len(), 8_000);
    }
}
