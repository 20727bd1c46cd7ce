//! Audio primitives: container transcoding/slicing (C3) and the VAD gate (C2).

pub mod toolkit;
pub mod vad;

pub use toolkit::{extract, read_wav, stitch, to_wav_16k_mono, TARGET_SAMPLE_RATE};
pub use vad::{speech_duration_ms, strip_silence, Waveform};
