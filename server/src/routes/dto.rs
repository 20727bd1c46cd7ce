//! Request/response DTOs for the HTTP surface (§6), kept separate from the domain
//! types in the same spirit as the Tauri command layer this service's routes
//! replace: handlers convert into and out of these shapes rather than exposing
//! internal structs directly.

use serde::{Deserialize, Serialize};

use crate::matching::{Confidence, MatchResult};
use crate::providers::diarizer::DiarizedUtterance;

#[derive(Debug, Serialize)]
pub struct EnrollResponseDto {
    pub speaker: String,
    pub total_samples: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EnrollFromMeetingFormDto {
    pub meeting_id: String,
    pub speaker_id: String,
    pub speaker_name: String,
}

#[derive(Debug, Serialize)]
pub struct EnrollFromMeetingResponseDto {
    pub speaker: String,
    pub total_samples: u32,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmSpeakerFormDto {
    pub meeting_id: String,
    pub speaker_id: String,
    pub confirmed_name: String,
    #[serde(default)]
    pub enroll: bool,
}

#[derive(Debug, Serialize)]
pub struct OkDto {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct SpeakerListEntryDto {
    pub name: String,
    pub samples: u32,
}

#[derive(Debug, Serialize)]
pub struct SpeakerListResponseDto {
    pub speakers: Vec<SpeakerListEntryDto>,
}

#[derive(Debug, Serialize)]
pub struct SyncResponseDto {
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct MatchResultDto {
    pub confidence: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_name: Option<String>,
    pub top_score: f32,
    pub margin: f32,
    pub candidates: Vec<(String, f32)>,
}

impl From<&MatchResult> for MatchResultDto {
    fn from(m: &MatchResult) -> Self {
        Self {
            confidence: match m.confidence {
                Confidence::High => "high",
                Confidence::Medium => "medium",
                Confidence::Low => "low",
            },
            assigned_name: m.assigned_name.clone(),
            top_score: m.top_score,
            margin: m.margin,
            candidates: m.candidates.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeetingSnapshotDto {
    pub meeting_id: String,
    pub speakers: std::collections::HashMap<String, MatchResultDto>,
    pub utterances: Vec<DiarizedUtterance>,
    pub audio_duration_ms: i64,
    pub language: String,
    pub pending_speakers: Vec<String>,
    pub handled_speakers: Vec<String>,
    pub summary: Option<serde_json::Value>,
}

impl From<&crate::session::MeetingSession> for MeetingSnapshotDto {
    fn from(s: &crate::session::MeetingSession) -> Self {
        Self {
            meeting_id: s.meeting_id.clone(),
            speakers: s.speakers.iter().map(|(k, v)| (k.clone(), v.into())).collect(),
            utterances: s.utterances.clone(),
            audio_duration_ms: s.audio_duration_ms,
            language: s.language.clone(),
            pending_speakers: s.pending_speakers.iter().cloned().collect(),
            handled_speakers: s.handled_speakers.iter().cloned().collect(),
            summary: s.summary.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SummaryResponseDto {
    pub summary: serde_json::Value,
}
