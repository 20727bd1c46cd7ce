//! Session store (C8): in-memory meeting sessions with TTL, pending/handled
//! tracking, and the cleanup predicates from §3/§4.8. Protected by a single
//! `DashMap`; all operations are short and non-blocking per §5.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;

use crate::matching::MatchResult;
use crate::providers::diarizer::DiarizedUtterance;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingSession {
    pub meeting_id: String,
    pub device_id: Option<String>,
    pub audio_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub speakers: HashMap<String, MatchResult>,
    pub speaker_embeddings: HashMap<String, Vec<f32>>,
    pub speaker_segments: HashMap<String, Vec<(i64, i64)>>,
    pub low_quality: HashMap<String, bool>,
    pub utterances: Vec<DiarizedUtterance>,
    pub audio_duration_ms: i64,
    pub language: String,
    pub pending_speakers: HashSet<String>,
    pub handled_speakers: HashSet<String>,
    pub summary: Option<Value>,
}

/// A fresh 128-bit random identifier rendered as 32 hex characters (§4.8).
pub fn new_meeting_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub struct SessionStore {
    sessions: DashMap<String, MeetingSession>,
    device_sessions: DashMap<String, String>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self { sessions: DashMap::new(), device_sessions: DashMap::new(), ttl }
    }

    /// Insert a freshly built session. If `device_id` had a prior session, it is
    /// unconditionally cleaned up first (§4.8).
    pub async fn create(&self, session: MeetingSession) {
        if let Some(device_id) = session.device_id.clone() {
            if let Some((_, previous_id)) = self.device_sessions.remove(&device_id) {
                self.delete(&previous_id).await;
            }
            self.device_sessions.insert(device_id, session.meeting_id.clone());
        }
        self.sessions.insert(session.meeting_id.clone(), session);
    }

    pub fn get(&self, meeting_id: &str) -> Option<MeetingSession> {
        self.sessions.get(meeting_id).map(|r| r.clone())
    }

    /// Delete a session, unlinking its audio artifact. Best-effort on filesystem
    /// errors — a dangling temp file is not worth failing the caller's request over.
    pub async fn delete(&self, meeting_id: &str) {
        if let Some((_, session)) = self.sessions.remove(meeting_id) {
            let _ = fs::remove_file(&session.audio_path).await;
            if let Some(device_id) = session.device_id {
                self.device_sessions.remove_if(&device_id, |_, v| v == meeting_id);
            }
        }
    }

    pub fn mark_handled(
        &self,
        meeting_id: &str,
        label: &str,
        result: MatchResult,
    ) -> Option<()> {
        let mut entry = self.sessions.get_mut(meeting_id)?;
        entry.pending_speakers.remove(label);
        entry.handled_speakers.insert(label.to_string());
        entry.speakers.insert(label.to_string(), result);
        Some(())
    }

    pub fn set_summary(&self, meeting_id: &str, summary: Value) -> Option<()> {
        let mut entry = self.sessions.get_mut(meeting_id)?;
        entry.summary = Some(summary);
        Some(())
    }

    /// Delete the session iff `pending_speakers` is empty and a summary is present
    /// (§3, §4.8). Returns whether it was deleted.
    pub async fn cleanup_if_complete(&self, meeting_id: &str) -> bool {
        let complete = self
            .sessions
            .get(meeting_id)
            .map(|s| s.pending_speakers.is_empty() && s.summary.is_some())
            .unwrap_or(false);
        if complete {
            self.delete(meeting_id).await;
        }
        complete
    }

    /// Delete every session older than `ttl`. Run periodically by a background task.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| now.signed_duration_since(entry.created_at).to_std().unwrap_or_default() >= self.ttl)
            .map(|entry| entry.meeting_id.clone())
            .collect();
        for meeting_id in expired {
            self.delete(&meeting_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_session(meeting_id: &str, device_id: Option<&str>, audio_path: PathBuf) -> MeetingSession {
        MeetingSession {
            meeting_id: meeting_id.to_string(),
            device_id: device_id.map(|s| s.to_string()),
            audio_path,
            created_at: Utc::now(),
            speakers: HashMap::new(),
            speaker_embeddings: HashMap::new(),
            speaker_segments: HashMap::new(),
            low_quality: HashMap::new(),
            utterances: vec![],
            audio_duration_ms: 0,
            language: "en".to_string(),
            pending_speakers: HashSet::new(),
            handled_speakers: HashSet::new(),
            summary: None,
        }
    }

    #[test]
    fn meeting_id_is_32_hex_chars() {
        let id = new_meeting_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn new_request_from_same_device_replaces_prior_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(Duration::from_secs(3600));

        let first_audio = dir.path().join("first.wav");
        fs::write(&first_audio, b"x").await.unwrap();
        let first = empty_session("m1", Some("device-1"), first_audio.clone());
        store.create(first).await;
        assert!(store.get("m1").is_some());

        let second_audio = dir.path().join("second.wav");
        fs::write(&second_audio, b"y").await.unwrap();
        let second = empty_session("m2", Some("device-1"), second_audio);
        store.create(second).await;

        assert!(store.get("m1").is_none());
        assert!(store.get("m2").is_some());
        assert!(!first_audio.exists());
    }

    #[tokio::test]
    async fn cleanup_if_complete_requires_empty_pending_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let audio_path = dir.path().join("a.wav");
        fs::write(&audio_path, b"x").await.unwrap();

        let store = SessionStore::new(Duration::from_secs(3600));
        let mut session = empty_session("m1", None, audio_path.clone());
        session.pending_speakers.insert("A".to_string());
        store.create(session).await;

        assert!(!store.cleanup_if_complete("m1").await);

        store.set_summary("m1", serde_json::json!({"text": "ok"}));
        assert!(!store.cleanup_if_complete("m1").await); // pending still non-empty

        store.sessions.get_mut("m1").unwrap().pending_speakers.clear();
        assert!(store.cleanup_if_complete("m1").await);
        assert!(!audio_path.exists());
    }
}
