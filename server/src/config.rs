//! Startup configuration, loaded once from the environment.
//!
//! Required variables abort startup with a descriptive error (§6); everything else
//! falls back to the canonical defaults from §4 of the design.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,

    pub vector_store_endpoint: String,
    pub vector_store_index: String,
    pub transcription_provider_key: String,
    pub transcription_provider_endpoint: String,
    pub summary_provider_key: String,
    pub summary_provider_endpoint: String,
    pub webhook_url: Option<String>,

    pub work_dir: PathBuf,
    pub voiceprint_mirror_path: PathBuf,
    pub worker_threads: usize,

    pub session_ttl: Duration,
    pub transcription_timeout: Duration,
    pub summary_timeout: Duration,
    pub heartbeat_interval: Duration,
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("missing required environment variable {name}"))
}

fn env_var_opt(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Load configuration from the process environment. Fails fast if a required
    /// variable is absent, per §6 ("missing required variables abort initialization").
    pub fn from_env() -> Result<Self> {
        let bind_addr = env_var_opt("BIND_ADDR", "0.0.0.0");
        let port: u16 = env_var_opt("PORT", "8080")
            .parse()
            .context("PORT must be a valid u16")?;

        let vector_store_endpoint = env_var("VECTOR_STORE_ENDPOINT")?;
        let vector_store_index = env_var("VECTOR_STORE_INDEX")?;
        let transcription_provider_key = env_var("TRANSCRIPTION_PROVIDER_KEY")?;
        let transcription_provider_endpoint = env_var("TRANSCRIPTION_PROVIDER_ENDPOINT")?;
        let summary_provider_key = env_var("SUMMARY_PROVIDER_KEY")?;
        let summary_provider_endpoint = env_var("SUMMARY_PROVIDER_ENDPOINT")?;
        let webhook_url = std::env::var("WEBHOOK_URL").ok();

        let work_dir = PathBuf::from(env_var_opt("WORK_DIR", "/tmp/voiceid"));
        let voiceprint_mirror_path = PathBuf::from(env_var_opt(
            "VOICEPRINT_MIRROR_PATH",
            "/tmp/voiceid/voiceprints.json",
        ));
        let worker_threads: usize = env_var_opt("WORKER_THREADS", "4")
            .parse()
            .context("WORKER_THREADS must be a valid usize")?;

        Ok(Self {
            bind_addr,
            port,
            vector_store_endpoint,
            vector_store_index,
            transcription_provider_key,
            transcription_provider_endpoint,
            summary_provider_key,
            summary_provider_endpoint,
            webhook_url,
            work_dir,
            voiceprint_mirror_path,
            worker_threads,
            session_ttl: Duration::from_secs(60 * 60),
            transcription_timeout: Duration::from_secs(5 * 60),
            summary_timeout: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(15),
        })
    }

    /// Used by tests and by `--check-config` to validate without starting a listener.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}
