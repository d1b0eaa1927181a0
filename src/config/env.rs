//! Environment variable loading.
//!
//! Builds a [`ServerConfig`] from environment variables (including values
//! loaded from `.env` at startup) on top of the defaults.

use std::path::PathBuf;

use super::ServerConfig;
use super::TlsConfig;
use super::utils::{env_var, parse_env, parse_env_bool, parse_env_opt};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_LANGUAGE: &str = "ja";
pub const DEFAULT_SETUP_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_CLIENT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_UPSTREAM_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_TOOL_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_WAIT_HINT_DELAY_MS: u64 = 2_000;
pub const DEFAULT_NOTIFY_TOOL_ACTIVITY: bool = true;
pub const DEFAULT_RATE_LIMIT_RPS: u32 = 60;
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 10;

/// Load configuration from the environment.
pub fn load_from_env() -> Result<ServerConfig, String> {
    let mut config = ServerConfig::default();

    // Server
    if let Some(host) = env_var("HOST") {
        config.host = host;
    }
    config.port = parse_env("PORT", config.port)?;
    if parse_env_bool("TLS_ENABLED", false)? {
        config.tls = Some(TlsConfig {
            cert_path: env_var("TLS_CERT_PATH")
                .map(PathBuf::from)
                .ok_or("TLS_ENABLED is set but TLS_CERT_PATH is missing")?,
            key_path: env_var("TLS_KEY_PATH")
                .map(PathBuf::from)
                .ok_or("TLS_ENABLED is set but TLS_KEY_PATH is missing")?,
        });
    }

    // OpenAI Realtime
    config.openai_api_key = env_var("OPENAI_API_KEY");
    if let Some(url) = env_var("OPENAI_REALTIME_URL") {
        config.openai_realtime_url = url;
    }
    if let Some(model) = env_var("OPENAI_REALTIME_MODEL") {
        config.openai_realtime_model = model;
    }
    if let Some(voice) = env_var("OPENAI_REALTIME_VOICE") {
        config.openai_voice = voice;
    }
    config.openai_instructions = env_var("OPENAI_INSTRUCTIONS");
    // Any value enables text mode.
    config.openai_text_mode = env_var("OPENAI_VOICE_TEXT_MODE").is_some();

    // TMDB
    config.tmdb_api_key = env_var("TMDB_API_KEY");
    if let Some(url) = env_var("TMDB_BASE_URL") {
        config.tmdb_base_url = url;
    }
    if let Some(language) = env_var("TMDB_API_LANG") {
        config.tmdb_language = language;
    }

    // Bridge
    if let Some(language) = env_var("DEFAULT_LANGUAGE") {
        config.default_language = language;
    }
    config.setup_timeout_ms = parse_env("SETUP_TIMEOUT_MS", config.setup_timeout_ms)?;
    config.drain_timeout_ms = parse_env("DRAIN_TIMEOUT_MS", config.drain_timeout_ms)?;
    config.client_queue_capacity =
        parse_env("CLIENT_QUEUE_CAPACITY", config.client_queue_capacity)?;
    config.upstream_queue_capacity =
        parse_env("UPSTREAM_QUEUE_CAPACITY", config.upstream_queue_capacity)?;
    config.max_sessions = parse_env_opt("MAX_SESSIONS")?;

    // Tools
    config.tool_concurrency_limit =
        parse_env("TOOL_CONCURRENCY_LIMIT", config.tool_concurrency_limit)?;
    config.tool_timeout_ms = parse_env("TOOL_TIMEOUT_MS", config.tool_timeout_ms)?;
    config.notify_tool_activity =
        parse_env_bool("NOTIFY_TOOL_ACTIVITY", DEFAULT_NOTIFY_TOOL_ACTIVITY)?;
    config.wait_hint_audio_path = env_var("WAIT_HINT_AUDIO_PATH").map(PathBuf::from);
    config.wait_hint_delay_ms = parse_env("WAIT_HINT_DELAY_MS", config.wait_hint_delay_ms)?;

    // Security
    config.cors_allowed_origins = env_var("CORS_ALLOWED_ORIGINS");
    config.rate_limit_requests_per_second = parse_env(
        "RATE_LIMIT_REQUESTS_PER_SECOND",
        config.rate_limit_requests_per_second,
    )?;
    config.rate_limit_burst_size =
        parse_env("RATE_LIMIT_BURST_SIZE", config.rate_limit_burst_size)?;

    Ok(config)
}
