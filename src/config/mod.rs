//! Configuration module for the CineBridge server
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use cine_bridge::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

use crate::core::session::CoordinatorSettings;
use crate::core::tools::tmdb::TmdbSettings;
use crate::core::upstream::{RealtimeVoice, UpstreamSettings};

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone, PartialEq)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Groups:
/// - Server settings (host, port, TLS)
/// - OpenAI Realtime upstream
/// - TMDB tools
/// - Session bridging (timeouts, queue capacities, session limit)
/// - Tool execution
/// - Security settings (CORS, rate limiting)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // OpenAI Realtime
    pub openai_api_key: Option<String>,
    pub openai_realtime_url: String,
    pub openai_realtime_model: String,
    /// Voice name, see [`RealtimeVoice`]
    pub openai_voice: String,
    /// Session instructions. Default CineBot instructions when unset.
    pub openai_instructions: Option<String>,
    /// Respond with text only
    pub openai_text_mode: bool,

    // TMDB
    pub tmdb_api_key: Option<String>,
    pub tmdb_base_url: String,
    pub tmdb_language: String,

    // Bridge
    /// Language used when the client does not pass `?language=`
    pub default_language: String,
    pub setup_timeout_ms: u64,
    pub drain_timeout_ms: u64,
    pub client_queue_capacity: usize,
    pub upstream_queue_capacity: usize,
    /// Maximum concurrent sessions. `None` means unlimited.
    pub max_sessions: Option<usize>,

    // Tools
    pub tool_concurrency_limit: usize,
    pub tool_timeout_ms: u64,
    /// Send `event.notification` (`run_tool`) when a tool starts
    pub notify_tool_activity: bool,
    /// Base64 WAV file played while slow tools run
    pub wait_hint_audio_path: Option<PathBuf>,
    pub wait_hint_delay_ms: u64,

    // Security
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,
    /// Rate limit: requests per second per IP
    pub rate_limit_requests_per_second: u32,
    /// Rate limit: burst size
    pub rate_limit_burst_size: u32,
}

/// Zeroize secret fields when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.tmdb_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// Note: the .env file is loaded in main.rs at application startup.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from environment variables and defaults.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Names of the API keys that are not configured.
    pub fn missing_api_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.openai_api_key.as_deref().is_none_or(str::is_empty) {
            missing.push("OPENAI_API_KEY");
        }
        if self.tmdb_api_key.as_deref().is_none_or(str::is_empty) {
            missing.push("TMDB_API_KEY");
        }
        missing
    }

    /// Upstream connector settings for one session.
    ///
    /// The requested language is appended to the instructions as the
    /// preferred response language.
    pub fn upstream_settings(&self, language: &str) -> UpstreamSettings {
        let defaults = UpstreamSettings::default();
        let base = self
            .openai_instructions
            .clone()
            .unwrap_or(defaults.instructions);
        let instructions = format!("{base}\nPreferred response language: {language}");

        UpstreamSettings {
            url: self.openai_realtime_url.clone(),
            api_key: self.openai_api_key.clone().unwrap_or_default(),
            model: self.openai_realtime_model.clone(),
            voice: RealtimeVoice::from_str_or_default(&self.openai_voice),
            text_mode: self.openai_text_mode,
            instructions,
            tools: Vec::new(),
            queue_capacity: self.upstream_queue_capacity,
            close_timeout: defaults.close_timeout,
        }
    }

    /// TMDB client settings, if a TMDB key is configured.
    pub fn tmdb_settings(&self) -> Option<TmdbSettings> {
        let api_key = self.tmdb_api_key.clone().filter(|k| !k.is_empty())?;
        Some(TmdbSettings {
            base_url: self.tmdb_base_url.clone(),
            api_key,
            language: self.tmdb_language.clone(),
            ..Default::default()
        })
    }

    /// Coordinator settings without the wait hint, which is loaded separately.
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            setup_timeout: Duration::from_millis(self.setup_timeout_ms),
            drain_timeout: Duration::from_millis(self.drain_timeout_ms),
            notify_tool_activity: self.notify_tool_activity,
            wait_hint: None,
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    pub fn wait_hint_delay(&self) -> Duration {
        Duration::from_millis(self.wait_hint_delay_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: env::DEFAULT_HOST.to_string(),
            port: env::DEFAULT_PORT,
            tls: None,
            openai_api_key: None,
            openai_realtime_url: crate::core::upstream::openai::OPENAI_REALTIME_URL.to_string(),
            openai_realtime_model: crate::core::upstream::openai::DEFAULT_REALTIME_MODEL
                .to_string(),
            openai_voice: RealtimeVoice::default().as_str().to_string(),
            openai_instructions: None,
            openai_text_mode: false,
            tmdb_api_key: None,
            tmdb_base_url: crate::core::tools::tmdb::TMDB_BASE_URL.to_string(),
            tmdb_language: crate::core::tools::tmdb::DEFAULT_TMDB_LANGUAGE.to_string(),
            default_language: env::DEFAULT_LANGUAGE.to_string(),
            setup_timeout_ms: env::DEFAULT_SETUP_TIMEOUT_MS,
            drain_timeout_ms: env::DEFAULT_DRAIN_TIMEOUT_MS,
            client_queue_capacity: env::DEFAULT_CLIENT_QUEUE_CAPACITY,
            upstream_queue_capacity: env::DEFAULT_UPSTREAM_QUEUE_CAPACITY,
            max_sessions: None,
            tool_concurrency_limit: crate::core::tools::DEFAULT_CONCURRENCY_LIMIT,
            tool_timeout_ms: env::DEFAULT_TOOL_TIMEOUT_MS,
            notify_tool_activity: env::DEFAULT_NOTIFY_TOOL_ACTIVITY,
            wait_hint_audio_path: None,
            wait_hint_delay_ms: env::DEFAULT_WAIT_HINT_DELAY_MS,
            cors_allowed_origins: None,
            rate_limit_requests_per_second: env::DEFAULT_RATE_LIMIT_RPS,
            rate_limit_burst_size: env::DEFAULT_RATE_LIMIT_BURST,
        }
    }
}
