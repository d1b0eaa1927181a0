use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present
/// here override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8000
///   tls:
///     enabled: true
///     cert_path: "/etc/cine-bridge/cert.pem"
///     key_path: "/etc/cine-bridge/key.pem"
///
/// openai:
///   api_key: "sk-..."
///   realtime_url: "wss://api.openai.com/v1/realtime"
///   model: "gpt-4o-mini-realtime-preview"
///   voice: "sage"
///   instructions: "You are CineBot..."
///   text_mode: false
///
/// tmdb:
///   api_key: "tmdb-key"
///   base_url: "https://api.themoviedb.org/3"
///   language: "ja-JP"
///
/// bridge:
///   default_language: "ja"
///   setup_timeout_ms: 10000
///   drain_timeout_ms: 5000
///   client_queue_capacity: 1024
///   upstream_queue_capacity: 256
///   max_sessions: 500
///
/// tools:
///   concurrency_limit: 8
///   timeout_ms: 15000
///   notify_activity: false
///   wait_hint_audio_path: "/etc/cine-bridge/wait_hint.b64"
///   wait_hint_delay_ms: 2000
///
/// security:
///   cors_allowed_origins: "https://cinebot.example.com"
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub openai: Option<OpenAIYaml>,
    pub tmdb: Option<TmdbYaml>,
    pub bridge: Option<BridgeYaml>,
    pub tools: Option<ToolsYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// OpenAI Realtime configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OpenAIYaml {
    pub api_key: Option<String>,
    pub realtime_url: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub text_mode: Option<bool>,
}

/// TMDB configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TmdbYaml {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub language: Option<String>,
}

/// Session bridging configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BridgeYaml {
    pub default_language: Option<String>,
    pub setup_timeout_ms: Option<u64>,
    pub drain_timeout_ms: Option<u64>,
    pub client_queue_capacity: Option<usize>,
    pub upstream_queue_capacity: Option<usize>,
    pub max_sessions: Option<usize>,
}

/// Tool execution configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ToolsYaml {
    pub concurrency_limit: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub notify_activity: Option<bool>,
    pub wait_hint_audio_path: Option<String>,
    pub wait_hint_delay_ms: Option<u64>,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: Option<u32>,
    pub rate_limit_burst_size: Option<u32>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
