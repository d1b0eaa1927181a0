//! Merging YAML and environment configurations.

use std::path::PathBuf;

use super::yaml::YamlConfig;
use super::{ServerConfig, TlsConfig, env};

/// Environment configuration with YAML values applied on top.
pub fn merge_config(yaml: Option<YamlConfig>) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = env::load_from_env()?;

    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(tls) = server.tls {
            match tls.enabled {
                Some(false) => config.tls = None,
                Some(true) => {
                    let existing = config.tls.take();
                    let cert_path = tls
                        .cert_path
                        .map(PathBuf::from)
                        .or_else(|| existing.as_ref().map(|t| t.cert_path.clone()))
                        .ok_or("TLS is enabled but no cert_path is configured")?;
                    let key_path = tls
                        .key_path
                        .map(PathBuf::from)
                        .or_else(|| existing.as_ref().map(|t| t.key_path.clone()))
                        .ok_or("TLS is enabled but no key_path is configured")?;
                    config.tls = Some(TlsConfig {
                        cert_path,
                        key_path,
                    });
                }
                None => {}
            }
        }
    }

    if let Some(openai) = yaml.openai {
        if openai.api_key.is_some() {
            config.openai_api_key = openai.api_key;
        }
        if let Some(url) = openai.realtime_url {
            config.openai_realtime_url = url;
        }
        if let Some(model) = openai.model {
            config.openai_realtime_model = model;
        }
        if let Some(voice) = openai.voice {
            config.openai_voice = voice;
        }
        if openai.instructions.is_some() {
            config.openai_instructions = openai.instructions;
        }
        if let Some(text_mode) = openai.text_mode {
            config.openai_text_mode = text_mode;
        }
    }

    if let Some(tmdb) = yaml.tmdb {
        if tmdb.api_key.is_some() {
            config.tmdb_api_key = tmdb.api_key;
        }
        if let Some(url) = tmdb.base_url {
            config.tmdb_base_url = url;
        }
        if let Some(language) = tmdb.language {
            config.tmdb_language = language;
        }
    }

    if let Some(bridge) = yaml.bridge {
        if let Some(language) = bridge.default_language {
            config.default_language = language;
        }
        if let Some(ms) = bridge.setup_timeout_ms {
            config.setup_timeout_ms = ms;
        }
        if let Some(ms) = bridge.drain_timeout_ms {
            config.drain_timeout_ms = ms;
        }
        if let Some(capacity) = bridge.client_queue_capacity {
            config.client_queue_capacity = capacity;
        }
        if let Some(capacity) = bridge.upstream_queue_capacity {
            config.upstream_queue_capacity = capacity;
        }
        if bridge.max_sessions.is_some() {
            config.max_sessions = bridge.max_sessions;
        }
    }

    if let Some(tools) = yaml.tools {
        if let Some(limit) = tools.concurrency_limit {
            config.tool_concurrency_limit = limit;
        }
        if let Some(ms) = tools.timeout_ms {
            config.tool_timeout_ms = ms;
        }
        if let Some(notify) = tools.notify_activity {
            config.notify_tool_activity = notify;
        }
        if let Some(path) = tools.wait_hint_audio_path {
            config.wait_hint_audio_path = Some(PathBuf::from(path));
        }
        if let Some(ms) = tools.wait_hint_delay_ms {
            config.wait_hint_delay_ms = ms;
        }
    }

    if let Some(security) = yaml.security {
        if security.cors_allowed_origins.is_some() {
            config.cors_allowed_origins = security.cors_allowed_origins;
        }
        if let Some(rps) = security.rate_limit_requests_per_second {
            config.rate_limit_requests_per_second = rps;
        }
        if let Some(burst) = security.rate_limit_burst_size {
            config.rate_limit_burst_size = burst;
        }
    }

    Ok(config)
}
