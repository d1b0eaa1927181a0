//! Shared application state.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::core::session::{CoordinatorSettings, SessionRegistry, WaitHint};
use crate::core::tools::{Tool, ToolDispatcher, VideoSearchTool};
use crate::core::tools::tmdb::{TmdbClient, tmdb_tools};

/// A reserved session slot, taken at admission and held until the session
/// ends. The slot is released when the last clone drops.
#[derive(Debug, Clone)]
pub struct SessionSlot(Option<Arc<OwnedSemaphorePermit>>);

/// State shared by every request handler.
pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<SessionRegistry>,
    pub dispatcher: Arc<ToolDispatcher>,
    /// One permit per allowed session; `None` without `MAX_SESSIONS`
    session_slots: Option<Arc<Semaphore>>,
    wait_hint: Option<WaitHint>,
    started_at: Instant,
}

impl AppState {
    pub async fn new(config: ServerConfig) -> Arc<Self> {
        let dispatcher = Arc::new(build_dispatcher(&config));
        let wait_hint = load_wait_hint(&config).await;
        let session_slots = config
            .max_sessions
            .map(|max| Arc::new(Semaphore::new(max)));

        Arc::new(Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            dispatcher,
            session_slots,
            wait_hint,
            started_at: Instant::now(),
        })
    }

    /// Coordinator settings for a new session.
    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            wait_hint: self.wait_hint.clone(),
            ..self.config.coordinator_settings()
        }
    }

    /// Reserve a slot for a new session. Returns `None` once `MAX_SESSIONS`
    /// slots are taken; without a limit every reservation succeeds.
    pub fn try_reserve_session(&self) -> Option<SessionSlot> {
        match &self.session_slots {
            None => Some(SessionSlot(None)),
            Some(slots) => slots
                .clone()
                .try_acquire_owned()
                .ok()
                .map(|permit| SessionSlot(Some(Arc::new(permit)))),
        }
    }

    /// Whether every session slot is taken.
    pub fn at_capacity(&self) -> bool {
        self.session_slots
            .as_ref()
            .is_some_and(|slots| slots.available_permits() == 0)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

fn build_dispatcher(config: &ServerConfig) -> ToolDispatcher {
    let mut tools: Vec<Arc<dyn Tool>> = vec![Arc::new(VideoSearchTool::new())];

    match config.tmdb_settings() {
        None => warn!("TMDB_API_KEY is not set, TMDB tools are disabled"),
        Some(settings) => match TmdbClient::new(settings) {
            Ok(client) => {
                let tmdb = tmdb_tools(Arc::new(client));
                info!(tools = tmdb.len(), "TMDB tools registered");
                tools.extend(tmdb);
            }
            Err(e) => warn!("Failed to build TMDB client, TMDB tools are disabled: {}", e),
        },
    }

    ToolDispatcher::new(tools, config.tool_concurrency_limit, config.tool_timeout())
}

/// Read the base64 wait-hint audio. A missing or empty file disables the hint.
async fn load_wait_hint(config: &ServerConfig) -> Option<WaitHint> {
    let path = config.wait_hint_audio_path.as_ref()?;
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            let audio = contents.trim();
            if audio.is_empty() {
                warn!(path = %path.display(), "Wait hint audio file is empty");
                return None;
            }
            info!(path = %path.display(), "Loaded wait hint audio");
            Some(WaitHint {
                audio: Arc::from(audio),
                delay: config.wait_hint_delay(),
            })
        }
        Err(e) => {
            warn!(path = %path.display(), "Failed to read wait hint audio: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_state_without_tmdb_key_has_only_local_tools() {
        let state = AppState::new(ServerConfig::default()).await;
        assert_eq!(state.dispatcher.tool_count(), 1);
        assert!(state.dispatcher.has_tool("search_videos"));
        assert!(state.coordinator_settings().wait_hint.is_none());
        assert!(!state.at_capacity());
    }

    #[tokio::test]
    async fn test_state_with_tmdb_key_registers_tools() {
        let mut config = ServerConfig::default();
        config.tmdb_api_key = Some("tmdb-test".to_string());
        let state = AppState::new(config).await;
        assert_eq!(state.dispatcher.tool_count(), 13);
        assert!(state.dispatcher.has_tool("tmdb_movie_search"));
        assert!(state.dispatcher.has_tool("tmdb_tv_credits_search"));
        assert!(state.dispatcher.has_tool("search_videos"));
    }

    #[tokio::test]
    async fn test_wait_hint_loaded_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "UklGRiQAAABXQVZF").unwrap();

        let mut config = ServerConfig::default();
        config.wait_hint_audio_path = Some(file.path().to_path_buf());
        config.wait_hint_delay_ms = 500;
        let state = AppState::new(config).await;

        let hint = state.coordinator_settings().wait_hint.unwrap();
        assert_eq!(&*hint.audio, "UklGRiQAAABXQVZF");
        assert_eq!(hint.delay, std::time::Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_session_slots_are_reserved_and_released() {
        let mut config = ServerConfig::default();
        config.max_sessions = Some(2);
        let state = AppState::new(config).await;
        assert!(!state.at_capacity());

        let first = state.try_reserve_session().unwrap();
        let second = state.try_reserve_session().unwrap();
        assert!(state.at_capacity());
        assert!(state.try_reserve_session().is_none());

        // A clone keeps the slot alive.
        let kept = second.clone();
        drop(second);
        assert!(state.try_reserve_session().is_none());

        drop(kept);
        assert!(!state.at_capacity());
        assert!(state.try_reserve_session().is_some());
        drop(first);
    }

    #[tokio::test]
    async fn test_unlimited_sessions_always_reserve() {
        let state = AppState::new(ServerConfig::default()).await;
        let slots: Vec<_> = (0..100).filter_map(|_| state.try_reserve_session()).collect();
        assert_eq!(slots.len(), 100);
        assert!(!state.at_capacity());
    }
}
