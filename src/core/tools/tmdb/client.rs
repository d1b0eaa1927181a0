//! TMDB REST client.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use zeroize::Zeroizing;

use crate::core::tools::base::{ToolError, ToolResult};

/// TMDB API v3 base URL.
pub const TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";

/// Language used when neither the call nor the configuration names one.
pub const DEFAULT_TMDB_LANGUAGE: &str = "ja-JP";

/// Credits are fetched in English unless the call names a language.
pub const CREDITS_LANGUAGE: &str = "en-US";

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = concat!("CineBridge/", env!("CARGO_PKG_VERSION"));

/// Connection settings for [`TmdbClient`].
#[derive(Debug, Clone)]
pub struct TmdbSettings {
    pub base_url: String,
    pub api_key: String,
    /// Default response language (`TMDB_API_LANG`)
    pub language: String,
    pub timeout: Duration,
}

impl Default for TmdbSettings {
    fn default() -> Self {
        Self {
            base_url: TMDB_BASE_URL.to_string(),
            api_key: String::new(),
            language: DEFAULT_TMDB_LANGUAGE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Thin typed wrapper over the TMDB REST API.
pub struct TmdbClient {
    http: Client,
    base_url: String,
    api_key: Zeroizing<String>,
    language: String,
}

impl TmdbClient {
    pub fn new(settings: TmdbSettings) -> ToolResult<Self> {
        if settings.api_key.is_empty() {
            return Err(ToolError::NotConfigured("TMDB API key is empty".to_string()));
        }

        let http = Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.timeout)
            .pool_max_idle_per_host(4)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ToolError::NotConfigured(format!("Failed to create HTTP client: {e}")))?;

        let language = if settings.language.trim().is_empty() {
            DEFAULT_TMDB_LANGUAGE.to_string()
        } else {
            settings.language
        };

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: Zeroizing::new(settings.api_key),
            language,
        })
    }

    /// Configured default language.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// The requested language when given, otherwise the default.
    pub fn resolve_language(&self, requested: Option<&str>) -> String {
        match requested.map(str::trim) {
            Some(code) if !code.is_empty() => code.to_string(),
            _ => self.language.clone(),
        }
    }

    /// GET `path` with the API key and `params` as query parameters.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> ToolResult<T> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!(path, "TMDB request");

        let response = self
            .http
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<TmdbErrorBody>(&body)
                .ok()
                .and_then(|b| b.status_message)
                .unwrap_or(body);
            return Err(ToolError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<T>().await?)
    }
}

// =============================================================================
// Response models
// =============================================================================

#[derive(Debug, Deserialize)]
struct TmdbErrorBody {
    #[serde(default)]
    status_message: Option<String>,
}

/// Paged list response (`search/*`, `trending/*`, `person/popular`).
#[derive(Debug, Clone, Deserialize)]
pub struct Paged<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Movie {
    pub id: u64,
    pub title: String,
    pub original_title: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: f64,
    pub popularity: f64,
    pub overview: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TvShow {
    pub id: u64,
    pub name: String,
    pub original_name: Option<String>,
    pub first_air_date: Option<String>,
    pub vote_average: f64,
    pub popularity: f64,
    pub overview: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Person {
    pub id: u64,
    pub name: String,
    pub known_for_department: Option<String>,
    pub popularity: f64,
    pub known_for: Vec<KnownFor>,
}

/// A title a person is known for.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KnownFor {
    pub title: Option<String>,
    pub name: Option<String>,
    pub media_type: Option<String>,
}

impl KnownFor {
    pub fn display_title(&self) -> Option<&str> {
        self.title
            .as_deref()
            .or(self.name.as_deref())
            .filter(|t| !t.is_empty())
    }
}

/// Item of a mixed result list (`search/multi`, `trending/all`).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "media_type", rename_all = "lowercase")]
pub enum MediaItem {
    Movie(Movie),
    Tv(TvShow),
    Person(Person),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credits {
    #[serde(default)]
    pub cast: Option<Vec<CastMember>>,
    #[serde(default)]
    pub crew: Option<Vec<CrewMember>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CastMember {
    pub name: String,
    pub character: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CrewMember {
    pub name: String,
    pub job: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(language: &str) -> TmdbClient {
        TmdbClient::new(TmdbSettings {
            api_key: "key".to_string(),
            language: language.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_requires_api_key() {
        assert!(matches!(
            TmdbClient::new(TmdbSettings::default()),
            Err(ToolError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_language_resolution() {
        let client = client("en-US");
        assert_eq!(client.resolve_language(Some("de-DE")), "de-DE");
        assert_eq!(client.resolve_language(Some("  ")), "en-US");
        assert_eq!(client.resolve_language(None), "en-US");
        assert_eq!(self::client("").language(), DEFAULT_TMDB_LANGUAGE);
    }

    #[test]
    fn test_media_item_parsing() {
        let json = r#"[
            {"media_type": "movie", "id": 1, "title": "Alien", "vote_average": 8.1},
            {"media_type": "tv", "id": 2, "name": "Shogun"},
            {"media_type": "person", "id": 3, "name": "Sigourney Weaver", "known_for": [{"title": "Aliens"}]},
            {"media_type": "collection", "id": 4}
        ]"#;
        let items: Vec<MediaItem> = serde_json::from_str(json).unwrap();
        assert!(matches!(&items[0], MediaItem::Movie(m) if m.title == "Alien"));
        assert!(matches!(&items[1], MediaItem::Tv(t) if t.name == "Shogun"));
        assert!(
            matches!(&items[2], MediaItem::Person(p) if p.known_for[0].display_title() == Some("Aliens"))
        );
        assert!(matches!(items[3], MediaItem::Other));
    }

    #[test]
    fn test_null_fields_tolerated() {
        let json = r#"{"results": [{"id": 1, "title": "X", "overview": null, "release_date": null}]}"#;
        let page: Paged<Movie> = serde_json::from_str(json).unwrap();
        assert_eq!(page.results.len(), 1);
        assert!(page.results[0].overview.is_none());
    }
}
