//! TMDB-backed tools.
//!
//! Every tool returns a compact plain-text summary meant to be read by the
//! model, ending with the language (and time window) used for the lookup.
//! Empty result sets are reported as text, not as errors.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::client::{
    CREDITS_LANGUAGE, Credits, KnownFor, MediaItem, Movie, Paged, Person, TmdbClient, TvShow,
};
use crate::core::tools::base::{Tool, ToolError, ToolResult};

const OVERVIEW_LIMIT: usize = 100;
const MAX_POPULAR_PAGE: i64 = 500;

/// All TMDB tools sharing one client.
pub fn tmdb_tools(client: Arc<TmdbClient>) -> Vec<Arc<dyn Tool>> {
    let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
    for kind in [
        SearchKind::Movie,
        SearchKind::Tv,
        SearchKind::Person,
        SearchKind::Multi,
    ] {
        tools.push(Arc::new(SearchTool::new(kind, client.clone())));
    }
    for scope in [
        TrendingScope::All,
        TrendingScope::Movies,
        TrendingScope::Tv,
        TrendingScope::People,
    ] {
        tools.push(Arc::new(TrendingTool::new(scope, client.clone())));
    }
    tools.push(Arc::new(PopularPeopleTool::new(client.clone())));
    tools.push(Arc::new(CreditsSearchTool::new(CreditsMedia::Movie, client.clone())));
    tools.push(Arc::new(CreditsSearchTool::new(CreditsMedia::Tv, client.clone())));
    tools.push(Arc::new(CreditsByIdTool::new(client)));
    tools
}

// =============================================================================
// Arguments
// =============================================================================

fn parse_args<T: for<'de> Deserialize<'de>>(arguments: Value) -> ToolResult<T> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

fn language_schema() -> Value {
    json!({
        "type": "string",
        "description": "Response language code such as ja-JP or en-US. Omit to use the default.",
        "pattern": "^[a-z]{2}-[A-Z]{2}$"
    })
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    language_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrendingArgs {
    #[serde(default)]
    time_window: Option<String>,
    #[serde(default)]
    language_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PopularArgs {
    #[serde(default)]
    page: Option<i64>,
    #[serde(default)]
    language_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreditsArgs {
    #[serde(default)]
    movie_id: Option<i64>,
    #[serde(default)]
    tv_id: Option<i64>,
    #[serde(default)]
    language_code: Option<String>,
}

/// `day` unless exactly `week`.
fn normalize_time_window(raw: Option<&str>) -> &'static str {
    match raw.map(str::trim) {
        Some("week") => "week",
        _ => "day",
    }
}

// =============================================================================
// Search
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Movie,
    Tv,
    Person,
    Multi,
}

impl SearchKind {
    fn tool_name(&self) -> &'static str {
        match self {
            SearchKind::Movie => "tmdb_movie_search",
            SearchKind::Tv => "tmdb_tv_search",
            SearchKind::Person => "tmdb_person_search",
            SearchKind::Multi => "tmdb_multi_search",
        }
    }

    fn path(&self) -> &'static str {
        match self {
            SearchKind::Movie => "search/movie",
            SearchKind::Tv => "search/tv",
            SearchKind::Person => "search/person",
            SearchKind::Multi => "search/multi",
        }
    }

    fn limit(&self) -> usize {
        match self {
            SearchKind::Movie | SearchKind::Tv => 5,
            SearchKind::Person => 3,
            SearchKind::Multi => 6,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            SearchKind::Movie => "Search TMDB for movies by title or a few keywords.",
            SearchKind::Tv => "Search TMDB for TV shows, dramas and anime by title.",
            SearchKind::Person => {
                "Search TMDB for people (actors, directors, crew) by name. Use the shortest common form of the name."
            }
            SearchKind::Multi => {
                "Search TMDB across movies, TV shows and people when the kind of title is unknown."
            }
        }
    }

    fn subject(&self) -> &'static str {
        match self {
            SearchKind::Movie => "movies",
            SearchKind::Tv => "TV shows",
            SearchKind::Person => "people",
            SearchKind::Multi => "titles or people",
        }
    }
}

/// `tmdb_movie_search`, `tmdb_tv_search`, `tmdb_person_search`, `tmdb_multi_search`.
pub struct SearchTool {
    kind: SearchKind,
    client: Arc<TmdbClient>,
}

impl SearchTool {
    pub fn new(kind: SearchKind, client: Arc<TmdbClient>) -> Self {
        Self { kind, client }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        self.kind.tool_name()
    }

    fn description(&self) -> &str {
        self.kind.description()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Title, name or minimal keywords only. No sentences, quotes or unrelated words.",
                    "minLength": 1,
                    "maxLength": 64
                },
                "language_code": language_schema()
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, arguments: Value) -> ToolResult<Value> {
        let args: SearchArgs = parse_args(arguments)?;
        let query = args.query.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".to_string()));
        }
        let language = self.client.resolve_language(args.language_code.as_deref());
        let params = [
            ("query", query.to_string()),
            ("language", language.clone()),
        ];

        let blocks: Vec<String> = match self.kind {
            SearchKind::Movie => {
                let page: Paged<Movie> = self.client.get(self.kind.path(), &params).await?;
                page.results
                    .iter()
                    .take(self.kind.limit())
                    .map(format_movie)
                    .collect()
            }
            SearchKind::Tv => {
                let page: Paged<TvShow> = self.client.get(self.kind.path(), &params).await?;
                page.results
                    .iter()
                    .take(self.kind.limit())
                    .map(format_tv)
                    .collect()
            }
            SearchKind::Person => {
                let page: Paged<Person> = self.client.get(self.kind.path(), &params).await?;
                page.results
                    .iter()
                    .take(self.kind.limit())
                    .map(|p| format_person(p, 3))
                    .collect()
            }
            SearchKind::Multi => {
                let page: Paged<MediaItem> = self.client.get(self.kind.path(), &params).await?;
                page.results
                    .iter()
                    .take(self.kind.limit())
                    .filter_map(|item| match item {
                        MediaItem::Movie(m) => Some(format_movie(m)),
                        MediaItem::Tv(t) => Some(format_tv(t)),
                        MediaItem::Person(p) => Some(format_person(p, 2)),
                        MediaItem::Other => None,
                    })
                    .collect()
            }
        };

        if blocks.is_empty() {
            return Ok(Value::String(format!(
                "No {} found matching '{query}'. Try a more specific title or keyword. (language: {language})",
                self.kind.subject()
            )));
        }

        let mut output = blocks.join("\n");
        let _ = write!(output, "\nlanguage: {language}");
        Ok(Value::String(output))
    }
}

// =============================================================================
// Trending
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendingScope {
    All,
    Movies,
    Tv,
    People,
}

impl TrendingScope {
    fn tool_name(&self) -> &'static str {
        match self {
            TrendingScope::All => "tmdb_trending_all",
            TrendingScope::Movies => "tmdb_trending_movies",
            TrendingScope::Tv => "tmdb_trending_tv",
            TrendingScope::People => "tmdb_trending_people",
        }
    }

    fn media_path(&self) -> &'static str {
        match self {
            TrendingScope::All => "all",
            TrendingScope::Movies => "movie",
            TrendingScope::Tv => "tv",
            TrendingScope::People => "person",
        }
    }

    fn limit(&self) -> usize {
        match self {
            TrendingScope::People => 15,
            _ => 10,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            TrendingScope::All => "Trending (all content)",
            TrendingScope::Movies => "Trending movies",
            TrendingScope::Tv => "Trending TV shows",
            TrendingScope::People => "Trending people",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            TrendingScope::All => {
                "Get trending movies, TV shows and people. time_window: 'day' for today, 'week' for this week."
            }
            TrendingScope::Movies => {
                "Get trending movies. time_window: 'day' for today, 'week' for this week."
            }
            TrendingScope::Tv => {
                "Get trending TV shows. time_window: 'day' for today, 'week' for this week."
            }
            TrendingScope::People => {
                "Get trending people. time_window: 'day' for today, 'week' for this week."
            }
        }
    }
}

/// `tmdb_trending_all`, `tmdb_trending_movies`, `tmdb_trending_tv`, `tmdb_trending_people`.
pub struct TrendingTool {
    scope: TrendingScope,
    client: Arc<TmdbClient>,
}

impl TrendingTool {
    pub fn new(scope: TrendingScope, client: Arc<TmdbClient>) -> Self {
        Self { scope, client }
    }
}

#[async_trait]
impl Tool for TrendingTool {
    fn name(&self) -> &str {
        self.scope.tool_name()
    }

    fn description(&self) -> &str {
        self.scope.description()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "time_window": {
                    "type": "string",
                    "enum": ["day", "week"],
                    "default": "day",
                    "description": "'day' for today or recent, 'week' for this week. Past periods are not available."
                },
                "language_code": language_schema()
            }
        })
    }

    async fn invoke(&self, arguments: Value) -> ToolResult<Value> {
        let args: TrendingArgs = parse_args(arguments)?;
        let time_window = normalize_time_window(args.time_window.as_deref());
        let language = self.client.resolve_language(args.language_code.as_deref());
        let path = format!("trending/{}/{time_window}", self.scope.media_path());
        let params = [("language", language.clone())];

        let page: Paged<Value> = self.client.get(&path, &params).await?;
        let limit = self.scope.limit();

        let entries: Vec<String> = page
            .results
            .into_iter()
            .take(limit)
            .filter_map(|raw| trending_entry(self.scope, raw))
            .collect();

        if entries.is_empty() {
            return Ok(Value::String(format!(
                "No trending data found. (time_window: {time_window}, language: {language})"
            )));
        }

        let mut output = format!("{} ({time_window})\n\n", self.scope.title());
        for (i, entry) in entries.iter().enumerate() {
            let _ = writeln!(output, "{:2}. {}", i + 1, entry);
        }
        let _ = write!(output, "language: {language}\ntime_window: {time_window}");
        Ok(Value::String(output))
    }
}

/// Format one trending result; single-media endpoints omit `media_type`.
fn trending_entry(scope: TrendingScope, raw: Value) -> Option<String> {
    match scope {
        TrendingScope::Movies => serde_json::from_value::<Movie>(raw)
            .ok()
            .map(|m| indent(&format_movie(&m))),
        TrendingScope::Tv => serde_json::from_value::<TvShow>(raw)
            .ok()
            .map(|t| indent(&format_tv(&t))),
        TrendingScope::People => serde_json::from_value::<Person>(raw)
            .ok()
            .map(|p| indent(&format_person(&p, 2))),
        TrendingScope::All => match serde_json::from_value::<MediaItem>(raw).ok()? {
            MediaItem::Movie(m) => Some(indent(&format_movie(&m))),
            MediaItem::Tv(t) => Some(indent(&format_tv(&t))),
            MediaItem::Person(p) => Some(indent(&format_person(&p, 2))),
            MediaItem::Other => None,
        },
    }
}

// =============================================================================
// Popular people
// =============================================================================

/// `tmdb_popular_people`
pub struct PopularPeopleTool {
    client: Arc<TmdbClient>,
}

impl PopularPeopleTool {
    pub fn new(client: Arc<TmdbClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for PopularPeopleTool {
    fn name(&self) -> &str {
        "tmdb_popular_people"
    }

    fn description(&self) -> &str {
        "List people (actors, directors and others) by popularity. Shows the top 15 of the requested page."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_POPULAR_PAGE,
                    "default": 1,
                    "description": "Page number (1-500)"
                },
                "language_code": language_schema()
            }
        })
    }

    async fn invoke(&self, arguments: Value) -> ToolResult<Value> {
        let args: PopularArgs = parse_args(arguments)?;
        let page = args.page.unwrap_or(1).clamp(1, MAX_POPULAR_PAGE);
        let language = self.client.resolve_language(args.language_code.as_deref());
        let params = [("language", language.clone()), ("page", page.to_string())];

        let response: Paged<Person> = self.client.get("person/popular", &params).await?;
        if response.results.is_empty() {
            return Ok(Value::String(format!(
                "No people found on page {page}. (total_pages: {})",
                response.total_pages
            )));
        }

        let mut output = format!(
            "page_info: {page}/{}\ntotal_results: {}\n\n",
            response.total_pages, response.total_results
        );
        for (i, person) in response.results.iter().take(15).enumerate() {
            let known_for = known_for_list(&person.known_for, 3, true);
            let _ = writeln!(
                output,
                "{:2}. person_name: {}\n    known_for_department: {}\n    popularity: {:.1}\n    known_for: {}",
                i + 1,
                person.name,
                person.known_for_department.as_deref().unwrap_or("N/A"),
                person.popularity,
                known_for
            );
        }
        if (page as u32) < response.total_pages {
            let _ = writeln!(output, "To view the next page, specify page={}", page + 1);
        }
        let _ = write!(output, "language: {language}");
        Ok(Value::String(output))
    }
}

// =============================================================================
// Credits
// =============================================================================

/// `tmdb_credits_search_by_id`
pub struct CreditsByIdTool {
    client: Arc<TmdbClient>,
}

impl CreditsByIdTool {
    pub fn new(client: Arc<TmdbClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for CreditsByIdTool {
    fn name(&self) -> &str {
        "tmdb_credits_search_by_id"
    }

    fn description(&self) -> &str {
        "Get cast and crew for a movie or TV show by TMDB id. Pass exactly one of movie_id or tv_id."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "movie_id": {"type": "integer", "minimum": 1, "description": "TMDB movie id"},
                "tv_id": {"type": "integer", "minimum": 1, "description": "TMDB TV show id"},
                "language_code": language_schema()
            }
        })
    }

    async fn invoke(&self, arguments: Value) -> ToolResult<Value> {
        let args: CreditsArgs = parse_args(arguments)?;
        let (media, id) = match (args.movie_id, args.tv_id) {
            (None, None) => {
                return Err(ToolError::InvalidArguments(
                    "either movie_id or tv_id is required".to_string(),
                ));
            }
            (Some(_), Some(_)) => {
                return Err(ToolError::InvalidArguments(
                    "movie_id and tv_id cannot be given together".to_string(),
                ));
            }
            (Some(id), None) => ("movie", id),
            (None, Some(id)) => ("tv", id),
        };
        if id <= 0 {
            return Err(ToolError::InvalidArguments(format!(
                "{media}_id must be a positive integer"
            )));
        }

        let language = match args.language_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => code.to_string(),
            _ => CREDITS_LANGUAGE.to_string(),
        };
        let credits: Credits = self
            .client
            .get(&format!("{media}/{id}/credits"), &[("language", language.clone())])
            .await?;

        if credits.cast.is_none() && credits.crew.is_none() {
            return Ok(Value::String(format!(
                "No credits found for {media}_id {id}."
            )));
        }

        Ok(Value::String(format_credits(media, id, &credits, &language)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditsMedia {
    Movie,
    Tv,
}

impl CreditsMedia {
    fn tool_name(&self) -> &'static str {
        match self {
            CreditsMedia::Movie => "tmdb_movie_credits_search",
            CreditsMedia::Tv => "tmdb_tv_credits_search",
        }
    }

    fn media(&self) -> &'static str {
        match self {
            CreditsMedia::Movie => "movie",
            CreditsMedia::Tv => "tv",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            CreditsMedia::Movie => {
                "Get the director, cast and crew of a movie found by title."
            }
            CreditsMedia::Tv => {
                "Get the creators, cast and crew of a TV show, drama or anime found by title."
            }
        }
    }
}

/// `tmdb_movie_credits_search`, `tmdb_tv_credits_search`.
///
/// Searches by title and reports the credits of the first match.
pub struct CreditsSearchTool {
    media: CreditsMedia,
    client: Arc<TmdbClient>,
}

impl CreditsSearchTool {
    pub fn new(media: CreditsMedia, client: Arc<TmdbClient>) -> Self {
        Self { media, client }
    }
}

#[async_trait]
impl Tool for CreditsSearchTool {
    fn name(&self) -> &str {
        self.media.tool_name()
    }

    fn description(&self) -> &str {
        self.media.description()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Title of the work",
                    "minLength": 1
                },
                "language_code": language_schema()
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, arguments: Value) -> ToolResult<Value> {
        let args: SearchArgs = parse_args(arguments)?;
        let query = args.query.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".to_string()));
        }
        let language = self.client.resolve_language(args.language_code.as_deref());
        let params = [
            ("query", query.to_string()),
            ("language", language.clone()),
        ];
        let media = self.media.media();

        let found = match self.media {
            CreditsMedia::Movie => {
                let page: Paged<Movie> = self.client.get("search/movie", &params).await?;
                page.results.first().map(|m| (m.id, format_movie(m)))
            }
            CreditsMedia::Tv => {
                let page: Paged<TvShow> = self.client.get("search/tv", &params).await?;
                page.results.first().map(|t| (t.id, format_tv(t)))
            }
        };
        let Some((id, header)) = found else {
            return Ok(Value::String(format!(
                "No {media} found matching '{query}'. Try a more specific title. (language: {language})"
            )));
        };

        let credits: Credits = self
            .client
            .get(&format!("{media}/{id}/credits"), &[("language", language.clone())])
            .await?;
        if credits.cast.is_none() && credits.crew.is_none() {
            return Ok(Value::String(format!(
                "{header}\nNo credits found for {media}_id {id}.\nlanguage: {language}"
            )));
        }

        Ok(Value::String(format!(
            "{header}\n{}",
            format_credits(media, id as i64, &credits, &language)
        )))
    }
}

fn format_credits(media: &str, id: i64, credits: &Credits, language: &str) -> String {
    let crew = credits.crew.as_deref().unwrap_or_default();
    let names = |jobs: &[&str]| -> Vec<&str> {
        crew.iter()
            .filter(|c| c.job.as_deref().is_some_and(|j| jobs.contains(&j)))
            .take(3)
            .map(|c| c.name.as_str())
            .collect()
    };

    let mut output = format!("{media}_id: {id}\n");
    let roles: [(&str, &[&str]); 3] = if media == "tv" {
        [
            ("creator", &["Creator", "Executive Producer"][..]),
            ("director", &["Director"][..]),
            ("writer", &["Writer", "Screenplay"][..]),
        ]
    } else {
        [
            ("director", &["Director"][..]),
            ("producer", &["Producer"][..]),
            ("writer", &["Writer", "Screenplay"][..]),
        ]
    };
    for (label, jobs) in roles {
        let people = names(jobs);
        if !people.is_empty() {
            let _ = writeln!(output, "{label}: {}", people.join(", "));
        }
    }

    let cast = credits.cast.as_deref().unwrap_or_default();
    if !cast.is_empty() {
        output.push_str("\ncast:\n");
        for member in cast.iter().take(10) {
            let _ = writeln!(
                output,
                "  - {} as {}",
                member.name,
                member
                    .character
                    .as_deref()
                    .filter(|c| !c.is_empty())
                    .unwrap_or("character not specified")
            );
        }
    }
    let _ = write!(output, "\nlanguage: {language}");
    output
}

// =============================================================================
// Formatting
// =============================================================================

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() > limit {
        let cut: String = text.chars().take(limit).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

fn overview(text: Option<&str>) -> String {
    match text.filter(|t| !t.is_empty()) {
        Some(t) => truncate(t, OVERVIEW_LIMIT),
        None => "No overview available".to_string(),
    }
}

fn format_movie(movie: &Movie) -> String {
    format!(
        "title: {}\noriginal_title: {}\nrelease_date: {}\nvote_average: {:.1}\noverview: {}\n",
        movie.title,
        movie.original_title.as_deref().unwrap_or("N/A"),
        movie.release_date.as_deref().unwrap_or("N/A"),
        movie.vote_average,
        overview(movie.overview.as_deref())
    )
}

fn format_tv(show: &TvShow) -> String {
    format!(
        "name: {}\noriginal_name: {}\nair_date: {}\nvote_average: {:.1}\noverview: {}\n",
        show.name,
        show.original_name.as_deref().unwrap_or("N/A"),
        show.first_air_date.as_deref().unwrap_or("N/A"),
        show.vote_average,
        overview(show.overview.as_deref())
    )
}

fn format_person(person: &Person, known_for_limit: usize) -> String {
    format!(
        "person_name: {}\nknown_for_department: {}\nknown_for: {}\n",
        person.name,
        person.known_for_department.as_deref().unwrap_or("N/A"),
        known_for_list(&person.known_for, known_for_limit, false)
    )
}

fn known_for_list(works: &[KnownFor], limit: usize, with_media: bool) -> String {
    let titles: Vec<String> = works
        .iter()
        .filter_map(|w| {
            let title = w.display_title()?;
            Some(match (with_media, w.media_type.as_deref()) {
                (true, Some("movie")) => format!("movie_title: {title}"),
                (true, Some("tv")) => format!("tv_show_title: {title}"),
                _ => title.to_string(),
            })
        })
        .take(limit)
        .collect();
    if titles.is_empty() {
        "no known works".to_string()
    } else {
        titles.join(", ")
    }
}

/// Indent continuation lines of a block for numbered lists.
fn indent(block: &str) -> String {
    block.trim_end().replace('\n', "\n    ")
}
