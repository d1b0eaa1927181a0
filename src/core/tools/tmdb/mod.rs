//! The Movie Database (TMDB) tools.
//!
//! Registered only when `TMDB_API_KEY` is configured.

pub mod client;
pub mod tools;

pub use client::{
    CREDITS_LANGUAGE, DEFAULT_TMDB_LANGUAGE, TMDB_BASE_URL, TmdbClient, TmdbSettings,
};
pub use tools::{
    CreditsByIdTool, CreditsMedia, CreditsSearchTool, PopularPeopleTool, SearchKind, SearchTool,
    TrendingScope, TrendingTool, tmdb_tools,
};
