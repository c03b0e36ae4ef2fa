//! homescrape: a browser-driven real-estate listing scraper
//!
//! This crate loads a per-site selector configuration, drives a headless
//! browser through search-result pages and listing detail pages, maps the
//! markup onto a common listing schema and appends the results to combined
//! output files.

pub mod browser;
pub mod config;
pub mod dispatch;
pub mod export;
pub mod extract;
pub mod listing;
pub mod parser;
pub mod retry;
pub mod site;

use thiserror::Error;

/// Main error type for scraping operations
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Failed to launch browser session: {0}")]
    Launch(String),

    #[error("No browser session is open")]
    NoSession,

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Timed out after {seconds}s waiting for {what}")]
    Timeout { what: String, seconds: u64 },

    #[error("DevTools discovery failed for {endpoint}: {message}")]
    Discovery { endpoint: String, message: String },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Configuration not found for site: {0}")]
    UnknownSite(String),
}

/// Result type alias for scraping operations
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::{Config, SelectorMap, SiteConfig};
pub use listing::{AgentInfo, ListingDetails, ListingRecord};
pub use site::{Pagination, Scraper, SiteScraper};
