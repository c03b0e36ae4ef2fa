//! Configuration module
//!
//! This module handles loading, parsing, and validating the per-site
//! configuration file (TOML, or JSON for `.json` files).
//!
//! # Example
//!
//! ```no_run
//! use homescrape::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sites.toml")).unwrap();
//! for name in config.site_names() {
//!     println!("{}", name);
//! }
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, OutputFormat, Pagination, ScraperSettings, SelectorMap, SiteConfig,
    DEFAULT_MAX_PAGES, DEFAULT_PAGE_LINK_SELECTOR,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_json, parse_toml};
