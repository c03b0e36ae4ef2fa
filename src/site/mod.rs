//! Per-site scraping
//!
//! This module turns one site's configuration into listing records:
//! - The [`Scraper`] trait the dispatcher drives
//! - [`SiteScraper`], the single engine used for every site, parameterized
//!   by its [`Pagination`] style
//! - Progress tracking through [`ScrapeStage`] and [`ScrapeReport`]

mod engine;

pub use crate::config::Pagination;
pub use engine::{resolve_search_url, SiteScraper, MIN_SEARCH_PAGE_LENGTH};

use crate::listing::ListingRecord;
use crate::Result;
use async_trait::async_trait;
use std::fmt;

/// A scraper for one site
#[async_trait]
pub trait Scraper: Send {
    /// Name of the site, as configured
    fn site_name(&self) -> &str;

    /// Scrapes every reachable listing
    ///
    /// An empty vector means the site failed as a whole (for example the
    /// search page could not be loaded).
    async fn scrape(&mut self) -> Result<Vec<ListingRecord>>;

    /// Releases held resources such as the browser session
    async fn close(&mut self) {}
}

/// Where a scrape currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrapeStage {
    #[default]
    Init,
    FetchingSearchPage,
    ParsingCards,
    ProcessingCards,
    CheckPagination,
    NavigatingPage,
    Done,
}

impl fmt::Display for ScrapeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScrapeStage::Init => "init",
            ScrapeStage::FetchingSearchPage => "fetching search page",
            ScrapeStage::ParsingCards => "parsing cards",
            ScrapeStage::ProcessingCards => "processing cards",
            ScrapeStage::CheckPagination => "checking pagination",
            ScrapeStage::NavigatingPage => "navigating page",
            ScrapeStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Counters for one scrape run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeReport {
    /// Result pages whose cards were processed
    pub pages_visited: u32,

    pub cards_found: usize,

    /// Listings kept after processing
    pub listings: usize,

    /// Cards whose detail page could not be loaded
    pub detail_failures: usize,
}
