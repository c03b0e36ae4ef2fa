//! The site scraping engine

use crate::browser::{FetchSettings, PageFetcher, SessionLauncher};
use crate::config::{Pagination, SiteConfig};
use crate::listing::ListingRecord;
use crate::parser::{extract_listing_cards, parse_listing_card, parse_listing_detail};
use crate::retry::random_delay;
use crate::site::{ScrapeReport, ScrapeStage, Scraper};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::Instrument;
use url::Url;

/// Search pages at or below this many characters count as failed loads
pub const MIN_SEARCH_PAGE_LENGTH: usize = 1000;

/// Resolves a site's search URL
///
/// Absolute `search_url`s are used as-is, anything else is joined onto
/// `base_url`.
pub fn resolve_search_url(config: &SiteConfig) -> Result<Url> {
    if config.search_url.contains("://") {
        return Ok(Url::parse(&config.search_url)?);
    }

    let base = Url::parse(&config.base_url)?;
    Ok(base.join(&config.search_url)?)
}

/// Scrapes one site through a browser
///
/// The same engine serves every site; the site's [`Pagination`] decides
/// whether result pages beyond the first are visited.
pub struct SiteScraper {
    name: String,
    config: SiteConfig,
    fetcher: PageFetcher,
    stage: ScrapeStage,
    report: ScrapeReport,
}

impl SiteScraper {
    /// Creates a scraper using the site's timeout and default fetch timing
    pub fn new(name: impl Into<String>, config: SiteConfig, launcher: Arc<dyn SessionLauncher>) -> Self {
        let settings = FetchSettings::with_timeout(config.timeout());
        Self::with_fetch_settings(name, config, launcher, settings)
    }

    pub fn with_fetch_settings(
        name: impl Into<String>,
        config: SiteConfig,
        launcher: Arc<dyn SessionLauncher>,
        settings: FetchSettings,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            fetcher: PageFetcher::new(launcher, settings),
            stage: ScrapeStage::Init,
            report: ScrapeReport::default(),
        }
    }

    pub fn stage(&self) -> ScrapeStage {
        self.stage
    }

    /// Counters of the most recent scrape
    pub fn report(&self) -> &ScrapeReport {
        &self.report
    }

    async fn run(&mut self) -> Result<Vec<ListingRecord>> {
        self.report = ScrapeReport::default();
        self.stage = ScrapeStage::FetchingSearchPage;

        let search_url = resolve_search_url(&self.config)?;
        let list_container = self.config.selectors.list_container.clone();

        tracing::info!("Fetching search page {}", search_url);

        let html = match self
            .fetcher
            .fetch_page(search_url.as_str(), list_container.as_deref())
            .await
        {
            Ok(html) if html.len() > MIN_SEARCH_PAGE_LENGTH => html,
            Ok(html) => {
                tracing::error!(
                    "Failed to fetch search page {}: only {} characters of markup",
                    search_url,
                    html.len()
                );
                self.stage = ScrapeStage::Done;
                return Ok(Vec::new());
            }
            Err(e) => {
                tracing::error!("Failed to fetch search page {}: {}", search_url, e);
                self.stage = ScrapeStage::Done;
                return Ok(Vec::new());
            }
        };

        // Redirects may have moved the results page
        let results_url = match self.fetcher.current_url().await {
            Ok(Some(url)) => url,
            _ => search_url.to_string(),
        };

        self.report.pages_visited = 1;
        let mut listings = self.process_page(&html, 1).await;

        if let Pagination::NumberedPageLinks {
            max_pages,
            link_selector,
        } = self.config.pagination.clone()
        {
            self.paginate(results_url, max_pages, &link_selector, &mut listings)
                .await;
        }

        self.stage = ScrapeStage::Done;
        self.report.listings = listings.len();

        tracing::info!(
            "Scraped {} listings from {} page(s), {} detail page(s) unavailable",
            listings.len(),
            self.report.pages_visited,
            self.report.detail_failures
        );

        Ok(listings)
    }

    /// Parses the cards of one result page and enriches each from its detail page
    async fn process_page(&mut self, html: &str, page: u32) -> Vec<ListingRecord> {
        self.stage = ScrapeStage::ParsingCards;
        let cards = extract_listing_cards(html, &self.config.selectors);
        tracing::info!("Found {} listing cards on page {}", cards.len(), page);
        self.report.cards_found += cards.len();

        self.stage = ScrapeStage::ProcessingCards;
        let (min_delay, max_delay) = self.config.listing_delay_range();
        let mut listings = Vec::with_capacity(cards.len());

        for (index, card) in cards.iter().enumerate() {
            let mut listing = parse_listing_card(card, &self.config.selectors);

            if listing.has_url() {
                match self.fetcher.fetch_page(&listing.url, None).await {
                    Ok(detail_html) => {
                        listing.apply_detail(parse_listing_detail(
                            &detail_html,
                            &self.config.selectors,
                        ));
                    }
                    Err(e) => {
                        // Keep the card-level fields
                        self.report.detail_failures += 1;
                        tracing::warn!("Failed to fetch detail page {}: {}", listing.url, e);
                    }
                }
            } else {
                tracing::debug!("Card {} on page {} has no detail link", index + 1, page);
            }

            listing.tag(&self.name, Utc::now());
            listings.push(listing);

            random_delay(min_delay, max_delay).await;
        }

        listings
    }

    /// Walks numbered result pages 2..=max_pages by clicking their links
    ///
    /// Stops at the first page whose link is missing or fails to load.
    async fn paginate(
        &mut self,
        mut results_url: String,
        max_pages: u32,
        link_selector: &str,
        listings: &mut Vec<ListingRecord>,
    ) {
        let list_container = self.config.selectors.list_container.clone();

        for page in 2..=max_pages {
            self.stage = ScrapeStage::CheckPagination;
            let selector = link_selector.replace("{page}", &page.to_string());

            // Detail fetches leave the browser on a listing page
            let on_results = matches!(
                self.fetcher.current_url().await,
                Ok(Some(ref current)) if *current == results_url
            );
            if !on_results {
                tracing::debug!("Returning to results page {}", results_url);
                if let Err(e) = self
                    .fetcher
                    .fetch_page(&results_url, list_container.as_deref())
                    .await
                {
                    tracing::warn!("Could not return to results page {}: {}", results_url, e);
                    break;
                }
            }

            self.stage = ScrapeStage::NavigatingPage;
            let html = match self
                .fetcher
                .click(&selector, list_container.as_deref())
                .await
            {
                Ok(Some(html)) => html,
                Ok(None) => {
                    tracing::info!("No link to page {}, pagination finished", page);
                    break;
                }
                Err(e) => {
                    tracing::warn!("Failed to navigate to page {}: {}", page, e);
                    break;
                }
            };

            if let Ok(Some(url)) = self.fetcher.current_url().await {
                results_url = url;
            }

            self.report.pages_visited += 1;
            let page_listings = self.process_page(&html, page).await;
            listings.extend(page_listings);
        }
    }
}

#[async_trait]
impl Scraper for SiteScraper {
    fn site_name(&self) -> &str {
        &self.name
    }

    async fn scrape(&mut self) -> Result<Vec<ListingRecord>> {
        let span = tracing::info_span!("site", site = %self.name);
        self.run().instrument(span).await
    }

    async fn close(&mut self) {
        self.fetcher.close().await;
    }
}
