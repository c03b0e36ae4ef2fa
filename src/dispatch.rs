//! Multi-site dispatch
//!
//! The [`Dispatcher`] scrapes the selected sites one after another, exports
//! each site's listings and keeps the run totals. A failing site never stops
//! the run; the next site is always attempted.

use crate::browser::SessionLauncher;
use crate::config::{Config, SiteConfig};
use crate::export::Exporter;
use crate::site::{Scraper, SiteScraper};
use crate::{ConfigError, ConfigResult};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Builds the scraper for one configured site
pub type ScraperFactory = Box<dyn Fn(&str, &SiteConfig) -> Box<dyn Scraper> + Send + Sync>;

/// Totals for one dispatcher run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Sites that produced at least one listing
    pub successful: Vec<String>,

    /// Sites that errored or produced nothing
    pub failed: Vec<String>,

    pub total_listings: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn total_sites(&self) -> usize {
        self.successful.len() + self.failed.len()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Successful: {}, Failed: {}, Total listings: {}",
            self.successful.len(),
            self.failed.len(),
            self.total_listings
        )
    }
}

/// Runs the scrapers of the selected sites in order
pub struct Dispatcher {
    config: Config,
    sites: Vec<String>,
    factory: ScraperFactory,
    site_delay: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher that builds a [`SiteScraper`] per site
    ///
    /// All configured sites are selected, in name order.
    pub fn new(config: Config, launcher: Arc<dyn SessionLauncher>) -> Self {
        Self::with_factory(config, move |name, site| {
            Box::new(SiteScraper::new(name, site.clone(), launcher.clone())) as Box<dyn Scraper>
        })
    }

    pub fn with_factory<F>(config: Config, factory: F) -> Self
    where
        F: Fn(&str, &SiteConfig) -> Box<dyn Scraper> + Send + Sync + 'static,
    {
        let sites = config.site_names().into_iter().map(str::to_string).collect();
        let site_delay = config.scraper.site_delay();

        Self {
            config,
            sites,
            factory: Box::new(factory),
            site_delay,
        }
    }

    /// Restricts the run to `names`, in the given order
    ///
    /// An empty list keeps every configured site. Unknown names are a
    /// configuration error.
    pub fn select_sites(mut self, names: &[String]) -> ConfigResult<Self> {
        if names.is_empty() {
            return Ok(self);
        }

        for name in names {
            if self.config.site(name).is_none() {
                return Err(ConfigError::UnknownSite(name.clone()));
            }
        }

        let mut selected: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            if !selected.contains(name) {
                selected.push(name.clone());
            }
        }
        self.sites = selected;
        Ok(self)
    }

    pub fn with_site_delay(mut self, delay: Duration) -> Self {
        self.site_delay = delay;
        self
    }

    /// Sites that [`Dispatcher::run`] will scrape, in order
    pub fn sites(&self) -> &[String] {
        &self.sites
    }

    /// Scrapes every selected site and exports the results
    ///
    /// Sites are separated by the configured pause. The returned summary is
    /// also handed to the exporter's sinks.
    pub async fn run(&self, exporter: &mut Exporter) -> RunSummary {
        let started_at = Utc::now();
        let mut successful = Vec::new();
        let mut failed = Vec::new();
        let mut total_listings = 0;

        tracing::info!(
            "Scraping {} site(s): {}",
            self.sites.len(),
            self.sites.join(", ")
        );

        for (index, name) in self.sites.iter().enumerate() {
            if index > 0 && !self.site_delay.is_zero() {
                tokio::time::sleep(self.site_delay).await;
            }

            let Some(site) = self.config.site(name) else {
                tracing::warn!("No configuration for {}, skipping", name);
                failed.push(name.clone());
                continue;
            };

            let mut scraper = (self.factory)(name, site);
            let site_name = scraper.site_name().to_string();
            tracing::info!("Starting scraper: {}", site_name);

            match scraper.scrape().await {
                Ok(mut listings) if !listings.is_empty() => {
                    exporter.export_listings(&mut listings, &site_name);
                    total_listings += listings.len();
                    successful.push(site_name);
                }
                Ok(_) => {
                    tracing::warn!("No listings scraped from {}", site_name);
                    failed.push(site_name);
                }
                Err(e) => {
                    tracing::error!("Error scraping {}: {}", site_name, e);
                    failed.push(site_name);
                }
            }

            scraper.close().await;
        }

        let summary = RunSummary {
            successful,
            failed,
            total_listings,
            started_at,
            finished_at: Utc::now(),
        };

        exporter.finish(&summary);
        tracing::info!("Finished scraping all sites. {}", summary);

        summary
    }
}
