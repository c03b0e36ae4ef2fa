use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default page-link selector template used by numbered paginators
pub const DEFAULT_PAGE_LINK_SELECTOR: &str = "a.page-link[data-page='{page}']";

/// Default ceiling on result pages for numbered paginators
pub const DEFAULT_MAX_PAGES: u32 = 5;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scraper: ScraperSettings,

    /// Site configurations keyed by site name
    pub sites: BTreeMap<String, SiteConfig>,
}

impl Config {
    /// Returns the configuration for a single site
    pub fn site(&self, name: &str) -> Option<&SiteConfig> {
        self.sites.get(name)
    }

    /// Names of all configured sites, in scrape order
    pub fn site_names(&self) -> Vec<&str> {
        self.sites.keys().map(String::as_str).collect()
    }
}

/// Process-wide scraper behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperSettings {
    /// Run the browser without a visible window
    pub headless: bool,

    /// Explicit browser executable; auto-detected when unset
    pub chrome_path: Option<PathBuf>,

    /// DevTools HTTP endpoint of an already-running browser
    /// (e.g. `http://127.0.0.1:9222`); a local browser is launched when unset
    pub remote_debugging_url: Option<String>,

    /// User agents to rotate between sessions; a built-in list is used when empty
    pub user_agents: Vec<String>,

    /// Pause between two sites (seconds)
    pub site_delay: f64,

    /// Directory holding the combined output files
    pub output_dir: PathBuf,

    /// Output formats to write
    pub formats: Vec<OutputFormat>,
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            remote_debugging_url: None,
            user_agents: Vec::new(),
            site_delay: 5.0,
            output_dir: PathBuf::from("data/combined"),
            formats: vec![OutputFormat::Json, OutputFormat::Csv, OutputFormat::Sqlite],
        }
    }
}

impl ScraperSettings {
    pub fn site_delay(&self) -> Duration {
        seconds(self.site_delay)
    }
}

/// Combined output file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Csv,
    Sqlite,
}

/// Configuration for one scraped site
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Site root, used to resolve relative links
    pub base_url: String,

    /// Search results path (joined onto `base_url`) or absolute URL
    pub search_url: String,

    /// Browser wait timeout (seconds)
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Upper bound of the pause between listings (seconds)
    #[serde(default = "default_delay")]
    pub delay: f64,

    #[serde(default)]
    pub pagination: Pagination,

    #[serde(default)]
    pub selectors: SelectorMap,
}

fn default_timeout() -> u64 {
    30
}

fn default_delay() -> f64 {
    3.0
}

impl SiteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Jitter bounds for the pause after each listing: `delay/2 ..= delay`
    pub fn listing_delay_range(&self) -> (Duration, Duration) {
        let max = seconds(self.delay);
        (max / 2, max)
    }
}

/// Seconds as a `Duration`, clamped to what validation accepts; NaN is zero
fn seconds(value: f64) -> Duration {
    let max = crate::config::validation::MAX_SECONDS as f64;
    Duration::try_from_secs_f64(value.clamp(0.0, max)).unwrap_or_default()
}

/// How a site moves through its result pages
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pagination {
    /// Only the first results page is scraped
    #[default]
    None,

    /// A link per page number, clicked in the browser
    NumberedPageLinks {
        #[serde(default = "default_max_pages")]
        max_pages: u32,

        /// CSS selector template; `{page}` is replaced by the page number
        #[serde(default = "default_link_selector")]
        link_selector: String,
    },
}

fn default_max_pages() -> u32 {
    DEFAULT_MAX_PAGES
}

fn default_link_selector() -> String {
    DEFAULT_PAGE_LINK_SELECTOR.to_string()
}

/// Logical field name to CSS selector table for one site
///
/// Every entry is optional. A selector may end in `::attr(NAME)` to read
/// an attribute of the matched element instead of its text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SelectorMap {
    pub base_url: Option<String>,

    // Search results page
    pub list_container: Option<String>,
    pub product_card: Option<String>,
    pub product_title: Option<String>,
    pub price: Option<String>,
    pub location: Option<String>,
    pub product_link: Option<String>,
    pub image_url: Option<String>,

    // Detail page
    pub beds: Option<String>,
    pub baths: Option<String>,
    pub sqft: Option<String>,
    pub acres: Option<String>,
    pub parking: Option<String>,
    pub garage: Option<String>,
    pub property_type: Option<String>,

    // Listing agent
    pub agent_name: Option<String>,
    pub agent_license: Option<String>,
    pub agent_office: Option<String>,
    pub agent_phone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unvalidated_delays_do_not_panic() {
        let mut settings = ScraperSettings::default();
        settings.site_delay = 1e300;
        assert_eq!(settings.site_delay(), Duration::from_secs(86_400));

        settings.site_delay = f64::NAN;
        assert_eq!(settings.site_delay(), Duration::ZERO);

        settings.site_delay = -4.0;
        assert_eq!(settings.site_delay(), Duration::ZERO);
    }
}
