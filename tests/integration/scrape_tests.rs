//! Integration tests for site scraping
//!
//! These tests drive the real scraping engine against a scripted in-memory
//! browser that serves fixed pages per URL, so the full fetch, parse,
//! pagination and export cycle runs without Chrome. Time is paused, so the
//! jitter and backoff sleeps complete instantly.

use async_trait::async_trait;
use homescrape::browser::{BrowserSession, FetchSettings, SessionLauncher};
use homescrape::config::{parse_toml, Config, SiteConfig};
use homescrape::dispatch::Dispatcher;
use homescrape::export::{Exporter, CSV_FILE, JSON_FILE};
use homescrape::site::{ScrapeStage, Scraper, SiteScraper};
use homescrape::{ListingRecord, ScrapeError};
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;
use url::Url;

const BASE: &str = "https://homes.test";
const SEARCH: &str = "https://homes.test/search";

/// Pages and failure script shared by every session of one fake site
#[derive(Default)]
struct FakeSite {
    pages: HashMap<String, String>,
    /// Remaining navigation failures per URL
    failures: Mutex<HashMap<String, usize>>,
    /// Selectors the session never reports as present
    invisible: Vec<String>,
    launches: AtomicUsize,
    navigations: Mutex<Vec<String>>,
}

impl FakeSite {
    fn page(mut self, url: &str, html: String) -> Self {
        self.pages.insert(url.to_string(), html);
        self
    }

    fn failing(self, url: &str, times: usize) -> Self {
        self.failures.lock().unwrap().insert(url.to_string(), times);
        self
    }

    fn invisible(mut self, selector: &str) -> Self {
        self.invisible.push(selector.to_string());
        self
    }

    fn navigations_to(&self, url: &str) -> usize {
        self.navigations
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }
}

struct FakeLauncher(Arc<FakeSite>);

#[async_trait]
impl SessionLauncher for FakeLauncher {
    async fn launch(&self) -> homescrape::Result<Box<dyn BrowserSession>> {
        self.0.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            site: self.0.clone(),
            current: Mutex::new("about:blank".to_string()),
        }))
    }
}

struct FakeSession {
    site: Arc<FakeSite>,
    current: Mutex<String>,
}

impl FakeSession {
    fn html(&self) -> String {
        let current = self.current.lock().unwrap().clone();
        self.site
            .pages
            .get(&current)
            .cloned()
            .unwrap_or_else(|| "<html><body>Not found</body></html>".to_string())
    }

    /// `href` of the first element matching `selector`, if any
    fn link_target(&self, selector: &str) -> Option<String> {
        let document = Html::parse_document(&self.html());
        let selector = Selector::parse(selector).ok()?;
        let href = document.select(&selector).next()?.value().attr("href")?.to_string();
        let current = Url::parse(&self.current.lock().unwrap()).ok()?;
        current.join(&href).ok().map(|u| u.to_string())
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&self, url: &str) -> homescrape::Result<()> {
        self.site.navigations.lock().unwrap().push(url.to_string());

        let mut failures = self.site.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ScrapeError::Navigation {
                    url: url.to_string(),
                    message: "net::ERR_CONNECTION_RESET".to_string(),
                });
            }
        }

        *self.current.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> homescrape::Result<String> {
        Ok(self.current.lock().unwrap().clone())
    }

    async fn element_present(&self, selector: &str) -> homescrape::Result<bool> {
        if self.site.invisible.iter().any(|s| s == selector) {
            return Ok(false);
        }
        let document = Html::parse_document(&self.html());
        Ok(Selector::parse(selector)
            .map(|s| document.select(&s).next().is_some())
            .unwrap_or(false))
    }

    async fn ready_state(&self) -> homescrape::Result<String> {
        Ok("complete".to_string())
    }

    async fn content(&self) -> homescrape::Result<String> {
        Ok(self.html())
    }

    async fn click(&self, selector: &str) -> homescrape::Result<bool> {
        match self.link_target(selector) {
            Some(target) => {
                self.navigate(&target).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn quit(&self) -> homescrape::Result<()> {
        Ok(())
    }
}

fn padding() -> String {
    format!("<div class=\"pad\">{}</div>", "lorem ipsum ".repeat(100))
}

fn card(id: u32, href: &str, price: &str) -> String {
    format!(
        r#"<li class="card">
             <h2 class="title">Listing {id}</h2>
             <span class="price">{price}</span>
             <div class="addr">{id} Main St, Staten Island, NY</div>
             <a class="link" href="{href}">View</a>
             <img class="photo" data-src="/img/{id}.jpg">
           </li>"#
    )
}

fn results_page(cards: &[String], next_page: Option<u32>) -> String {
    let pager = next_page
        .map(|n| format!(r#"<a class="page-link" data-page="{n}" href="/search?page={n}">{n}</a>"#))
        .unwrap_or_default();
    format!(
        "<html><body><ul class=\"results\">{}</ul><nav>{}</nav>{}</body></html>",
        cards.join("\n"),
        pager,
        padding()
    )
}

fn detail_page(beds: &str, sqft: &str, agent: &str) -> String {
    format!(
        r#"<html><body>
             <span class="beds">{beds}</span>
             <span class="baths">2 Baths</span>
             <span class="sqft">{sqft}</span>
             <div class="agent"><span class="name">{agent}</span><span class="phone">(718) 555-0100</span></div>
             {}
           </body></html>"#,
        padding()
    )
}

fn config(pagination: &str) -> Config {
    parse_toml(&format!(
        r#"
[scraper]
site_delay = 5.0

[sites.homes]
base_url = "{BASE}"
search_url = "/search"
timeout = 10
delay = 2.0
{pagination}

[sites.homes.selectors]
list_container = "ul.results"
product_card = "li.card"
product_title = "h2.title"
price = "span.price"
location = "div.addr"
product_link = "a.link"
image_url = "img.photo"
beds = "span.beds"
baths = "span.baths"
sqft = "span.sqft"
agent_name = "div.agent .name"
agent_phone = "div.agent .phone"
"#
    ))
    .unwrap()
}

fn site_config(pagination: &str) -> SiteConfig {
    config(pagination).site("homes").unwrap().clone()
}

fn scraper_for(site: &Arc<FakeSite>, pagination: &str) -> SiteScraper {
    let launcher = Arc::new(FakeLauncher(site.clone()));
    SiteScraper::with_fetch_settings(
        "homes",
        site_config(pagination),
        launcher,
        FetchSettings::with_timeout(Duration::from_secs(10)),
    )
}

fn two_card_site() -> FakeSite {
    FakeSite::default()
        .page(
            SEARCH,
            results_page(
                &[
                    card(1, "/listing/1", "$1,250,000"),
                    card(2, "https://homes.test/listing/2", "Call for price"),
                ],
                None,
            ),
        )
        .page(
            "https://homes.test/listing/1",
            detail_page("3 Beds", "1850 sq ft", "Pat Doe"),
        )
        .page(
            "https://homes.test/listing/2",
            detail_page("5 Beds", "3200 sqft", "Sam Roe"),
        )
}

fn titles(listings: &[ListingRecord]) -> Vec<&str> {
    listings.iter().map(|l| l.title.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_scrape_single_page_with_details() {
    let site = Arc::new(two_card_site());
    let mut scraper = scraper_for(&site, "");

    let listings = scraper.scrape().await.unwrap();
    scraper.close().await;

    assert_eq!(titles(&listings), vec!["Listing 1", "Listing 2"]);

    let first = &listings[0];
    assert_eq!(first.price, "$1,250,000");
    assert_eq!(first.location, "1 Main St, Staten Island, NY");
    assert_eq!(first.url, "https://homes.test/listing/1");
    assert_eq!(first.details.beds, Some(3.0));
    assert_eq!(first.details.baths, Some(2.0));
    assert_eq!(first.details.sqft, Some(1850.0));
    assert_eq!(first.agent.name.as_deref(), Some("Pat Doe"));
    assert_eq!(first.agent.phone.as_deref(), Some("(718) 555-0100"));
    assert_eq!(first.site, "homes");
    assert!(first.scraped_at.is_some());

    let second = &listings[1];
    assert_eq!(second.price, "Call for price");
    assert_eq!(second.url, "https://homes.test/listing/2");
    assert_eq!(second.details.beds, Some(5.0));

    assert_eq!(scraper.stage(), ScrapeStage::Done);
    assert_eq!(scraper.report().pages_visited, 1);
    assert_eq!(scraper.report().cards_found, 2);
    assert_eq!(scraper.report().detail_failures, 0);
    assert_eq!(site.launches.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_soft_wait_timeout_still_yields_cards() {
    let site = Arc::new(two_card_site().invisible("ul.results"));
    let mut scraper = scraper_for(&site, "");
    let start = Instant::now();

    let listings = scraper.scrape().await.unwrap();

    assert_eq!(listings.len(), 2);
    // The search page waited out the full element timeout
    assert!(start.elapsed() >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_search_page_retried_after_transient_failures() {
    let site = Arc::new(two_card_site().failing(SEARCH, 2));
    let mut scraper = scraper_for(&site, "");
    let start = Instant::now();

    let listings = scraper.scrape().await.unwrap();

    assert_eq!(listings.len(), 2);
    assert_eq!(site.navigations_to(SEARCH), 3);
    // A fresh session per failed attempt
    assert_eq!(site.launches.load(Ordering::SeqCst), 3);
    // Backoff of 2s then 4s before the third attempt
    assert!(start.elapsed() >= Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_search_page_failure_is_empty_result() {
    let site = Arc::new(two_card_site().failing(SEARCH, usize::MAX));
    let mut scraper = scraper_for(&site, "");

    let listings = scraper.scrape().await.unwrap();

    assert!(listings.is_empty());
    assert_eq!(site.navigations_to(SEARCH), 3);
    assert_eq!(scraper.stage(), ScrapeStage::Done);
}

#[tokio::test(start_paused = true)]
async fn test_short_search_page_is_empty_result() {
    let site = Arc::new(FakeSite::default().page(
        SEARCH,
        format!(
            "<html><body><ul class=\"results\">{}</ul></body></html>",
            card(1, "/listing/1", "$500,000")
        ),
    ));
    let mut scraper = scraper_for(&site, "");

    assert!(scraper.scrape().await.unwrap().is_empty());
    assert_eq!(site.navigations_to("https://homes.test/listing/1"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_detail_page_keeps_card_fields() {
    let site = Arc::new(two_card_site().failing("https://homes.test/listing/1", usize::MAX));
    let mut scraper = scraper_for(&site, "");

    let listings = scraper.scrape().await.unwrap();

    assert_eq!(listings.len(), 2);
    let first = &listings[0];
    assert_eq!(first.title, "Listing 1");
    assert_eq!(first.price, "$1,250,000");
    assert_eq!(first.location, "1 Main St, Staten Island, NY");
    assert!(first.details.is_empty());
    assert!(first.agent.is_empty());

    assert_eq!(listings[1].details.beds, Some(5.0));
    assert_eq!(scraper.report().detail_failures, 1);
    assert_eq!(site.navigations_to("https://homes.test/listing/1"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_pagination_stops_when_link_missing() {
    let site = FakeSite::default()
        .page(
            SEARCH,
            results_page(&[card(1, "/listing/1", "$400,000")], Some(2)),
        )
        .page(
            "https://homes.test/search?page=2",
            results_page(&[card(2, "/listing/2", "$600,000")], None),
        )
        .page("https://homes.test/listing/1", detail_page("2 Beds", "900", "A"))
        .page("https://homes.test/listing/2", detail_page("4 Beds", "2400", "B"));
    let site = Arc::new(site);
    let mut scraper = scraper_for(&site, "pagination = { kind = \"numbered_page_links\" }");

    let listings = scraper.scrape().await.unwrap();

    assert_eq!(titles(&listings), vec!["Listing 1", "Listing 2"]);
    assert_eq!(listings[1].details.beds, Some(4.0));
    assert_eq!(scraper.report().pages_visited, 2);
    assert_eq!(scraper.report().cards_found, 2);
    // Returned to the results page after each page's detail fetches
    assert_eq!(site.navigations_to(SEARCH), 2);
    assert_eq!(site.navigations_to("https://homes.test/search?page=2"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_pagination_respects_max_pages() {
    let mut site = FakeSite::default();
    for page in 1..=4u32 {
        let url = if page == 1 {
            SEARCH.to_string()
        } else {
            format!("https://homes.test/search?page={}", page)
        };
        site = site.page(
            &url,
            results_page(&[card(page, "", "$100,000")], Some(page + 1)),
        );
    }
    let site = Arc::new(site);
    let mut scraper = scraper_for(
        &site,
        "pagination = { kind = \"numbered_page_links\", max_pages = 2 }",
    );

    let listings = scraper.scrape().await.unwrap();

    assert_eq!(titles(&listings), vec!["Listing 1", "Listing 2"]);
    assert_eq!(scraper.report().pages_visited, 2);
    assert!(listings.iter().all(|l| l.url.is_empty()));
}

#[tokio::test(start_paused = true)]
async fn test_dispatcher_exports_combined_files() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(two_card_site());
    let launcher = Arc::new(FakeLauncher(site.clone()));

    let config = config("");
    let mut exporter = Exporter::open(
        dir.path(),
        &config.scraper.formats,
        "test-hash",
    )
    .unwrap();

    let dispatcher = Dispatcher::new(config, launcher);
    let summary = dispatcher.run(&mut exporter).await;

    assert_eq!(summary.successful, vec!["homes"]);
    assert!(summary.failed.is_empty());
    assert_eq!(summary.total_listings, 2);

    let json: Vec<ListingRecord> =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join(JSON_FILE)).unwrap())
            .unwrap();
    assert_eq!(titles(&json), vec!["Listing 1", "Listing 2"]);
    assert!(json.iter().all(|l| l.site == "homes"));

    let csv = std::fs::read_to_string(dir.path().join(CSV_FILE)).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("site,title,price,location,beds"));
    assert!(lines[1].starts_with("homes,Listing 1,\"$1,250,000\",\"1 Main St, Staten Island, NY\",3,2,1850,"));
}
