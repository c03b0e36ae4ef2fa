//! Headless Chrome sessions
//!
//! A session is either a freshly launched local browser or a new tab in a
//! browser that is already running with remote debugging enabled. The
//! remote case discovers the DevTools websocket through the browser's
//! `/json/version` endpoint.
//!
//! `headless_chrome` is a blocking client, so every call is moved onto the
//! blocking thread pool.

use crate::browser::{BrowserSession, SessionLauncher};
use crate::config::ScraperSettings;
use crate::{Result, ScrapeError};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::Deserialize;
use std::ffi::OsStr;
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// User agents picked from when the configuration lists none
const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:123.0) Gecko/20100101 Firefox/123.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_3) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.3 Safari/605.1.15",
];

const LAUNCH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-extensions",
    "--disable-popup-blocking",
    "--no-first-run",
    "--no-default-browser-check",
    "--window-size=1920,1080",
];

/// Keeps a launched browser alive between page loads of one site
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(300);

/// Browser launch options
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserSettings {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub remote_debugging_url: Option<String>,
    pub user_agents: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self::from(&ScraperSettings::default())
    }
}

impl From<&ScraperSettings> for BrowserSettings {
    fn from(settings: &ScraperSettings) -> Self {
        Self {
            headless: settings.headless,
            chrome_path: settings.chrome_path.clone(),
            remote_debugging_url: settings.remote_debugging_url.clone(),
            user_agents: settings.user_agents.clone(),
        }
    }
}

impl BrowserSettings {
    /// Picks a user agent at random
    pub fn pick_user_agent(&self) -> String {
        let mut rng = rand::thread_rng();
        if self.user_agents.is_empty() {
            DEFAULT_USER_AGENTS
                .choose(&mut rng)
                .copied()
                .unwrap_or(DEFAULT_USER_AGENTS[0])
                .to_string()
        } else {
            self.user_agents
                .choose(&mut rng)
                .cloned()
                .unwrap_or_default()
        }
    }
}

/// Launches Chrome sessions
pub struct ChromeLauncher {
    settings: BrowserSettings,
    client: Client,
}

impl ChromeLauncher {
    /// Creates a launcher
    ///
    /// # Arguments
    ///
    /// * `settings` - Launch options; `remote_debugging_url` selects the
    ///   remote path
    ///
    /// # Returns
    ///
    /// * `Ok(ChromeLauncher)` - Ready launcher
    /// * `Err(ScrapeError)` - The discovery HTTP client could not be built
    pub fn new(settings: BrowserSettings) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &BrowserSettings {
        &self.settings
    }

    async fn open_browser(&self) -> Result<Browser> {
        match &self.settings.remote_debugging_url {
            Some(endpoint) => {
                let ws_url = discover_websocket_url(&self.client, endpoint).await?;
                tracing::info!("Connecting to running browser at {}", endpoint);
                blocking(move || Browser::connect(ws_url), ScrapeError::Launch).await
            }
            None => {
                let options = LaunchOptions::default_builder()
                    .headless(self.settings.headless)
                    .sandbox(false)
                    .path(self.settings.chrome_path.clone())
                    .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
                    .args(LAUNCH_ARGS.iter().map(OsStr::new).collect())
                    .build()
                    .map_err(|e| ScrapeError::Launch(e.to_string()))?;

                tracing::info!(
                    "Launching {} browser",
                    if self.settings.headless { "headless" } else { "headed" }
                );
                blocking(move || Browser::new(options), ScrapeError::Launch).await
            }
        }
    }
}

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let browser = self.open_browser().await?;
        let user_agent = self.settings.pick_user_agent();

        let (browser, tab) = blocking(
            move || {
                let tab = browser.new_tab()?;
                tab.set_user_agent(&user_agent, None, None)?;
                Ok::<_, anyhow::Error>((browser, tab))
            },
            ScrapeError::Launch,
        )
        .await?;

        Ok(Box::new(ChromeSession::new(browser, tab)))
    }
}

/// One Chrome tab plus the browser that owns it
pub struct ChromeSession {
    // Dropping the last handle shuts a launched browser down.
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeSession {
    pub fn new(browser: Browser, tab: Arc<Tab>) -> Self {
        Self {
            _browser: browser,
            tab,
        }
    }

    async fn with_tab<T, E, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        E: Display,
        F: FnOnce(&Tab) -> std::result::Result<T, E> + Send + 'static,
    {
        let tab = self.tab.clone();
        blocking(move || f(tab.as_ref()), ScrapeError::Browser).await
    }

    async fn evaluate_value(&self, expression: String) -> Result<serde_json::Value> {
        self.with_tab(move |tab| {
            tab.evaluate(&expression, false)
                .map(|object| object.value.unwrap_or(serde_json::Value::Null))
        })
        .await
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        let target = url.to_string();
        let tab = self.tab.clone();
        blocking(
            move || {
                tab.navigate_to(&target)?;
                // Slow pages are handled by the caller's soft waits.
                if let Err(e) = tab.wait_until_navigated() {
                    tracing::debug!("Navigation to {} still pending: {}", target, e);
                }
                Ok::<_, anyhow::Error>(())
            },
            |message| ScrapeError::Navigation {
                url: url.to_string(),
                message,
            },
        )
        .await
    }

    async fn current_url(&self) -> Result<String> {
        self.with_tab(|tab| Ok::<_, ScrapeError>(tab.get_url())).await
    }

    async fn element_present(&self, selector: &str) -> Result<bool> {
        let value = self.evaluate_value(presence_script(selector)).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn ready_state(&self) -> Result<String> {
        let value = self
            .evaluate_value("document.readyState".to_string())
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn content(&self) -> Result<String> {
        self.with_tab(|tab| tab.get_content()).await
    }

    async fn click(&self, selector: &str) -> Result<bool> {
        if !self.element_present(selector).await? {
            return Ok(false);
        }

        let selector = selector.to_string();
        self.with_tab(move |tab| {
            tab.find_element(&selector)?.click()?;
            Ok::<_, anyhow::Error>(true)
        })
        .await
    }

    async fn quit(&self) -> Result<()> {
        self.with_tab(|tab| tab.close(false).map(|_| ())).await
    }
}

/// JavaScript expression that is `true` when `selector` matches an element
///
/// Invalid selectors evaluate to `false` instead of throwing.
fn presence_script(selector: &str) -> String {
    let quoted = serde_json::Value::String(selector.to_string()).to_string();
    format!(
        "(() => {{ try {{ return document.querySelector({}) !== null; }} catch (e) {{ return false; }} }})()",
        quoted
    )
}

/// Runs a blocking browser call off the async runtime
async fn blocking<T, E, F, M>(f: F, wrap: M) -> Result<T>
where
    T: Send + 'static,
    E: Display,
    F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
    M: FnOnce(String) -> ScrapeError,
{
    match tokio::task::spawn_blocking(move || f().map_err(|e| e.to_string())).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(message)) => Err(wrap(message)),
        Err(e) => Err(wrap(format!("browser task failed: {}", e))),
    }
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: Option<String>,
}

/// Looks up the DevTools websocket of a running browser
///
/// # Arguments
///
/// * `client` - HTTP client used for the lookup
/// * `endpoint` - DevTools HTTP endpoint, e.g. `http://127.0.0.1:9222`
///
/// # Returns
///
/// * `Ok(String)` - The `webSocketDebuggerUrl` reported by `/json/version`
/// * `Err(ScrapeError::Discovery)` - The endpoint was unreachable or did not
///   report a websocket
pub async fn discover_websocket_url(client: &Client, endpoint: &str) -> Result<String> {
    let version_url = format!("{}/json/version", endpoint.trim_end_matches('/'));
    let discovery_error = |message: String| ScrapeError::Discovery {
        endpoint: endpoint.to_string(),
        message,
    };

    let response = client
        .get(&version_url)
        .send()
        .await
        .map_err(|e| discovery_error(e.to_string()))?;

    if !response.status().is_success() {
        return Err(discovery_error(format!("HTTP {}", response.status())));
    }

    let info: VersionInfo = response
        .json()
        .await
        .map_err(|e| discovery_error(e.to_string()))?;

    info.web_socket_debugger_url
        .filter(|url| !url.is_empty())
        .ok_or_else(|| discovery_error("no webSocketDebuggerUrl in response".to_string()))
}
