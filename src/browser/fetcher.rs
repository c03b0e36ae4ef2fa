//! Page fetcher
//!
//! This module loads pages through a [`BrowserSession`], including:
//! - Lazily launching the session on first use
//! - Jittered pauses after navigation
//! - Soft waits for an element, document readiness and page content
//! - Retrying failed loads with exponential backoff
//! - Replacing the session after a failed attempt
//!
//! # Soft waits
//!
//! | Wait | Bound | On expiry |
//! |------|-------|-----------|
//! | Requested element present | site timeout | warn, continue |
//! | `document.readyState == "complete"` | site timeout | warn, continue |
//! | Markup longer than 1000 chars | 10s | warn, continue |
//!
//! The markup is returned whichever waits expired. Only driver errors fail
//! an attempt.

use crate::browser::{BrowserSession, SessionLauncher};
use crate::retry::{random_delay, retry, RetryPolicy};
use crate::{Result, ScrapeError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Timing knobs for page loads
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Bound for the element and readiness waits
    pub timeout: Duration,

    /// Bound for the content-length wait
    pub content_timeout: Duration,

    /// Markup length that counts as "has content"
    pub min_content_length: usize,

    /// Pause after navigation, picked uniformly from this range
    pub jitter: (Duration, Duration),

    /// Interval between checks while waiting
    pub poll_interval: Duration,

    pub retry: RetryPolicy,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            content_timeout: Duration::from_secs(10),
            min_content_length: 1000,
            jitter: (Duration::from_secs(1), Duration::from_secs(2)),
            poll_interval: Duration::from_millis(250),
            retry: RetryPolicy::default(),
        }
    }
}

impl FetchSettings {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }
}

/// Loads pages through one lazily created browser session
pub struct PageFetcher {
    launcher: Arc<dyn SessionLauncher>,
    session: Option<Box<dyn BrowserSession>>,
    settings: FetchSettings,
}

impl PageFetcher {
    pub fn new(launcher: Arc<dyn SessionLauncher>, settings: FetchSettings) -> Self {
        Self {
            launcher,
            session: None,
            settings,
        }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Whether a browser session is currently open
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Loads `url` and returns the rendered markup
    ///
    /// Each attempt navigates, pauses for a random jitter and runs the soft
    /// waits (for `wait_for` when given). A failed attempt tears the session
    /// down so the next one starts from a fresh browser. The error of the
    /// last attempt is returned when every attempt failed.
    pub async fn fetch_page(&mut self, url: &str, wait_for: Option<&str>) -> Result<String> {
        let policy = self.settings.retry.clone();

        retry(&policy, self, |fetcher| {
            let url = url.to_string();
            let wait_for = wait_for.map(str::to_string);
            Box::pin(async move { fetcher.fetch_once(&url, wait_for.as_deref()).await })
        })
        .await
    }

    /// A single load attempt
    async fn fetch_once(&mut self, url: &str, wait_for: Option<&str>) -> Result<String> {
        if self.session.is_none() {
            tracing::debug!("Launching browser session");
            self.session = Some(self.launcher.launch().await?);
        }

        let result = match self.session.as_deref() {
            Some(session) => load_page(session, &self.settings, url, wait_for).await,
            None => Err(ScrapeError::NoSession),
        };

        if let Err(e) = &result {
            tracing::error!("Error fetching page {}: {}", url, e);
            self.discard_session().await;
        }

        result
    }

    /// Clicks a control on the current page and returns the updated markup
    ///
    /// Returns `Ok(None)` when no element matches `selector`. When `wait_for`
    /// is given it must appear within the timeout, otherwise
    /// [`ScrapeError::Timeout`] is returned.
    pub async fn click(&self, selector: &str, wait_for: Option<&str>) -> Result<Option<String>> {
        let session = self.session.as_deref().ok_or(ScrapeError::NoSession)?;

        if !session.click(selector).await? {
            return Ok(None);
        }

        let (min, max) = self.settings.jitter;
        random_delay(min, max).await;

        if let Some(target) = wait_for {
            let found = wait_until(self.settings.timeout, self.settings.poll_interval, move || {
                session.element_present(target)
            })
            .await?;

            if !found {
                return Err(ScrapeError::Timeout {
                    what: format!("element {} after clicking {}", target, selector),
                    seconds: self.settings.timeout.as_secs(),
                });
            }
        }

        Ok(Some(session.content().await?))
    }

    /// URL shown in the browser, `None` when no session is open
    pub async fn current_url(&self) -> Result<Option<String>> {
        match self.session.as_deref() {
            Some(session) => Ok(Some(session.current_url().await?)),
            None => Ok(None),
        }
    }

    /// Closes the browser session; calling it again is a no-op
    pub async fn close(&mut self) {
        if self.session.is_some() {
            tracing::debug!("Closing browser session");
            self.discard_session().await;
        }
    }

    async fn discard_session(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.quit().await {
                tracing::debug!("Ignoring error while closing browser session: {}", e);
            }
        }
    }
}

/// Navigation plus soft waits against an open session
async fn load_page(
    session: &dyn BrowserSession,
    settings: &FetchSettings,
    url: &str,
    wait_for: Option<&str>,
) -> Result<String> {
    session.navigate(url).await?;

    let (min, max) = settings.jitter;
    random_delay(min, max).await;

    let poll = settings.poll_interval;

    if let Some(selector) = wait_for {
        let found = wait_until(settings.timeout, poll, move || {
            session.element_present(selector)
        })
        .await?;
        if !found {
            tracing::warn!("Timeout waiting for element {} on {}", selector, url);
        }
    }

    let ready = wait_until(settings.timeout, poll, move || async move {
        Ok(session.ready_state().await? == "complete")
    })
    .await?;
    if !ready {
        tracing::warn!("Page {} took too long to load completely", url);
    }

    let min_length = settings.min_content_length;
    let has_content = wait_until(settings.content_timeout, poll, move || async move {
        Ok(session.content().await?.len() > min_length)
    })
    .await?;
    if !has_content {
        tracing::warn!("Page {} has very little content", url);
    }

    session.content().await
}

/// Polls `check` until it reports `true` or `timeout` elapses
///
/// Returns `Ok(false)` on expiry; errors from `check` are returned as-is.
/// A timeout too large to represent as an instant never expires.
pub async fn wait_until<F, Fut>(timeout: Duration, poll_interval: Duration, mut check: F) -> Result<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now().checked_add(timeout);

    loop {
        if check().await? {
            return Ok(true);
        }

        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(false);
                }
                poll_interval.min(deadline - now)
            }
            None => poll_interval,
        };

        tokio::time::sleep(pause).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Session serving fixed markup; navigation fails while `failures` > 0
    struct StaticSession {
        html: String,
        failures: Arc<AtomicUsize>,
        quits: Arc<AtomicUsize>,
        url: Mutex<String>,
    }

    #[async_trait]
    impl BrowserSession for StaticSession {
        async fn navigate(&self, url: &str) -> Result<()> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(ScrapeError::Navigation {
                    url: url.to_string(),
                    message: "connection reset".to_string(),
                });
            }
            *self.url.lock().unwrap() = url.to_string();
            Ok(())
        }

        async fn current_url(&self) -> Result<String> {
            Ok(self.url.lock().unwrap().clone())
        }

        async fn element_present(&self, selector: &str) -> Result<bool> {
            Ok(self.html.contains(selector))
        }

        async fn ready_state(&self) -> Result<String> {
            Ok("complete".to_string())
        }

        async fn content(&self) -> Result<String> {
            Ok(self.html.clone())
        }

        async fn click(&self, _selector: &str) -> Result<bool> {
            Ok(false)
        }

        async fn quit(&self) -> Result<()> {
            self.quits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct StaticLauncher {
        html: String,
        failures: Arc<AtomicUsize>,
        launches: AtomicUsize,
        quits: Arc<AtomicUsize>,
    }

    impl StaticLauncher {
        fn new(html: &str, failures: usize) -> Arc<Self> {
            Arc::new(Self {
                html: html.to_string(),
                failures: Arc::new(AtomicUsize::new(failures)),
                launches: AtomicUsize::new(0),
                quits: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    #[async_trait]
    impl SessionLauncher for StaticLauncher {
        async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StaticSession {
                html: self.html.clone(),
                failures: self.failures.clone(),
                quits: self.quits.clone(),
                url: Mutex::new(String::new()),
            }))
        }
    }

    fn long_page() -> String {
        format!("<html><body>{}</body></html>", "x".repeat(1200))
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_created_lazily_and_reused() {
        let launcher = StaticLauncher::new(&long_page(), 0);
        let mut fetcher = PageFetcher::new(launcher.clone(), FetchSettings::default());
        assert!(!fetcher.has_session());

        fetcher.fetch_page("https://x.com/a", None).await.unwrap();
        fetcher.fetch_page("https://x.com/b", None).await.unwrap();

        assert!(fetcher.has_session());
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
        assert_eq!(
            fetcher.current_url().await.unwrap().as_deref(),
            Some("https://x.com/b")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempt_replaces_session() {
        let launcher = StaticLauncher::new(&long_page(), 2);
        let mut fetcher = PageFetcher::new(launcher.clone(), FetchSettings::default());

        let html = fetcher.fetch_page("https://x.com/a", None).await.unwrap();

        assert_eq!(html, long_page());
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 3);
        assert_eq!(launcher.quits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_soft_wait_timeout_still_returns_markup() {
        let launcher = StaticLauncher::new(&long_page(), 0);
        let mut fetcher = PageFetcher::new(launcher, FetchSettings::with_timeout(Duration::from_secs(5)));

        let html = fetcher
            .fetch_page("https://x.com/a", Some("div.never-there"))
            .await
            .unwrap();

        assert_eq!(html, long_page());
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_page_waits_then_returns() {
        let launcher = StaticLauncher::new("<html>tiny</html>", 0);
        let mut fetcher = PageFetcher::new(launcher, FetchSettings::default());
        let start = Instant::now();

        let html = fetcher.fetch_page("https://x.com/a", None).await.unwrap();

        assert_eq!(html, "<html>tiny</html>");
        assert!(start.elapsed() >= Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent() {
        let launcher = StaticLauncher::new(&long_page(), 0);
        let mut fetcher = PageFetcher::new(launcher.clone(), FetchSettings::default());
        fetcher.fetch_page("https://x.com/a", None).await.unwrap();

        fetcher.close().await;
        fetcher.close().await;

        assert!(!fetcher.has_session());
        assert_eq!(launcher.quits.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.current_url().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_without_session() {
        let launcher = StaticLauncher::new(&long_page(), 0);
        let fetcher = PageFetcher::new(launcher, FetchSettings::default());
        assert!(matches!(
            fetcher.click("a.next", None).await,
            Err(ScrapeError::NoSession)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_times_out() {
        let start = Instant::now();
        let found = wait_until(Duration::from_secs(3), Duration::from_millis(500), || async {
            Ok(false)
        })
        .await
        .unwrap();

        assert!(!found);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_propagates_errors() {
        let result = wait_until(Duration::from_secs(3), Duration::from_millis(500), || async {
            Err(ScrapeError::NoSession)
        })
        .await;
        assert!(matches!(result, Err(ScrapeError::NoSession)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_unbounded_timeout() {
        let mut polls = 0;
        let found = wait_until(Duration::MAX, Duration::from_millis(250), || {
            polls += 1;
            let ready = polls >= 3;
            async move { Ok(ready) }
        })
        .await
        .unwrap();

        assert!(found);
        assert_eq!(polls, 3);
    }
}
