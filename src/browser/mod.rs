//! Browser-driven page fetching
//!
//! This module contains everything that talks to a real browser:
//! - The [`BrowserSession`] / [`SessionLauncher`] seam the rest of the crate
//!   is written against
//! - The headless Chrome implementation of that seam
//! - [`PageFetcher`], which loads pages with soft waits and retries

mod chrome;
mod fetcher;

pub use chrome::{discover_websocket_url, BrowserSettings, ChromeLauncher, ChromeSession};
pub use fetcher::{wait_until, FetchSettings, PageFetcher};

use crate::Result;
use async_trait::async_trait;

/// One live browser tab
///
/// Implementations must not block the async runtime; the waits and retries
/// layered on top assume every call returns promptly.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Starts loading `url` in the tab
    async fn navigate(&self, url: &str) -> Result<()>;

    /// URL currently shown in the tab
    async fn current_url(&self) -> Result<String>;

    /// Whether an element matching the CSS `selector` is in the DOM right now
    async fn element_present(&self, selector: &str) -> Result<bool>;

    /// Value of `document.readyState`
    async fn ready_state(&self) -> Result<String>;

    /// Full rendered markup of the page
    async fn content(&self) -> Result<String>;

    /// Clicks the first element matching `selector`; `false` when there is none
    async fn click(&self, selector: &str) -> Result<bool>;

    /// Tears the session down
    async fn quit(&self) -> Result<()>;
}

/// Creates browser sessions on demand
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}
