use crate::error::{BrowserError, Result};
use crate::locator::Locator;
use std::time::Duration;

/// Interval between polls while waiting on the page.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Browser actions for automation
#[async_trait::async_trait]
pub trait BrowserActions: Send + Sync {
    /// Navigate to a URL
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Current document title (empty when the page has none)
    async fn title(&self) -> Result<String>;

    /// Whether an element currently exists
    async fn is_present(&self, locator: &Locator) -> Result<bool>;

    /// Fill a form field
    async fn fill_field(&self, locator: &Locator, value: &str) -> Result<()>;

    /// Click an element
    async fn click(&self, locator: &Locator) -> Result<()>;

    /// Choose a `<select>` option by value
    async fn select_option(&self, locator: &Locator, value: &str) -> Result<()>;

    /// Extract text from an element
    async fn extract_text(&self, locator: &Locator) -> Result<String>;

    /// Tag the document holding `locator` as stale
    async fn mark_stale(&self, locator: &Locator) -> Result<()>;

    /// Whether the document holding `locator` has been replaced since it was
    /// marked stale and has finished loading
    async fn is_reloaded(&self, locator: &Locator) -> Result<bool>;

    /// Shut the browser down and release the profile
    async fn close(self) -> Result<()>
    where
        Self: Sized;

    /// Wait for an element to appear
    async fn wait_for_selector(&self, locator: &Locator, timeout: Duration) -> Result<()> {
        let wait = async {
            loop {
                match self.is_present(locator).await {
                    Ok(true) => return Ok(()),
                    Ok(false) => {}
                    Err(e) if e.is_missing_element() => {}
                    Err(e) => return Err(e),
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| BrowserError::Timeout(format!("waiting for {locator}")))?
    }

    /// Wait for the document holding `locator` to be replaced and loaded
    async fn wait_for_reload(&self, locator: &Locator, timeout: Duration) -> Result<()> {
        let wait = async {
            loop {
                match self.is_reloaded(locator).await {
                    Ok(true) => return Ok(()),
                    Ok(false) => {}
                    Err(e) if e.is_missing_element() => {}
                    Err(e) => return Err(e),
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| BrowserError::Timeout(format!("waiting for {locator} to reload")))?
    }

    /// Wait for the document title to become `expected`
    async fn wait_for_title(&self, expected: &str, timeout: Duration) -> Result<()> {
        let wait = async {
            loop {
                if self.title().await? == expected {
                    return Ok(());
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| BrowserError::Timeout(format!("waiting for title '{expected}'")))?
    }
}
