use crate::actions::BrowserActions;
use crate::error::{BrowserError, Result};
use crate::locator::{element_script, ElementAction, Locator, ScriptOutcome};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How to launch a browser for one scrape session.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Profile directory the browser exclusively owns while running
    pub profile_dir: PathBuf,
    /// Run without a visible window
    pub headless: bool,
    /// Chrome binary (None = chromiumoxide's default lookup)
    pub chrome_executable: Option<PathBuf>,
    /// Window width for headful sessions
    pub window_width: u32,
    /// Window height for headful sessions
    pub window_height: u32,
    /// Upper bound on a single navigation
    pub navigation_timeout: Duration,
}

impl LaunchOptions {
    pub fn new(profile_dir: impl Into<PathBuf>, headless: bool) -> Self {
        Self {
            profile_dir: profile_dir.into(),
            headless,
            chrome_executable: None,
            window_width: 1280,
            window_height: 720,
            navigation_timeout: Duration::from_secs(10),
        }
    }
}

/// Browser automation engine bound to a single profile directory.
///
/// Owns one Chrome process and one page. Not shareable across workers: the
/// profile directory is locked by Chrome for as long as the engine is open.
pub struct BrowserEngine {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    navigation_timeout: Duration,
}

impl BrowserEngine {
    /// Launch Chrome against `options.profile_dir` and open a blank page.
    pub async fn launch(options: &LaunchOptions) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .user_data_dir(&options.profile_dir)
            .window_size(options.window_width, options.window_height)
            .request_timeout(options.navigation_timeout);

        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &options.chrome_executable {
            builder = builder.chrome_executable(executable);
        }

        let config = builder.build().map_err(BrowserError::ChromiumError)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        // Spawn browser handler
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        tracing::debug!(
            profile = %options.profile_dir.display(),
            headless = options.headless,
            "Browser launched"
        );

        Ok(Self {
            browser,
            page,
            handler,
            navigation_timeout: options.navigation_timeout,
        })
    }

    async fn run(&self, locator: &Locator, action: &ElementAction) -> Result<ScriptOutcome> {
        let script = element_script(locator, action);
        let raw: String = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?
            .into_value()
            .map_err(|e| BrowserError::Script(e.to_string()))?;

        ScriptOutcome::parse(&raw, locator)
    }
}

#[async_trait::async_trait]
impl BrowserActions for BrowserEngine {
    async fn navigate(&self, url: &str) -> Result<()> {
        tokio::time::timeout(self.navigation_timeout, self.page.goto(url))
            .await
            .map_err(|_| BrowserError::Timeout(format!("navigating to {url}")))?
            .map_err(|e| BrowserError::NavigationError(e.to_string()))?;
        Ok(())
    }

    async fn title(&self) -> Result<String> {
        let title = self
            .page
            .get_title()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        Ok(title.unwrap_or_default())
    }

    async fn is_present(&self, locator: &Locator) -> Result<bool> {
        match self.run(locator, &ElementAction::Exists).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_missing_element() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn fill_field(&self, locator: &Locator, value: &str) -> Result<()> {
        self.run(locator, &ElementAction::Fill(value.to_string()))
            .await
            .map(|_| ())
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        self.run(locator, &ElementAction::Click).await.map(|_| ())
    }

    async fn select_option(&self, locator: &Locator, value: &str) -> Result<()> {
        self.run(locator, &ElementAction::Select(value.to_string()))
            .await
            .map(|_| ())
    }

    async fn extract_text(&self, locator: &Locator) -> Result<String> {
        let outcome = self.run(locator, &ElementAction::Text).await?;
        Ok(outcome.value.unwrap_or_default())
    }

    async fn mark_stale(&self, locator: &Locator) -> Result<()> {
        self.run(locator, &ElementAction::MarkStale).await.map(|_| ())
    }

    async fn is_reloaded(&self, locator: &Locator) -> Result<bool> {
        let outcome = self.run(locator, &ElementAction::LoadState).await?;
        Ok(outcome.value.as_deref() == Some("complete"))
    }

    async fn close(mut self) -> Result<()> {
        self.browser
            .close()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        if let Err(e) = self.browser.wait().await {
            tracing::warn!("Browser process did not exit cleanly: {}", e);
        }
        self.handler.abort();
        tracing::debug!("Browser closed");
        Ok(())
    }
}
