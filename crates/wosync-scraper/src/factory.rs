//! Opening authenticated sessions.

use crate::error::{Result, ScrapeError};
use crate::portal::PortalSettings;
use crate::profiles::ProfileManager;
use crate::session::ScrapeSession;
use async_trait::async_trait;
use tracing::{info, warn};
use wosync_browser::{BrowserActions, BrowserEngine, LaunchOptions};
use wosync_core::{BrowserConfig, Identity, PortalConfig};

/// Produces sessions that are logged in and ready to scrape.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Browser the sessions drive
    type Browser: BrowserActions + 'static;

    /// Open a session on profile `instance_id`. Instance 0 is the primary.
    ///
    /// # Errors
    /// `ScrapeError::Authentication` when login fails; the caller must treat
    /// that as fatal for the session and not retry.
    async fn open(&self, instance_id: u32, headless: bool) -> Result<ScrapeSession<Self::Browser>>;
}

/// Launches Chrome against the identity's on-disk profiles.
pub struct ChromeSessionFactory {
    profiles: ProfileManager,
    identity: Identity,
    browser: BrowserConfig,
    settings: PortalSettings,
}

impl ChromeSessionFactory {
    /// Factory for `identity`, with profiles under `profiles`.
    pub fn new(
        profiles: ProfileManager,
        identity: Identity,
        browser: BrowserConfig,
        portal: &PortalConfig,
    ) -> Self {
        let settings = PortalSettings::from_config(portal, &browser);
        Self {
            profiles,
            identity,
            browser,
            settings,
        }
    }

    fn launch_options(&self, profile_dir: &std::path::Path, headless: bool) -> LaunchOptions {
        LaunchOptions {
            profile_dir: profile_dir.to_path_buf(),
            headless,
            chrome_executable: self.browser.chrome_executable.clone(),
            window_width: self.browser.window_width,
            window_height: self.browser.window_height,
            navigation_timeout: self.browser.navigation_timeout(),
        }
    }
}

#[async_trait]
impl SessionFactory for ChromeSessionFactory {
    type Browser = BrowserEngine;

    async fn open(&self, instance_id: u32, headless: bool) -> Result<ScrapeSession<BrowserEngine>> {
        let profiles = self.profiles.clone();
        let hash = self.identity.hash();
        let profile = tokio::task::spawn_blocking(move || profiles.ensure(&hash, instance_id))
            .await
            .map_err(|e| ScrapeError::Process(e.to_string()))??;

        let engine =
            BrowserEngine::launch(&self.launch_options(&profile.storage_path, headless)).await?;
        let mut session = ScrapeSession::new(engine, profile, self.settings.clone());

        if let Err(e) = session.authenticate(&self.identity).await {
            if let Err(close_err) = session.close().await {
                warn!("Failed to close browser after login failure: {}", close_err);
            }
            return Err(e.into());
        }

        self.profiles.mark_authenticated(session.profile())?;
        info!(worker = instance_id, headless, "Session ready");
        Ok(session)
    }
}
