//! A live, authenticated portal session that scrapes items one at a time.

use crate::error::{AuthError, ExtractionError};
use crate::portal::{self, PortalSettings};
use crate::profiles::SessionProfile;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wosync_browser::{BrowserActions, Result as BrowserResult};
use wosync_core::{FieldMap, Identity, ItemKind, ScrapeResult, WorkItem};
use wosync_db::ResultSink;

/// Where a session is in its lifecycle.
///
/// `Init -> Authenticating -> Ready`, then per item
/// `[Selecting ->] Searching -> Extracting -> Recorded`, and finally `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Browser bound to its profile, not logged in
    Init,
    /// Login in progress
    Authenticating,
    /// Logged in, no item yet
    Ready,
    /// Choosing the search category
    Selecting,
    /// Waiting for search results
    Searching,
    /// Reading fields off the results page
    Extracting,
    /// Last result handed to the sink
    Recorded,
    /// Browser shut down
    Closed,
}

/// Counters for one pass over a list of items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    /// Items a result was produced for
    pub attempted: usize,
    /// Results with data
    pub found: usize,
    /// Placeholder results for items that could not be located
    pub placeholders: usize,
    /// Results the sink failed to persist
    pub write_failures: usize,
    /// The pass stopped early on an interrupt
    pub interrupted: bool,
}

impl SessionReport {
    /// Results handed to the sink successfully.
    pub fn persisted(&self) -> usize {
        self.attempted - self.write_failures
    }
}

/// One browser bound to one profile.
///
/// The session remembers the search category it last selected and skips
/// re-selecting it while consecutive items share a kind and succeed.
pub struct ScrapeSession<B: BrowserActions> {
    browser: B,
    profile: SessionProfile,
    settings: PortalSettings,
    state: SessionState,
    category: Option<ItemKind>,
}

impl<B: BrowserActions> ScrapeSession<B> {
    /// Session over an already launched `browser`.
    pub fn new(browser: B, profile: SessionProfile, settings: PortalSettings) -> Self {
        Self {
            browser,
            profile,
            settings,
            state: SessionState::Init,
            category: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Profile the browser runs on.
    pub fn profile(&self) -> &SessionProfile {
        &self.profile
    }

    fn instance(&self) -> u32 {
        self.profile.instance_id
    }

    fn transition(&mut self, next: SessionState) {
        debug!(worker = self.instance(), from = ?self.state, to = ?next, "Session state");
        self.state = next;
    }

    /// Log into the portal through this session's profile.
    pub async fn authenticate(&mut self, identity: &Identity) -> Result<(), AuthError> {
        self.transition(SessionState::Authenticating);
        portal::login(&self.browser, identity, &self.settings).await?;
        self.profile.authenticated = true;
        self.transition(SessionState::Ready);
        Ok(())
    }

    /// Scrape one item. Never fails: an item that cannot be located or read
    /// yields a placeholder result.
    pub async fn scrape(&mut self, item: &WorkItem) -> ScrapeResult {
        match self.try_scrape(item).await {
            Ok(fields) => ScrapeResult::found(item, fields),
            Err(e) => {
                warn!(worker = self.instance(), "Recording placeholder: {}", e);
                // The page may be anywhere now, so select again next time.
                self.category = None;
                ScrapeResult::placeholder(item)
            }
        }
    }

    async fn try_scrape(&mut self, item: &WorkItem) -> Result<FieldMap, ExtractionError> {
        let browser_error = |source| ExtractionError::Browser {
            item: item.key(),
            source,
        };

        if self.category != Some(item.kind()) {
            self.transition(SessionState::Selecting);
            portal::select_category(&self.browser, item.kind(), &self.settings)
                .await
                .map_err(browser_error)?;
            self.category = Some(item.kind());
        }

        self.transition(SessionState::Searching);
        portal::search(&self.browser, &item.key(), &self.settings)
            .await
            .map_err(browser_error)?;

        self.transition(SessionState::Extracting);
        portal::extract(&self.browser, item).await
    }

    /// Scrape `items` in order, writing each result to `sink` as it is produced.
    ///
    /// A failed write is logged and counted; the pass continues. Cancellation
    /// stops the pass before the next item, or abandons the item in flight.
    pub async fn run<S: ResultSink + ?Sized>(
        &mut self,
        items: &[WorkItem],
        sink: &S,
        cancel: &CancellationToken,
    ) -> SessionReport {
        let mut report = SessionReport::default();
        info!(worker = self.instance(), items = items.len(), "Starting scrape pass");

        for item in items {
            if cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    report.interrupted = true;
                    break;
                }
                result = self.scrape(item) => result,
            };

            report.attempted += 1;
            if result.found {
                report.found += 1;
            } else {
                report.placeholders += 1;
            }
            self.transition(SessionState::Recorded);

            match sink.write(&result).await {
                Ok(()) => debug!(worker = self.instance(), "Recorded {}", item),
                Err(e) => {
                    report.write_failures += 1;
                    error!(worker = self.instance(), "Failed to persist {}: {}", item, e);
                }
            }
        }

        if report.interrupted {
            warn!(
                worker = self.instance(),
                "Interrupted after {} of {} items",
                report.attempted,
                items.len()
            );
        } else {
            info!(
                worker = self.instance(),
                found = report.found,
                placeholders = report.placeholders,
                "Scrape pass complete"
            );
        }
        report
    }

    /// Shut the browser down, releasing the profile.
    pub async fn close(mut self) -> BrowserResult<()> {
        self.transition(SessionState::Closed);
        self.browser.close().await
    }
}
