//! The worker side of process isolation.
//!
//! A worker is this same binary re-executed with the hidden `worker`
//! subcommand. It reads one [`WorkerSpec`] as JSON from stdin, scrapes its
//! bucket with its own browser, profile and database connection, and prints
//! one [`WorkerOutcome`] as JSON on stdout. The exit code mirrors the outcome
//! for when stdout is lost.

use crate::error::ScrapeError;
use crate::factory::{ChromeSessionFactory, SessionFactory};
use crate::partition::ProcessAssignment;
use crate::profiles::ProfileManager;
use crate::session::SessionReport;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use wosync_core::{BrowserConfig, DatabaseConfig, Identity, PortalConfig};
use wosync_db::{ResultSink, ResultStore};

/// Exit code of a worker that finished its bucket.
pub const EXIT_COMPLETED: i32 = 0;
/// Exit code of a worker that could not start or crashed.
pub const EXIT_FAILED: i32 = 1;
/// Exit code of a worker whose login failed.
pub const EXIT_AUTHENTICATION_FAILED: i32 = 3;
/// Exit code of an interrupted worker, as for SIGINT.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Everything a worker process needs, passed over stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Items to scrape
    pub assignment: ProcessAssignment,
    /// Portal login
    pub identity: Identity,
    /// Run Chrome without a window
    pub headless: bool,
    /// Chrome settings, with the profiles directory resolved
    pub browser: BrowserConfig,
    /// Portal identifiers
    pub portal: PortalConfig,
    /// Connection parameters for the worker's own store
    pub database: DatabaseConfig,
}

/// Settings shared by every worker of one range; the assignment differs.
#[derive(Debug, Clone)]
pub struct WorkerTemplate {
    /// Portal login
    pub identity: Identity,
    /// Run Chrome without a window
    pub headless: bool,
    /// Chrome settings
    pub browser: BrowserConfig,
    /// Portal identifiers
    pub portal: PortalConfig,
    /// Connection parameters
    pub database: DatabaseConfig,
}

impl WorkerTemplate {
    /// Same template with `headless` replaced.
    #[must_use]
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Spec for the worker that owns `assignment`.
    pub fn spec_for(&self, assignment: ProcessAssignment) -> WorkerSpec {
        WorkerSpec {
            assignment,
            identity: self.identity.clone(),
            headless: self.headless,
            browser: self.browser.clone(),
            portal: self.portal.clone(),
            database: self.database.clone(),
        }
    }
}

/// How a worker ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum WorkerOutcome {
    /// Every assigned item produced a result
    Completed(SessionReport),
    /// Stopped early on an interrupt
    Interrupted(SessionReport),
    /// Login failed; the bucket was abandoned
    AuthenticationFailed(String),
    /// Could not start, or crashed
    Failed(String),
}

impl WorkerOutcome {
    /// Process exit code reporting this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed(_) => EXIT_COMPLETED,
            Self::Interrupted(_) => EXIT_INTERRUPTED,
            Self::AuthenticationFailed(_) => EXIT_AUTHENTICATION_FAILED,
            Self::Failed(_) => EXIT_FAILED,
        }
    }

    /// Best guess at the outcome when only the exit code survived.
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(EXIT_COMPLETED) => Self::Completed(SessionReport::default()),
            Some(EXIT_INTERRUPTED) => Self::Interrupted(SessionReport {
                interrupted: true,
                ..SessionReport::default()
            }),
            Some(EXIT_AUTHENTICATION_FAILED) => {
                Self::AuthenticationFailed("worker reported authentication failure".to_string())
            }
            Some(code) => Self::Failed(format!("worker exited with status {code}")),
            None => Self::Failed("worker terminated by signal".to_string()),
        }
    }

    /// Counters, when the worker got as far as scraping.
    pub fn report(&self) -> Option<&SessionReport> {
        match self {
            Self::Completed(report) | Self::Interrupted(report) => Some(report),
            Self::AuthenticationFailed(_) | Self::Failed(_) => None,
        }
    }

    /// Whether the whole bucket was scraped.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Open a session for `assignment`, scrape it into `sink`, and close it.
///
/// Failures stay inside this worker: they become the returned outcome.
pub async fn run_worker<F, S>(
    factory: &F,
    sink: &S,
    assignment: &ProcessAssignment,
    headless: bool,
    cancel: &CancellationToken,
) -> WorkerOutcome
where
    F: SessionFactory + ?Sized,
    S: ResultSink + ?Sized,
{
    let index = assignment.worker_index();
    info!(worker = index, items = assignment.len(), "Worker starting");

    let opened = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            warn!(worker = index, "Interrupted before the session was ready");
            return WorkerOutcome::Interrupted(SessionReport {
                interrupted: true,
                ..SessionReport::default()
            });
        }
        opened = factory.open(index, headless) => opened,
    };

    let mut session = match opened {
        Ok(session) => session,
        Err(ScrapeError::Authentication(e)) => {
            error!(worker = index, "Authentication failed, abandoning bucket: {}", e);
            return WorkerOutcome::AuthenticationFailed(e.to_string());
        }
        Err(e) => {
            error!(worker = index, "Worker could not start: {}", e);
            return WorkerOutcome::Failed(e.to_string());
        }
    };

    let report = session.run(assignment.items(), sink, cancel).await;
    if let Err(e) = session.close().await {
        warn!(worker = index, "Failed to close browser: {}", e);
    }

    if report.interrupted {
        WorkerOutcome::Interrupted(report)
    } else {
        WorkerOutcome::Completed(report)
    }
}

/// Entry point of a worker process: wire real Chrome and the database to
/// [`run_worker`].
pub async fn execute(spec: WorkerSpec, cancel: CancellationToken) -> WorkerOutcome {
    let index = spec.assignment.worker_index();

    let store = match ResultStore::connect(&spec.database).await {
        Ok(store) => store,
        Err(e) => {
            let e = ScrapeError::from(e);
            error!(worker = index, "Could not open result store: {}", e);
            return WorkerOutcome::Failed(e.to_string());
        }
    };

    let profiles_root = match &spec.browser.profiles_dir {
        Some(dir) => dir.clone(),
        None => {
            store.close().await;
            return WorkerOutcome::Failed("profiles directory not resolved".to_string());
        }
    };

    let factory = ChromeSessionFactory::new(
        ProfileManager::new(profiles_root),
        spec.identity,
        spec.browser,
        &spec.portal,
    );
    let outcome = run_worker(&factory, &store, &spec.assignment, spec.headless, &cancel).await;

    store.close().await;
    outcome
}
