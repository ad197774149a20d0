//! Range scraping entry point.
//!
//! With one process the primary session scrapes the whole range itself. With
//! more, the range is partitioned and handed to the supervisor, which runs the
//! buckets in isolated worker processes.

use crate::error::{Result, ScrapeError};
use crate::factory::SessionFactory;
use crate::partition::{partition, total_items, RangeRequest};
use crate::session::{ScrapeSession, SessionReport};
use crate::supervisor::{PrimarySession, WorkerLauncher, WorkerReport, WorkerSupervisor};
use crate::worker::{WorkerOutcome, WorkerTemplate};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wosync_core::ItemKind;
use wosync_db::ResultSink;

/// The session on the base profile, kept open between ranges.
pub struct Primary<F: SessionFactory> {
    factory: F,
    headless: bool,
    session: Option<ScrapeSession<F::Browser>>,
}

impl<F: SessionFactory> Primary<F> {
    /// Open and authenticate the primary session.
    pub async fn open(factory: F, headless: bool) -> Result<Self> {
        let session = factory.open(0, headless).await?;
        Ok(Self {
            factory,
            headless,
            session: Some(session),
        })
    }

    /// Whether a browser is currently attached.
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// The open session, or `PrimaryUnavailable` while released.
    pub fn session_mut(&mut self) -> Result<&mut ScrapeSession<F::Browser>> {
        self.session.as_mut().ok_or_else(|| {
            ScrapeError::PrimaryUnavailable("primary session is closed".to_string())
        })
    }

    /// Close the browser if it is open.
    pub async fn close(mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            session.close().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<F: SessionFactory> PrimarySession for Primary<F> {
    async fn release(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            session.close().await?;
            info!("Primary session released");
        }
        Ok(())
    }

    async fn reopen(&mut self) -> Result<()> {
        if self.session.is_none() {
            self.session = Some(self.factory.open(0, self.headless).await?);
            info!("Primary session reopened");
        }
        Ok(())
    }
}

/// Summary of one range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeReport {
    /// Record kind of the range
    pub kind: ItemKind,
    /// Items in the range after edge policy
    pub requested: usize,
    /// One entry per worker; a single entry for index 0 when sequential
    pub workers: Vec<WorkerReport>,
}

impl RangeReport {
    /// Results produced across all workers that reported back.
    pub fn attempted(&self) -> usize {
        self.workers
            .iter()
            .filter_map(|w| w.outcome.report())
            .map(|r| r.attempted)
            .sum()
    }

    /// Every item produced a result and every worker completed.
    pub fn is_complete(&self) -> bool {
        self.workers.iter().all(|w| w.outcome.is_success()) && self.attempted() == self.requested
    }

    /// Workers that did not complete their bucket.
    pub fn failed_workers(&self) -> impl Iterator<Item = &WorkerReport> {
        self.workers.iter().filter(|w| !w.outcome.is_success())
    }
}

/// Scrapes id ranges with one primary session and, on demand, parallel workers.
pub struct RangeScraper<F: SessionFactory, S: ResultSink, L: WorkerLauncher> {
    primary: Primary<F>,
    sink: S,
    supervisor: WorkerSupervisor<L>,
    template: WorkerTemplate,
    cancel: CancellationToken,
}

impl<F, S, L> RangeScraper<F, S, L>
where
    F: SessionFactory,
    S: ResultSink,
    L: WorkerLauncher,
{
    /// Scraper writing sequential results to `sink` and fanning out
    /// through `supervisor` with workers built from `template`.
    pub fn new(
        primary: Primary<F>,
        sink: S,
        supervisor: WorkerSupervisor<L>,
        template: WorkerTemplate,
    ) -> Self {
        Self {
            primary,
            sink,
            supervisor,
            template,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop scraping when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Scrape `request` with `process_count` processes.
    ///
    /// `headless` applies to parallel workers; the primary keeps the mode it
    /// was opened with. Returns once every item has a result or every worker
    /// has ended.
    ///
    /// # Errors
    /// `Configuration` for a zero process count or bad prefix,
    /// `PrimaryUnavailable` when the primary cannot be used, released or
    /// reopened, and profile errors raised before workers start.
    pub async fn scrape_range(
        &mut self,
        request: &RangeRequest,
        process_count: u32,
        headless: bool,
    ) -> Result<RangeReport> {
        let assignments = partition(request, process_count)?;
        let requested = total_items(&assignments);
        let (start, stop) = request.bounds();
        info!(
            kind = %request.kind,
            start,
            stop,
            process_count,
            "Scraping {} items",
            requested
        );

        if requested == 0 {
            info!("Range is empty, nothing to scrape");
            return Ok(RangeReport {
                kind: request.kind,
                requested,
                workers: Vec::new(),
            });
        }

        let workers = if process_count == 1 {
            let items: Vec<_> = assignments
                .into_iter()
                .flat_map(|a| a.into_items())
                .collect();
            let session = self.primary.session_mut()?;
            let report = session.run(&items, &self.sink, &self.cancel).await;
            vec![WorkerReport {
                worker_index: 0,
                assigned: items.len(),
                outcome: outcome_of(report),
            }]
        } else {
            let template = self.template.clone().with_headless(headless);
            self.supervisor
                .supervise(&mut self.primary, assignments, &template)
                .await?
        };

        let report = RangeReport {
            kind: request.kind,
            requested,
            workers,
        };
        if report.is_complete() {
            info!(attempted = report.attempted(), "Range complete");
        } else {
            warn!(
                attempted = report.attempted(),
                requested,
                failed_workers = report.failed_workers().count(),
                "Range finished incomplete"
            );
        }
        Ok(report)
    }

    /// Close the primary session and hand back the sink.
    pub async fn shutdown(self) -> (S, Result<()>) {
        let closed = self.primary.close().await;
        (self.sink, closed)
    }
}

fn outcome_of(report: SessionReport) -> WorkerOutcome {
    if report.interrupted {
        WorkerOutcome::Interrupted(report)
    } else {
        WorkerOutcome::Completed(report)
    }
}
