//! Range scraping for the maintenance portal.
//!
//! A range of record ids is either scraped by the long-lived primary session
//! or split across worker processes, each with its own browser profile,
//! Chrome instance, and database connection.
//!
//! # Architecture
//!
//! - [`partition`] - deterministic assignment of ids to workers
//! - [`profiles`] - per-identity profile directories and cloning
//! - [`portal`] - login, search, and extraction page flows
//! - [`session`] - one authenticated browser scraping items in order
//! - [`worker`] - the worker process contract and its entry point
//! - [`supervisor`] - fan-out with the release, clone, launch, reopen barrier
//! - [`orchestrator`] - [`RangeScraper`], the entry point tying it together
//!
//! # Example
//!
//! ```ignore
//! use wosync_scraper::{ChromeSessionFactory, Primary, RangeRequest, RangeScraper};
//!
//! let primary = Primary::open(factory, false).await?;
//! let mut scraper = RangeScraper::new(primary, store, supervisor, template);
//! let report = scraper
//!     .scrape_range(&RangeRequest::orders("WO", 5, 7), 2, true)
//!     .await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]

pub mod error;
pub mod factory;
pub mod orchestrator;
pub mod partition;
pub mod portal;
pub mod profiles;
pub mod session;
pub mod supervisor;
pub mod worker;

#[cfg(test)]
mod testing;

pub use error::{AuthError, ExtractionError, Result, ScrapeError};
pub use factory::{ChromeSessionFactory, SessionFactory};
pub use orchestrator::{Primary, RangeReport, RangeScraper};
pub use partition::{assigned_worker, partition, ProcessAssignment, RangeRequest};
pub use portal::PortalSettings;
pub use profiles::{ProfileManager, SessionProfile};
pub use session::{ScrapeSession, SessionReport, SessionState};
pub use supervisor::{
    PrimarySession, ProcessLauncher, WorkerLauncher, WorkerReport, WorkerSupervisor,
};
pub use worker::{run_worker, WorkerOutcome, WorkerSpec, WorkerTemplate};
