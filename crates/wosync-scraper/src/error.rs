//! Error types for range scraping.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use wosync_browser::BrowserError;
use wosync_db::DatabaseError;

/// Errors that stop a range scrape or a worker.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Invalid worker count, order prefix or missing setting
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No base profile to clone workers from
    #[error("base profile missing at {}", .0.display())]
    BaseProfileMissing(PathBuf),

    /// A browser still holds the profile open
    #[error("profile at {} is held open by a live session", .0.display())]
    ProfileLocked(PathBuf),

    /// The primary session could not be used, released or reopened
    #[error("primary session unavailable: {0}")]
    PrimaryUnavailable(String),

    /// Login failed
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    /// Chrome could not be started or driven
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    /// The result store could not be opened
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// A worker process could not be run
    #[error("worker process error: {0}")]
    Process(String),

    /// Filesystem or pipe failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker spec or outcome could not be encoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Login failures. Fatal for the session that hit them; never retried.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The portal ended on an unexpected page
    #[error("credentials rejected (portal showed '{title}')")]
    Rejected {
        /// Title of the page the login ended on
        title: String,
    },

    /// Nobody approved the second factor in time
    #[error("second-factor confirmation not received within {0:?}")]
    SecondFactorTimeout(Duration),

    /// The browser failed during login
    #[error("login flow failed: {0}")]
    Browser(#[from] BrowserError),
}

/// Per-item failures. Recovered inside the session as a placeholder result.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The results page has no record for the item
    #[error("{item} not found: {reason}")]
    NotFound {
        /// Item key as searched
        item: String,
        /// Why the page counts as empty
        reason: String,
    },

    /// The browser failed while the item was in flight
    #[error("browser error while scraping {item}: {source}")]
    Browser {
        /// Item key as searched
        item: String,
        /// Underlying browser failure
        #[source]
        source: BrowserError,
    },
}

/// Result alias for scraping operations.
pub type Result<T> = std::result::Result<T, ScrapeError>;
