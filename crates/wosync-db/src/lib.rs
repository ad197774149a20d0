//! wosync Database Layer
//!
//! Persists scrape results. Every worker process opens its own connection and
//! writes each result independently; there is no cross-worker transaction.
//!
//! # Architecture
//!
//! - **Contract**: [`ResultSink`] is what scrape sessions write through
//! - **Store**: [`ResultStore`] upserts into one table per record kind
//! - **Migrations**: SQL migrations are embedded and versioned using `SQLx`
//! - **Drivers**: `SQLx`'s `Any` driver; PostgreSQL in production
//!
//! # Example
//!
//! ```ignore
//! use wosync_db::{ResultSink, ResultStore};
//!
//! let store = ResultStore::connect(&config.database).await?;
//! store.write(&result).await?;
//! store.close().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod connection;
pub mod error;
pub mod migrations;
pub mod sink;
pub mod store;

// Re-export commonly used types
pub use connection::connection_url;
pub use error::{DatabaseError, Result};
pub use sink::ResultSink;
pub use store::ResultStore;
