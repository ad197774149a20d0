//! wosync Core - Foundation crate for the wosync range scraper.
//!
//! This crate provides the shared types, error handling, and configuration
//! management that every other wosync crate depends on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Work items, scrape results, and the scraping identity
//!
//! # Example
//!
//! ```rust
//! use wosync_core::{AppConfig, ItemKind, WorkItem};
//!
//! let config = AppConfig::default();
//! assert!(config.scraper.headless_parallel);
//!
//! let item = WorkItem::order("WO", 42);
//! assert_eq!(item.kind(), ItemKind::Order);
//! assert_eq!(item.key(), "WO42");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, BrowserConfig, DatabaseConfig, GeneralConfig, PortalConfig, ScraperConfig,
};
pub use error::{ConfigError, ConfigResult, Result, WosyncError};
pub use types::{FieldMap, Identity, IdentityHash, ItemKind, ScrapeResult, WorkItem};
