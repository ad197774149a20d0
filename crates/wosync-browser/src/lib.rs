//! Browser automation client for the maintenance portal.
//!
//! Provides a profile-bound Chrome session with frame-aware element
//! lookups. Each engine exclusively owns its profile directory.

pub mod actions;
pub mod engine;
pub mod error;
pub mod locator;

pub use actions::BrowserActions;
pub use engine::{BrowserEngine, LaunchOptions};
pub use error::{BrowserError, Result};
pub use locator::Locator;
