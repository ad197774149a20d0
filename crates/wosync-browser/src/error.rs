use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium error: {0}")]
    ChromiumError(String),

    #[error("navigation failed: {0}")]
    NavigationError(String),

    #[error("selector not found: {0}")]
    SelectorNotFound(String),

    #[error("frame not found: {0}")]
    FrameNotFound(String),

    #[error("script error: {0}")]
    Script(String),

    #[error("timeout: {0}")]
    Timeout(String),
}

impl BrowserError {
    /// True when the page simply lacks the requested element or frame.
    #[must_use]
    pub fn is_missing_element(&self) -> bool {
        matches!(self, Self::SelectorNotFound(_) | Self::FrameNotFound(_))
    }
}
