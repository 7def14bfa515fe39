//! Error types for the renderer

use thiserror::Error;

/// Result type alias for render operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering a page
#[derive(Error, Debug)]
pub enum Error {
    /// The browser process failed to start or died mid-render
    #[error("Browser session failed: {0}")]
    BrowserSession(String),

    /// The target URL failed to load
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// Page-side instrumentation or embedding failed
    #[error("Page script failed: {0}")]
    Script(String),

    /// The last-resort timeout elapsed before the page settled
    #[error("Render timed out after {0}ms")]
    RenderTimeout(u64),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Filesystem error while reading options or writing output
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Status code a serving layer should answer with for this failure.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::RenderTimeout(_) => 504,
            Error::Navigation(_) => 502,
            _ => 500,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::BrowserSession(err.to_string())
    }
}
