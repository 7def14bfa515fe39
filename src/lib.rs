//! hydrate-ssr
//!
//! Server-side rendering for pages built with a reactive, data-binding client
//! framework. A hidden browser runs the page until its components stop
//! mutating, and the resulting markup is returned together with a
//! rehydration script that lets the next real client adopt the DOM without a
//! visible re-render.
//!
//! # Features
//!
//! - **CDP Backend** (default): drives headless Chrome through the DevTools Protocol
//! - **Pluggable sessions**: the orchestrator is generic over [`Session`], so
//!   the quiescence protocol can be exercised without a browser
//! - **Raw fallback**: pages without the framework come back untouched
//!
//! # Example
//!
//! ```no_run
//! use hydrate_ssr::{RenderOptions, RenderOutcome};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let options = RenderOptions {
//!     poll_timeout_ms: 500,
//!     last_resort_timeout_ms: 20000,
//!     ..Default::default()
//! };
//!
//! match hydrate_ssr::render("http://localhost:8000/index.html", &options).await? {
//!     RenderOutcome::Rendered(page) => println!("{} chars in {}ms", page.content.len(), page.elapsed_ms),
//!     RenderOutcome::TimedOut { elapsed_ms } => eprintln!("gave up after {}ms", elapsed_ms),
//! }
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::{Duration, Instant};

pub mod error;
pub use error::{Error, Result};

pub mod embed;
pub mod filter;
pub mod pipeline;
pub mod prerender;
pub mod probe;
pub mod quiesce;
pub mod render;
pub mod script;
pub mod signal;

// Async facade running each render on its own worker thread
pub mod async_api;

#[cfg(feature = "cdp")]
pub mod cdp;

pub use embed::{Completion, PageSink, Snapshot};
pub use probe::SnapshotPolicy;
pub use render::render_with;
pub use script::FrameworkProfile;
pub use signal::SignalSender;

#[cfg(feature = "cdp")]
pub use async_api::render;
#[cfg(feature = "cdp")]
pub use render::render_blocking;

/// Configuration for one render call
///
/// The defaults are conservative: headless, a 500ms quiescence window, a
/// 30s last-resort ceiling and the Mavo framework profile. Field names use
/// camelCase when read from JSON.
///
/// # Examples
///
/// ```
/// let opts = hydrate_ssr::RenderOptions::default();
/// assert!(opts.headless);
/// assert_eq!(opts.poll_timeout_ms, 500);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderOptions {
    /// Run the browser without a window
    pub headless: bool,
    /// Mutation-free window after which the page counts as settled
    pub poll_timeout_ms: u64,
    /// Absolute ceiling on a render, navigation included
    pub last_resort_timeout_ms: u64,
    /// Inject a stylesheet coloring components by rehydration phase
    pub color_debug: bool,
    /// Return the rendered DOM even when the framework is absent
    pub render_non_framework_pages: bool,
    /// Forward page console output to the log
    pub verbose: bool,
    /// Which pristine state wins when a component initializes twice
    pub snapshot_policy: SnapshotPolicy,
    /// Request-free window that counts as network near-idle after navigation
    pub network_idle_ms: u64,
    /// Browser window size
    pub viewport: Viewport,
    /// How the client framework exposes itself
    pub profile: FrameworkProfile,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            headless: true,
            poll_timeout_ms: 500,
            last_resort_timeout_ms: 30000,
            color_debug: false,
            render_non_framework_pages: false,
            verbose: false,
            snapshot_policy: SnapshotPolicy::default(),
            network_idle_ms: 500,
            viewport: Viewport::default(),
            profile: FrameworkProfile::default(),
        }
    }
}

impl RenderOptions {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn last_resort_timeout(&self) -> Duration {
        Duration::from_millis(self.last_resort_timeout_ms)
    }

    pub fn network_idle(&self) -> Duration {
        Duration::from_millis(self.network_idle_ms)
    }

    /// Parse options from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: RenderOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Reject settings the page scripts cannot be generated from.
    ///
    /// Timing is not checked: a ceiling at or below the debounce delay only
    /// means framework pages time out, while pages without the framework
    /// still come back raw.
    pub fn validate(&self) -> Result<()> {
        if self.profile.global.is_empty() || self.profile.template_id.is_empty() {
            return Err(Error::Config("framework profile needs a global and a template id".into()));
        }
        Ok(())
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// A finished render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    /// Final markup, or the raw response body when the framework was absent
    pub content: String,
    /// Whether the framework was detected on the page
    pub has_framework: bool,
    /// Wall time of the whole render
    pub elapsed_ms: u64,
}

impl RenderResult {
    /// Hex sha256 of `content`, for verifying persisted copies byte for byte.
    pub fn content_digest(&self) -> String {
        hex::encode(Sha256::digest(self.content.as_bytes()))
    }

    /// Value for a `Server-Timing` response header.
    pub fn server_timing(&self) -> String {
        format!("Prerender;dur={};desc=\"Headless render time (ms)\"", self.elapsed_ms)
    }
}

/// Outcome of a render call that did not hard-fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered(RenderResult),
    /// The last-resort timeout elapsed first; no partial markup is kept
    TimedOut { elapsed_ms: u64 },
}

impl RenderOutcome {
    pub fn rendered(&self) -> Option<&RenderResult> {
        match self {
            RenderOutcome::Rendered(result) => Some(result),
            RenderOutcome::TimedOut { .. } => None,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        match self {
            RenderOutcome::Rendered(result) => result.elapsed_ms,
            RenderOutcome::TimedOut { elapsed_ms } => *elapsed_ms,
        }
    }

    /// Status code a serving layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            RenderOutcome::Rendered(_) => 200,
            RenderOutcome::TimedOut { .. } => 504,
        }
    }

    /// Treat a timeout as an error.
    pub fn into_result(self) -> Result<RenderResult> {
        match self {
            RenderOutcome::Rendered(result) => Ok(result),
            RenderOutcome::TimedOut { elapsed_ms } => Err(Error::RenderTimeout(elapsed_ms)),
        }
    }
}

/// A browser session owned by exactly one render call
///
/// Implementations also act as the [`PageSink`] the snapshot embedder
/// writes through. The orchestrator calls the setup methods strictly in
/// declaration order and always finishes with [`Session::close`].
pub trait Session: PageSink {
    /// Launch a fresh, isolated browser session
    fn launch(options: &RenderOptions) -> Result<Self>
    where
        Self: Sized;

    /// Route page signals to `sender` for every document in this session
    fn register_signal_binding(&mut self, sender: SignalSender) -> Result<()>;

    /// Abort requests that cannot affect the DOM
    fn install_request_filter(&mut self) -> Result<()>;

    /// Run `source` on every new document before any page script
    fn install_instrumentation(&mut self, source: &str) -> Result<()>;

    /// Navigate and wait for network near-idle, giving up at `deadline`
    fn navigate(&mut self, url: &str, deadline: Instant) -> Result<()>;

    /// Raw body of the navigated document response, if one was captured
    fn raw_body(&self) -> Option<String>;

    /// Serialize the current document
    fn content(&mut self) -> Result<String>;

    /// Tear the session down
    fn close(self) -> Result<()>;
}
