//! Browsing seam.
//!
//! The page visitor only talks to [`PageDriver`] / [`BrowseSession`].
//! [`ChromeDriver`] drives headless Chrome; [`ScriptedDriver`] serves
//! in-memory pages for tests and offline replays.
//!
//! Sessions are synchronous. Async callers run them on
//! `tokio::task::spawn_blocking`.

pub mod chrome;
pub mod pool;
pub mod scripted;

pub use chrome::ChromeDriver;
pub use scripted::{ScriptedDriver, ScriptedPage};

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Per-session browser options
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub user_agent: String,
    /// Fail image/media/font/stylesheet requests at the interception layer
    pub block_resources: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string(),
            block_resources: true,
        }
    }
}

/// A page after navigation and settle delay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// URL after redirects
    pub final_url: String,
    pub html: String,
    /// `document.body.innerText`; may be empty
    pub visible_text: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VisitError {
    #[error("navigation timed out")]
    Timeout,

    #[error("{0}")]
    Load(String),

    #[error("browser session closed")]
    SessionClosed,
}

/// One isolated browsing context: its own cookie jar and request log.
pub trait BrowseSession: Send + Sync {
    /// Navigate, wait for the load event (bounded by `timeout`), then wait
    /// `settle` for deferred scripts before capturing the page.
    fn visit(&self, url: &str, timeout: Duration, settle: Duration) -> Result<RenderedPage, VisitError>;

    /// Outbound request URLs logged since the previous drain
    fn drain_requests(&self) -> Vec<String>;

    /// Names of cookies currently set in this session
    fn cookies(&self) -> Vec<String>;
}

/// Factory for isolated sessions, one per site
pub trait PageDriver: Send + Sync {
    fn open_session(&self, settings: &SessionSettings) -> anyhow::Result<Arc<dyn BrowseSession>>;
}
