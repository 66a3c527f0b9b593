//! In-memory driver keyed by URL.
//!
//! Serves fixture pages, scripted failures and timeouts, per-page request
//! logs and cookies. Used by the test suite and for replaying captured
//! pages without a browser.

use super::{BrowseSession, PageDriver, RenderedPage, SessionSettings, VisitError};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A page served by [`ScriptedDriver`]
#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    pub html: String,
    /// Redirect target; defaults to the requested URL
    pub final_url: Option<String>,
    /// Rendered text; recovered from the DOM when `None`
    pub visible_text: Option<String>,
    /// Requests the page makes while loading
    pub requests: Vec<String>,
    /// Cookies the page sets
    pub cookies: Vec<String>,
    /// Load latency; a delay past the navigation timeout is a timeout
    pub delay: Duration,
}

impl ScriptedPage {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            ..Default::default()
        }
    }

    pub fn redirect_to(mut self, url: impl Into<String>) -> Self {
        self.final_url = Some(url.into());
        self
    }

    pub fn with_requests(mut self, requests: &[&str]) -> Self {
        self.requests = requests.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_cookies(mut self, cookies: &[&str]) -> Self {
        self.cookies = cookies.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
enum Script {
    Page(ScriptedPage),
    Timeout,
    Fail(String),
}

/// Scripted [`PageDriver`]. Unknown URLs fail with a load error.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDriver {
    scripts: Arc<HashMap<String, Script>>,
    visits: Arc<Mutex<Vec<String>>>,
    sessions: Arc<AtomicUsize>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_script(mut self, url: &str, script: Script) -> Self {
        Arc::make_mut(&mut self.scripts).insert(normalize_key(url), script);
        self
    }

    pub fn page(self, url: &str, html: impl Into<String>) -> Self {
        self.with_script(url, Script::Page(ScriptedPage::new(html)))
    }

    pub fn scripted_page(self, url: &str, page: ScriptedPage) -> Self {
        self.with_script(url, Script::Page(page))
    }

    /// Navigation to `url` never completes; each visit blocks for its
    /// full timeout before failing
    pub fn timeout(self, url: &str) -> Self {
        self.with_script(url, Script::Timeout)
    }

    pub fn failure(self, url: &str, message: &str) -> Self {
        self.with_script(url, Script::Fail(message.to_string()))
    }

    /// Every URL navigated to, across all sessions, in order
    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn sessions_opened(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

impl PageDriver for ScriptedDriver {
    fn open_session(&self, _settings: &SessionSettings) -> anyhow::Result<Arc<dyn BrowseSession>> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedSession {
            scripts: Arc::clone(&self.scripts),
            visits: Arc::clone(&self.visits),
            requests: Mutex::new(Vec::new()),
            cookies: Mutex::new(BTreeSet::new()),
        }))
    }
}

struct ScriptedSession {
    scripts: Arc<HashMap<String, Script>>,
    visits: Arc<Mutex<Vec<String>>>,
    requests: Mutex<Vec<String>>,
    cookies: Mutex<BTreeSet<String>>,
}

impl BrowseSession for ScriptedSession {
    fn visit(&self, url: &str, timeout: Duration, settle: Duration) -> Result<RenderedPage, VisitError> {
        if let Ok(mut visits) = self.visits.lock() {
            visits.push(url.to_string());
        }

        let script = self
            .scripts
            .get(&normalize_key(url))
            .cloned()
            .ok_or_else(|| VisitError::Load(format!("net::ERR_NAME_NOT_RESOLVED at {}", url)))?;

        match script {
            Script::Timeout => {
                std::thread::sleep(timeout);
                Err(VisitError::Timeout)
            }
            Script::Fail(message) => Err(VisitError::Load(message)),
            Script::Page(page) => {
                if page.delay >= timeout {
                    std::thread::sleep(timeout);
                    return Err(VisitError::Timeout);
                }
                std::thread::sleep(page.delay + settle.min(Duration::from_millis(5)));

                if let Ok(mut log) = self.requests.lock() {
                    log.push(url.to_string());
                    log.extend(page.requests.iter().cloned());
                }
                if let Ok(mut jar) = self.cookies.lock() {
                    jar.extend(page.cookies.iter().cloned());
                }

                Ok(RenderedPage {
                    final_url: page.final_url.unwrap_or_else(|| url.to_string()),
                    html: page.html,
                    visible_text: page.visible_text.unwrap_or_default(),
                })
            }
        }
    }

    fn drain_requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|mut log| std::mem::take(&mut *log))
            .unwrap_or_default()
    }

    fn cookies(&self) -> Vec<String> {
        self.cookies
            .lock()
            .map(|jar| jar.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Trailing slashes are not significant for lookups
fn normalize_key(url: &str) -> String {
    url.trim().trim_end_matches('/').to_lowercase()
}
