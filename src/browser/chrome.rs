//! Headless Chrome implementation of the browsing seam.
//!
//! One Chrome process per site session, so cookie jars and caches never
//! leak between concurrently scanned sites. Every request is routed through
//! `Fetch` interception, which logs its URL and fails heavy sub-resources.

use super::pool::{self, BrowserGuard, BrowserPool};
use super::{BrowseSession, PageDriver, RenderedPage, SessionSettings, VisitError};
use headless_chrome::browser::tab::RequestPausedDecision;
use headless_chrome::browser::transport::{SessionId, Transport};
use headless_chrome::protocol::cdp::Fetch::events::RequestPausedEvent;
use headless_chrome::protocol::cdp::Fetch::{FailRequest, RequestPattern, RequestStage};
use headless_chrome::protocol::cdp::Network::{ErrorReason, ResourceType};
use headless_chrome::Tab;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

const VISIBLE_TEXT_JS: &str = "document.body ? document.body.innerText : ''";

/// Launches one headless Chrome per session, gated by a [`BrowserPool`]
pub struct ChromeDriver {
    pool: Arc<BrowserPool>,
}

impl ChromeDriver {
    pub fn new(max_instances: usize) -> Self {
        Self {
            pool: BrowserPool::new(max_instances),
        }
    }
}

impl PageDriver for ChromeDriver {
    fn open_session(&self, settings: &SessionSettings) -> anyhow::Result<Arc<dyn BrowseSession>> {
        let guard = pool::launch_browser(&self.pool)?;
        let tab = guard
            .browser
            .new_tab()
            .map_err(|e| anyhow::anyhow!("Failed to create tab: {}", e))?;

        tab.set_user_agent(&settings.user_agent, None, None)
            .map_err(|e| anyhow::anyhow!("Failed to set user agent: {}", e))?;

        let requests = Arc::new(Mutex::new(Vec::<String>::new()));
        let captured = requests.clone();
        let block_resources = settings.block_resources;

        let patterns = [RequestPattern {
            url_pattern: Some("*".to_string()),
            resource_Type: None,
            request_stage: Some(RequestStage::Request),
        }];
        tab.enable_fetch(Some(&patterns), None)
            .map_err(|e| anyhow::anyhow!("Failed to enable request interception: {}", e))?;

        tab.enable_request_interception(Arc::new(
            move |_transport: Arc<Transport>, _session_id: SessionId, event: RequestPausedEvent| {
                if let Ok(mut log) = captured.lock() {
                    log.push(event.params.request.url.clone());
                }
                let heavy = matches!(
                    event.params.resource_Type,
                    ResourceType::Image | ResourceType::Media | ResourceType::Font | ResourceType::Stylesheet
                );
                if block_resources && heavy {
                    RequestPausedDecision::Fail(FailRequest {
                        request_id: event.params.request_id.clone(),
                        error_reason: ErrorReason::BlockedByClient,
                    })
                } else {
                    RequestPausedDecision::Continue(None)
                }
            },
        ))
        .map_err(|e| anyhow::anyhow!("Failed to register request interceptor: {}", e))?;

        Ok(Arc::new(ChromeSession {
            _guard: guard,
            tab,
            requests,
        }))
    }
}

struct ChromeSession {
    // Keeps the Chrome process and its pool permit alive
    _guard: BrowserGuard,
    tab: Arc<Tab>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl ChromeSession {
    fn classify_error(err: anyhow::Error, started: Instant, timeout: Duration) -> VisitError {
        let message = err.to_string();
        let lower = message.to_lowercase();
        if started.elapsed() >= timeout
            || lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("never came")
        {
            VisitError::Timeout
        } else if lower.contains("connection is closed") || lower.contains("target closed") {
            VisitError::SessionClosed
        } else {
            VisitError::Load(message)
        }
    }
}

impl BrowseSession for ChromeSession {
    fn visit(&self, url: &str, timeout: Duration, settle: Duration) -> Result<RenderedPage, VisitError> {
        let started = Instant::now();
        self.tab.set_default_timeout(timeout);

        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| Self::classify_error(e, started, timeout))?;

        std::thread::sleep(settle);

        let html = self
            .tab
            .get_content()
            .map_err(|e| Self::classify_error(e, started, timeout + settle))?;

        let visible_text = match self.tab.evaluate(VISIBLE_TEXT_JS, false) {
            Ok(obj) => obj
                .value
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            Err(e) => {
                debug!("innerText unavailable for {}: {}", url, e);
                String::new()
            }
        };

        Ok(RenderedPage {
            final_url: self.tab.get_url(),
            html,
            visible_text,
        })
    }

    fn drain_requests(&self) -> Vec<String> {
        match self.requests.lock() {
            Ok(mut log) => std::mem::take(&mut *log),
            Err(_) => Vec::new(),
        }
    }

    fn cookies(&self) -> Vec<String> {
        match self.tab.get_cookies() {
            Ok(cookies) => cookies.into_iter().map(|c| c.name).collect(),
            Err(e) => {
                debug!("Cookie read failed: {}", e);
                Vec::new()
            }
        }
    }
}
