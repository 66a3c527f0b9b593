//! Page visitor: drives one browsing session through a bounded itinerary,
//! runs every collector after each navigation and caches page content for
//! the classifiers.

use crate::browser::{BrowseSession, RenderedPage, VisitError};
use crate::catalog::SignatureCatalog;
use crate::collectors;
use crate::deadline::Deadline;
use crate::domain_utils;
use crate::evidence::{EvidenceBundle, HitSet, ResponseHeaders};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Well-known sub-paths tried after the homepage, in order
pub const CANDIDATE_PATHS: &[&str] = &[
    "/contact",
    "/contact-us",
    "/book",
    "/booking",
    "/book-online",
    "/appointments",
    "/about",
    "/about-us",
    "/services",
    "/our-services",
];

/// Href fragments that mark a homepage link as booking-like
const BOOKING_HREF_MARKERS: &[&str] = &["book", "booking", "appointment"];

/// Booking-like links considered when picking the discovered link
const BOOKING_LINK_CANDIDATES: usize = 3;

/// Extra time allowed for a blocking browser call past its own timeout
const NAVIGATION_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct VisitSettings {
    pub homepage_timeout: Duration,
    pub subpage_timeout: Duration,
    pub homepage_settle: Duration,
    pub subpage_settle: Duration,
    /// Total page visits per site, homepage included
    pub max_pages: usize,
}

impl Default for VisitSettings {
    fn default() -> Self {
        Self {
            homepage_timeout: Duration::from_secs(30),
            subpage_timeout: Duration::from_secs(10),
            homepage_settle: Duration::from_millis(2000),
            subpage_settle: Duration::from_millis(1000),
            max_pages: 5,
        }
    }
}

/// Which timeout and settle delay a navigation uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Homepage,
    Subpage,
}

/// HTML and text of a visited page, kept for the rest of the site scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPage {
    pub url: String,
    pub final_url: String,
    pub html: String,
    pub visible_text: String,
}

/// Evidence accumulated across every page and channel of one site.
///
/// Channels are kept apart so resolution can apply channel-specific
/// rules (framework cookies only count without a CMS).
#[derive(Debug, Clone, Default)]
pub struct SiteEvidence {
    /// Sources, visible text and meta generator
    pub content: HitSet,
    pub network: HitSet,
    pub cookies: HitSet,
    pub framework_cookies: HitSet,
    pub headers: HitSet,
    pub robots: HitSet,
    /// Script URLs from every page, for site-level guards
    pub script_srcs: Vec<String>,
    pages: BTreeMap<String, CachedPage>,
    page_order: Vec<String>,
    /// Successful itinerary navigations, homepage included
    pub pages_visited: usize,
}

impl SiteEvidence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every per-page collector over `bundle` and cache the page
    pub fn absorb(&mut self, catalog: &SignatureCatalog, bundle: &EvidenceBundle) {
        self.content.merge(&collectors::scan_content(catalog, bundle));
        self.absorb_requests(catalog, &bundle.requests);
        self.cookies.merge(&collectors::scan_cookies(catalog, &bundle.cookies));
        self.framework_cookies
            .merge(&collectors::scan_framework_cookies(catalog, &bundle.cookies));
        if let Some(headers) = &bundle.headers {
            self.headers.merge(&collectors::scan_headers(catalog, headers));
        }
        self.script_srcs.extend(bundle.script_srcs.iter().cloned());
        self.cache(CachedPage {
            url: bundle.url.clone(),
            final_url: bundle.final_url.clone(),
            html: bundle.html.clone(),
            visible_text: bundle.visible_text.clone(),
        });
    }

    pub fn absorb_requests(&mut self, catalog: &SignatureCatalog, requests: &[String]) {
        self.network.merge(&collectors::scan_requests(catalog, requests));
    }

    pub fn cache(&mut self, page: CachedPage) {
        let key = cache_key(&page.url);
        if !self.pages.contains_key(&key) {
            self.page_order.push(key.clone());
        }
        self.pages.insert(key, page);
    }

    pub fn page(&self, url: &str) -> Option<&CachedPage> {
        self.pages.get(&cache_key(url))
    }

    /// Cached pages in the order they were first visited
    pub fn cached_pages(&self) -> impl Iterator<Item = &CachedPage> {
        self.page_order.iter().filter_map(|k| self.pages.get(k))
    }

    /// Every channel merged into one set
    pub fn merged_hits(&self) -> HitSet {
        let mut all = self.content.clone();
        all.merge(&self.network);
        all.merge(&self.cookies);
        all.merge(&self.headers);
        all.merge(&self.robots);
        all
    }
}

fn cache_key(url: &str) -> String {
    url.trim().trim_end_matches('/').to_lowercase()
}

/// Drives one site's [`BrowseSession`]
pub struct PageVisitor<'a> {
    catalog: &'a SignatureCatalog,
    session: Arc<dyn BrowseSession>,
    http: &'a reqwest::Client,
    settings: &'a VisitSettings,
    deadline: &'a Deadline,
}

impl<'a> PageVisitor<'a> {
    pub fn new(
        catalog: &'a SignatureCatalog,
        session: Arc<dyn BrowseSession>,
        http: &'a reqwest::Client,
        settings: &'a VisitSettings,
        deadline: &'a Deadline,
    ) -> Self {
        Self {
            catalog,
            session,
            http,
            settings,
            deadline,
        }
    }

    fn timing(&self, kind: PageKind) -> (Duration, Duration) {
        match kind {
            PageKind::Homepage => (self.settings.homepage_timeout, self.settings.homepage_settle),
            PageKind::Subpage => (self.settings.subpage_timeout, self.settings.subpage_settle),
        }
    }

    /// Navigate on a blocking thread, bounded by the clamped timeout
    async fn navigate(&self, url: &str, kind: PageKind) -> Result<RenderedPage, VisitError> {
        let (timeout, settle) = self.timing(kind);
        let timeout = self.deadline.clamp(timeout);
        if timeout.is_zero() {
            return Err(VisitError::Timeout);
        }

        let session = Arc::clone(&self.session);
        let target = url.to_string();
        let handle = tokio::task::spawn_blocking(move || session.visit(&target, timeout, settle));

        match tokio::time::timeout(timeout + settle + NAVIGATION_GRACE, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(VisitError::Load(format!("browser task failed: {}", e))),
            Err(_) => Err(VisitError::Timeout),
        }
    }

    /// Response headers of `url`. Any failure yields `None`.
    async fn fetch_headers(&self, url: &str, kind: PageKind) -> Option<ResponseHeaders> {
        let (timeout, _) = self.timing(kind);
        let timeout = self.deadline.clamp(timeout);
        if timeout.is_zero() {
            return None;
        }

        match self.http.get(url).timeout(timeout).send().await {
            Ok(resp) => Some(ResponseHeaders::new(resp.headers().iter().filter_map(|(k, v)| {
                v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string()))
            }))),
            Err(e) => {
                debug!("Header fetch failed for {}: {}", url, e);
                None
            }
        }
    }

    async fn session_cookies(&self) -> Vec<String> {
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || session.cookies())
            .await
            .unwrap_or_default()
    }

    /// Load one page with its headers, cookies and request log.
    ///
    /// Headers are fetched concurrently with the navigation and kept only
    /// when the navigation succeeds.
    pub async fn load(&self, url: &str, kind: PageKind) -> Result<EvidenceBundle, VisitError> {
        let (page, headers) = tokio::join!(self.navigate(url, kind), self.fetch_headers(url, kind));
        let page = page?;
        let cookies = self.session_cookies().await;
        let requests = self.session.drain_requests();

        Ok(EvidenceBundle::from_page(url, &page.final_url, &page.html, &page.visible_text)
            .with_headers(headers)
            .with_cookies(cookies)
            .with_requests(requests))
    }

    /// [`load`](Self::load) and absorb into the site accumulator.
    /// Requests logged by a failed navigation are still absorbed.
    pub async fn visit(
        &self,
        evidence: &mut SiteEvidence,
        url: &str,
        kind: PageKind,
    ) -> Result<EvidenceBundle, VisitError> {
        match self.load(url, kind).await {
            Ok(bundle) => {
                evidence.absorb(self.catalog, &bundle);
                evidence.pages_visited += 1;
                Ok(bundle)
            }
            Err(e) => {
                let requests = self.session.drain_requests();
                evidence.absorb_requests(self.catalog, &requests);
                Err(e)
            }
        }
    }

    /// Sub-pages to try after the homepage: the first same-host booking
    /// link found on the homepage, then the well-known candidate paths.
    pub fn itinerary(&self, homepage: &EvidenceBundle) -> Vec<String> {
        let base_source = if homepage.final_url.is_empty() {
            &homepage.url
        } else {
            &homepage.final_url
        };
        let Some(base) = domain_utils::base_url(base_source) else {
            return Vec::new();
        };
        let site_host = domain_utils::site_host(base_source).unwrap_or_default();

        let mut urls: Vec<String> = CANDIDATE_PATHS
            .iter()
            .map(|path| format!("{}{}", base, path))
            .collect();

        let discovered = homepage
            .anchors
            .iter()
            .filter(|a| {
                let href = a.href.to_lowercase();
                BOOKING_HREF_MARKERS.iter().any(|m| href.contains(m))
            })
            .take(BOOKING_LINK_CANDIDATES)
            .filter_map(|a| domain_utils::resolve_href(base_source, &a.href))
            .find(|full| {
                let same_host = domain_utils::site_host(full).map_or(false, |h| h == site_host);
                same_host
                    && cache_key(full) != cache_key(base_source)
                    && !urls.iter().any(|u| cache_key(u) == cache_key(full))
            });

        if let Some(link) = discovered {
            urls.insert(0, link);
        }
        urls
    }

    /// Visit itinerary entries until the page cap or the deadline is hit.
    /// Failed entries are skipped and do not count towards the cap.
    pub async fn run_itinerary(&self, evidence: &mut SiteEvidence, homepage: &EvidenceBundle) {
        for url in self.itinerary(homepage) {
            if evidence.pages_visited >= self.settings.max_pages {
                break;
            }
            if self.deadline.expired() {
                debug!("Deadline reached during itinerary at {}", url);
                break;
            }
            if let Err(e) = self.visit(evidence, &url, PageKind::Subpage).await {
                debug!("Skipping {}: {}", url, e);
            }
        }
    }

    /// Page content for a classifier: cached copy first, otherwise a
    /// sub-page navigation whose content is cached but not scanned for
    /// tools. `None` on navigation failure.
    pub async fn fetch_page(&self, evidence: &mut SiteEvidence, url: &str) -> Option<CachedPage> {
        if let Some(page) = evidence.page(url) {
            return Some(page.clone());
        }
        if self.deadline.expired() {
            return None;
        }

        let result = self.navigate(url, PageKind::Subpage).await;
        let requests = self.session.drain_requests();
        evidence.absorb_requests(self.catalog, &requests);

        match result {
            Ok(page) => {
                let text = if page.visible_text.trim().is_empty() {
                    EvidenceBundle::from_page(url, &page.final_url, &page.html, "").visible_text
                } else {
                    page.visible_text
                };
                let cached = CachedPage {
                    url: url.to_string(),
                    final_url: page.final_url,
                    html: page.html,
                    visible_text: text,
                };
                evidence.cache(cached.clone());
                Some(cached)
            }
            Err(e) => {
                debug!("Classifier fetch failed for {}: {}", url, e);
                None
            }
        }
    }
}
