//! Site orchestrator: the per-site state machine.
//!
//! `Start → HomepageLoad → BookingDetect → TechScan → BillingDetect →
//! SocialExtract → LocationDetect → TeamCount → Resolve → Done`
//!
//! A homepage failure ends the machine early with the error recorded.
//! The deadline is checked at every transition and an outer timeout
//! wraps the whole run; on either cut-off the evidence gathered so far
//! is still resolved into the record.

use crate::browser::{PageDriver, SessionSettings, VisitError};
use crate::catalog::SignatureCatalog;
use crate::classifiers::{self, location, team};
use crate::collectors;
use crate::contact;
use crate::deadline::Deadline;
use crate::domain_utils;
use crate::email_provider::{self, MxResolver};
use crate::evidence::{EvidenceBundle, HitSet};
use crate::record::QualificationRecord;
use crate::resolve;
use crate::visitor::{PageKind, PageVisitor, SiteEvidence, VisitSettings};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Extra sub-paths checked for home-visit wording
const HOME_VISIT_PATHS: &[&str] = &["/services", "/service"];

/// Longest wait for background lookups once the page work is done
const BACKGROUND_JOIN_WAIT: Duration = Duration::from_secs(5);

fn budget_exceeded(budget: Duration) -> String {
    format!("Site scan timed out after {}s", budget.as_secs())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Start,
    HomepageLoad,
    BookingDetect,
    TechScan,
    BillingDetect,
    SocialExtract,
    LocationDetect,
    TeamCount,
    Resolve,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::HomepageLoad => "homepage load",
            Stage::BookingDetect => "booking detection",
            Stage::TechScan => "tech scan",
            Stage::BillingDetect => "billing detection",
            Stage::SocialExtract => "social and contact extraction",
            Stage::LocationDetect => "location detection",
            Stage::TeamCount => "team count",
            Stage::Resolve => "resolve",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub visit: VisitSettings,
    pub session: SessionSettings,
    /// Wall-clock budget for one site, all stages included
    pub site_budget: Duration,
    pub robots_timeout: Duration,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            visit: VisitSettings::default(),
            session: SessionSettings::default(),
            site_budget: Duration::from_secs(180),
            robots_timeout: Duration::from_secs(5),
        }
    }
}

/// State owned by one site scan. Lives outside the timed future so a
/// cut-off keeps everything gathered before it.
struct SiteScan {
    record: QualificationRecord,
    evidence: SiteEvidence,
    stage: Stage,
    dns: Option<JoinHandle<String>>,
    robots: Option<JoinHandle<HitSet>>,
}

impl SiteScan {
    fn new(url: &str) -> Self {
        Self {
            record: QualificationRecord::new(url),
            evidence: SiteEvidence::new(),
            stage: Stage::Start,
            dns: None,
            robots: None,
        }
    }

    fn abort_background(&mut self) {
        if let Some(handle) = self.dns.take() {
            handle.abort();
        }
        if let Some(handle) = self.robots.take() {
            handle.abort();
        }
    }
}

/// Scans one site at a time; shared across concurrent workers
pub struct SiteScanner {
    catalog: Arc<SignatureCatalog>,
    driver: Arc<dyn PageDriver>,
    http: reqwest::Client,
    mx: Arc<dyn MxResolver>,
    settings: ScanSettings,
}

impl SiteScanner {
    pub fn new(
        catalog: Arc<SignatureCatalog>,
        driver: Arc<dyn PageDriver>,
        http: reqwest::Client,
        mx: Arc<dyn MxResolver>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            catalog,
            driver,
            http,
            mx,
            settings,
        }
    }

    pub fn catalog(&self) -> &SignatureCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// Scan one site. Never fails: every problem ends up in the
    /// record's error field.
    pub async fn scan(&self, raw_url: &str) -> QualificationRecord {
        let Some(url) = domain_utils::normalize_site_url(raw_url) else {
            return QualificationRecord::failed(raw_url, format!("Invalid URL: {}", raw_url));
        };

        let budget = self.settings.site_budget;
        let deadline = Deadline::new(budget);
        let mut scan = SiteScan::new(&url);
        self.start_background(&mut scan, &url);

        let outcome = tokio::time::timeout(budget, self.run(&mut scan, &url, &deadline)).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Scan of {} failed during {}: {:#}", url, scan.stage, e);
                scan.record.error = Some(format!("Unexpected error: {:#}", e));
            }
            Err(_) => {
                warn!("Scan of {} cut off during {}", url, scan.stage);
                scan.record.error = Some(budget_exceeded(budget));
            }
        }

        self.finish(&mut scan, &deadline).await;
        scan.record
    }

    /// MX lookup and robots.txt fetch run beside the page work
    fn start_background(&self, scan: &mut SiteScan, url: &str) {
        if let Some(host) = domain_utils::site_host(url) {
            let mx = Arc::clone(&self.mx);
            scan.dns = Some(tokio::spawn(async move {
                email_provider::lookup_provider(mx.as_ref(), &host).await
            }));
        }

        if let Some(base) = domain_utils::base_url(url) {
            let http = self.http.clone();
            let catalog = Arc::clone(&self.catalog);
            let timeout = self.settings.robots_timeout;
            scan.robots = Some(tokio::spawn(async move {
                collectors::fetch_robots(&http, &catalog, &base, timeout).await
            }));
        }
    }

    /// Move to `next`, or record the budget overrun and stop
    fn advance(&self, scan: &mut SiteScan, next: Stage, deadline: &Deadline) -> bool {
        if deadline.expired() {
            info!("{}: deadline reached before {}", scan.record.url, next);
            scan.record.error = Some(budget_exceeded(deadline.budget()));
            return false;
        }
        debug!("{}: {} -> {}", scan.record.url, scan.stage, next);
        scan.stage = next;
        true
    }

    async fn run(&self, scan: &mut SiteScan, url: &str, deadline: &Deadline) -> Result<()> {
        let driver = Arc::clone(&self.driver);
        let session_settings = self.settings.session.clone();
        let session = tokio::task::spawn_blocking(move || driver.open_session(&session_settings))
            .await
            .context("browser session task failed")?
            .context("failed to open browser session")?;

        let visitor = PageVisitor::new(&self.catalog, session, &self.http, &self.settings.visit, deadline);

        if !self.advance(scan, Stage::HomepageLoad, deadline) {
            return Ok(());
        }
        let homepage = match visitor.visit(&mut scan.evidence, url, PageKind::Homepage).await {
            Ok(page) => page,
            Err(VisitError::Timeout) => {
                info!("Timeout loading homepage of {}", url);
                scan.record.error = Some("Timeout loading homepage".to_string());
                return Ok(());
            }
            Err(e) => {
                info!("Error loading homepage of {}: {}", url, e);
                scan.record.error = Some(format!("Error loading homepage: {}", e));
                return Ok(());
            }
        };
        scan.record.clinic_name = contact::clinic_name(&homepage.html, &homepage.final_url);
        let category = classifiers::classify(&self.catalog, &homepage);
        scan.record.primary_category = category.category;
        scan.record.category_confidence = category.confidence;

        if !self.advance(scan, Stage::BookingDetect, deadline) {
            return Ok(());
        }
        let booking = classifiers::detect_booking(&self.catalog, &homepage);
        scan.record.booking_type = booking.booking_type;
        scan.record.booking_vendor = booking.vendor;
        scan.record.booking_url = booking.url;

        if !self.advance(scan, Stage::TechScan, deadline) {
            return Ok(());
        }
        visitor.run_itinerary(&mut scan.evidence, &homepage).await;
        debug!("{}: {} pages visited", url, scan.evidence.pages_visited);

        if !self.advance(scan, Stage::BillingDetect, deadline) {
            return Ok(());
        }
        scan.record.billing_type = classifiers::detect_billing(
            &self.catalog,
            scan.evidence.cached_pages().map(|p| p.visible_text.as_str()),
        );

        if !self.advance(scan, Stage::SocialExtract, deadline) {
            return Ok(());
        }
        self.extract_contacts(scan, &homepage);
        scan.record.home_visits = self.detect_home_visits(&visitor, scan, &homepage).await;

        if !self.advance(scan, Stage::LocationDetect, deadline) {
            return Ok(());
        }
        let estimate = self.estimate_locations(&visitor, scan, &homepage).await;
        scan.record.multi_location = estimate.multi_location;
        scan.record.location_count = estimate.count;
        scan.record.location_method = estimate.method;

        if !self.advance(scan, Stage::TeamCount, deadline) {
            return Ok(());
        }
        scan.record.practitioner_count = self.count_team(&visitor, scan, &homepage).await;

        Ok(())
    }

    /// Social flags from the homepage; phones and emails from every
    /// cached page; address from the homepage first
    fn extract_contacts(&self, scan: &mut SiteScan, homepage: &EvidenceBundle) {
        let (instagram, whatsapp) = contact::social_flags(&homepage.html);
        scan.record.instagram = instagram;
        scan.record.whatsapp = whatsapp;

        let mut phones = BTreeSet::new();
        let mut emails = BTreeSet::new();
        for page in scan.evidence.cached_pages() {
            phones.extend(contact::extract_phones(&page.visible_text, &page.html));
            emails.extend(contact::extract_emails(&self.catalog, &page.visible_text, &page.html));
        }
        scan.record.phones = phones.into_iter().collect();
        scan.record.emails = emails.into_iter().collect();

        let homepage_key = homepage.url.clone();
        let ordered = std::iter::once(&homepage_key)
            .filter_map(|u| scan.evidence.page(u))
            .chain(scan.evidence.cached_pages().filter(|p| p.url != homepage_key));
        for page in ordered {
            let address = contact::extract_address(&page.html, &page.visible_text);
            if !address.is_empty() {
                scan.record.address = address;
                break;
            }
        }
    }

    async fn detect_home_visits(
        &self,
        visitor: &PageVisitor<'_>,
        scan: &mut SiteScan,
        homepage: &EvidenceBundle,
    ) -> bool {
        if contact::mentions_home_visits(&self.catalog, &homepage.html) {
            return true;
        }
        let Some(base) = domain_utils::base_url(&homepage.final_url) else {
            return false;
        };
        for path in HOME_VISIT_PATHS {
            let url = format!("{}{}", base, path);
            if let Some(page) = visitor.fetch_page(&mut scan.evidence, &url).await {
                if contact::mentions_home_visits(&self.catalog, &page.html) {
                    return true;
                }
            }
        }
        false
    }

    /// Repetition across visited pages first, then navigation keywords
    /// combined with the first usable locations page
    async fn estimate_locations(
        &self,
        visitor: &PageVisitor<'_>,
        scan: &mut SiteScan,
        homepage: &EvidenceBundle,
    ) -> location::LocationEstimate {
        let mut postcodes: BTreeSet<String> = scan
            .evidence
            .cached_pages()
            .flat_map(|p| location::postcodes_in(&p.visible_text))
            .collect();
        if !scan.record.address.postcode.is_empty() {
            postcodes.insert(scan.record.address.postcode.clone());
        }
        let phones: BTreeSet<String> = scan.record.phones.iter().cloned().collect();

        if let Some(estimate) = location::by_repetition(&postcodes, &phones) {
            return estimate;
        }

        let nav_text = location::nav_keyword(&self.catalog, &homepage.nav_anchors);

        let mut locations_page = None;
        if let Some(base) = domain_utils::base_url(&homepage.final_url) {
            for path in &self.catalog.location_paths {
                let url = format!("{}{}", base, path);
                let Some(page) = visitor.fetch_page(&mut scan.evidence, &url).await else {
                    continue;
                };
                if let Some(count) = location::count_on_locations_page(&page.final_url, &page.visible_text) {
                    if count >= 1 {
                        locations_page = Some((path.clone(), count));
                        break;
                    }
                }
            }
        }

        location::combine(nav_text, locations_page)
    }

    /// Team page when one is linked, otherwise the homepage
    async fn count_team(&self, visitor: &PageVisitor<'_>, scan: &mut SiteScan, homepage: &EvidenceBundle) -> u32 {
        if let Some(link) = team::find_team_link(homepage) {
            if let Some(page) = visitor.fetch_page(&mut scan.evidence, &link).await {
                return team::count_practitioners(&page.html);
            }
        }
        team::count_practitioners(&homepage.html)
    }

    /// Join background lookups and resolve whatever evidence was gathered
    async fn finish(&self, scan: &mut SiteScan, deadline: &Deadline) {
        let wait = deadline.clamp(BACKGROUND_JOIN_WAIT).max(Duration::from_millis(100));

        let mx_provider = match scan.dns.take() {
            Some(handle) => join_or_default(handle, wait, "MX lookup").await,
            None => None,
        };
        if let Some(robots) = match scan.robots.take() {
            Some(handle) => join_or_default(handle, wait, "robots.txt fetch").await,
            None => None,
        } {
            scan.evidence.robots.merge(&robots);
        }
        scan.abort_background();

        let mx = mx_provider.unwrap_or_else(|| crate::catalog::NOT_DETECTED.to_string());
        scan.record.email_provider =
            email_provider::combine_providers(&mx, email_provider::provider_from_addresses(&scan.record.emails));

        scan.stage = Stage::Resolve;
        resolve::resolve(&self.catalog, &mut scan.record, &scan.evidence);
        scan.stage = Stage::Done;

        debug!(
            "{}: resolved in {:.1}s ({} pages)",
            scan.record.url,
            deadline.elapsed().as_secs_f64(),
            scan.evidence.pages_visited
        );
    }
}

async fn join_or_default<T>(mut handle: JoinHandle<T>, wait: Duration, what: &str) -> Option<T> {
    match tokio::time::timeout(wait, &mut handle).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!("{} task failed: {}", what, e);
            None
        }
        Err(_) => {
            debug!("{} still running, abandoning it", what);
            handle.abort();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::ScriptedDriver;
    use crate::catalog::{Category, NOT_DETECTED};
    use crate::email_provider::StaticMxResolver;
    use crate::record::BookingType;

    fn settings(budget: Duration) -> ScanSettings {
        ScanSettings {
            visit: VisitSettings {
                homepage_timeout: Duration::from_secs(2),
                subpage_timeout: Duration::from_millis(500),
                homepage_settle: Duration::ZERO,
                subpage_settle: Duration::ZERO,
                max_pages: 5,
            },
            session: SessionSettings::default(),
            site_budget: budget,
            robots_timeout: Duration::from_millis(200),
        }
    }

    fn scanner(driver: ScriptedDriver, budget: Duration) -> SiteScanner {
        let mx = StaticMxResolver::new().with("smiles.test", &["aspmx.l.google.com"]);
        SiteScanner::new(
            Arc::new(SignatureCatalog::builtin().unwrap()),
            Arc::new(driver),
            reqwest::Client::new(),
            Arc::new(mx),
            settings(budget),
        )
    }

    #[tokio::test]
    async fn test_homepage_timeout_is_recorded() {
        let driver = ScriptedDriver::new().timeout("https://smiles.test/");
        let record = scanner(driver, Duration::from_secs(10)).scan("smiles.test").await;
        assert_eq!(record.error.as_deref(), Some("Timeout loading homepage"));
        assert_eq!(record.booking_type, BookingType::NotDetected);
        assert_eq!(record.email_provider, "Google Workspace");
    }

    #[tokio::test]
    async fn test_homepage_load_error_is_recorded() {
        let driver = ScriptedDriver::new().failure("https://smiles.test/", "net::ERR_NAME_NOT_RESOLVED");
        let record = scanner(driver, Duration::from_secs(10)).scan("https://smiles.test/").await;
        assert_eq!(
            record.error.as_deref(),
            Some("Error loading homepage: net::ERR_NAME_NOT_RESOLVED")
        );
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let record = scanner(ScriptedDriver::new(), Duration::from_secs(1)).scan("not a url").await;
        assert!(record.error.unwrap().starts_with("Invalid URL"));
    }

    #[tokio::test]
    async fn test_full_scan_of_scripted_site() {
        let home = r#"<html><head><title>Smiles Dental Clinic</title>
            <script src="https://www.googletagmanager.com/gtag/js?id=G-1"></script></head>
            <body><h1>Smiles Dental</h1>
            <nav><a href="/team">Our Team</a></nav>
            <iframe src="https://secure.cliniko.com/bookings"></iframe>
            <p>Dentist and dental check-ups. Call 03 9123 4567. 1 Main St, Melbourne VIC 3000</p>
            <a href="https://instagram.com/smilesdental">Instagram</a>
            </body></html>"#;
        let team = r#"<html><body><h2>Dr. Smith</h2><p>Dr. Jones</p>
            <img class="team-photo" src="/a.jpg"><img class="team-photo" src="/b.jpg">
            <img class="team-photo" src="/c.jpg"></body></html>"#;
        let driver = ScriptedDriver::new()
            .page("https://smiles.test/", home)
            .page("https://smiles.test/team", team)
            .page("https://smiles.test/contact", "<html><body>Email hello@smiles.test</body></html>");

        let record = scanner(driver, Duration::from_secs(20)).scan("https://smiles.test").await;

        assert_eq!(record.error, None);
        assert_eq!(record.clinic_name, "Smiles Dental");
        assert_eq!(record.primary_category, "Dental");
        assert_eq!(record.booking_type, BookingType::ExternalVendor);
        assert_eq!(record.booking_vendor, "Cliniko");
        assert!(record.instagram);
        assert_eq!(record.emails, vec!["hello@smiles.test".to_string()]);
        assert_eq!(record.practitioner_count, 3);
        assert!(!record.multi_location);
        assert_eq!(record.email_provider, "Google Workspace");
        assert_ne!(record.category_value(Category::Pixels), NOT_DETECTED);
    }
}
