use crate::catalog::SignatureCatalog;
use crate::domain_utils;
use crate::evidence::EvidenceBundle;
use crate::record::BookingType;
use tracing::debug;

/// Same-host paths that indicate an in-site booking surface
const OWN_BOOKING_PATHS: &[&str] = &["/book", "/booking", "/appointment"];

/// How the site takes bookings, and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingDetection {
    pub booking_type: BookingType,
    /// Vendor display name; empty for an in-site surface or nothing found
    pub vendor: String,
    /// The URL (or source marker) the decision was based on
    pub url: String,
}

impl BookingDetection {
    pub fn not_detected() -> Self {
        Self {
            booking_type: BookingType::NotDetected,
            vendor: String::new(),
            url: String::new(),
        }
    }

    fn new(booking_type: BookingType, vendor: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            booking_type,
            vendor: vendor.into(),
            url: url.into(),
        }
    }
}

/// Classify the booking surface of a page. First confident match wins:
/// vendor iframe, own-subdomain iframe, booking-intent link, lead-capture
/// form, then a raw HTML scan for vendor domains.
pub fn detect_booking(catalog: &SignatureCatalog, page: &EvidenceBundle) -> BookingDetection {
    let page_url = if page.final_url.is_empty() { &page.url } else { &page.final_url };
    let clinic_host = domain_utils::site_host(page_url).unwrap_or_default();

    if let Some(found) = from_iframes(catalog, page, page_url, &clinic_host) {
        return found;
    }
    if let Some(found) = from_links(catalog, page, page_url, &clinic_host) {
        return found;
    }
    if let Some(found) = from_lead_form(catalog, page) {
        return found;
    }
    if let Some(domain) = catalog.find_booking_vendor(&page.html) {
        return BookingDetection::new(
            BookingType::ExternalVendor,
            catalog.booking_vendor_name(domain),
            format!("detected in HTML: {}", domain),
        );
    }

    BookingDetection::not_detected()
}

fn from_iframes(
    catalog: &SignatureCatalog,
    page: &EvidenceBundle,
    page_url: &str,
    clinic_host: &str,
) -> Option<BookingDetection> {
    for src in &page.iframe_srcs {
        if let Some(domain) = catalog.find_booking_vendor(src) {
            return Some(BookingDetection::new(
                BookingType::ExternalVendor,
                catalog.booking_vendor_name(domain),
                src.as_str(),
            ));
        }

        let absolute = domain_utils::resolve_href(page_url, src).unwrap_or_else(|| src.clone());
        let host = domain_utils::site_host(&absolute).unwrap_or_default();
        if !host.is_empty() && domain_utils::is_own_subdomain(&host, clinic_host) {
            return Some(BookingDetection::new(BookingType::Embedded, "", absolute));
        }
    }
    None
}

fn from_links(
    catalog: &SignatureCatalog,
    page: &EvidenceBundle,
    page_url: &str,
    clinic_host: &str,
) -> Option<BookingDetection> {
    let candidates = page.anchors.iter().filter_map(|anchor| {
        let href = anchor.href.trim();
        if href.is_empty() || href.starts_with("mailto:") || href.starts_with("tel:") || href.starts_with('#') {
            return None;
        }
        let text = anchor.text.to_lowercase();
        let href_lower = href.to_lowercase();
        let intent = catalog
            .booking_link_keywords
            .iter()
            .any(|kw| text.contains(kw.as_str()) || href_lower.contains(kw.as_str()));
        if intent {
            domain_utils::resolve_href(page_url, href)
        } else {
            None
        }
    });

    for candidate in candidates {
        let host = domain_utils::site_host(&candidate).unwrap_or_default();
        if host.is_empty() {
            continue;
        }

        if let Some(domain) = catalog.find_booking_vendor(&host) {
            return Some(BookingDetection::new(
                BookingType::ExternalVendor,
                catalog.booking_vendor_name(domain),
                candidate,
            ));
        }

        if domain_utils::is_own_subdomain(&host, clinic_host) {
            return Some(BookingDetection::new(BookingType::Embedded, "", candidate));
        }

        let path = domain_utils::url_path(&candidate).to_lowercase();
        if domain_utils::is_same_host(&host, clinic_host) && OWN_BOOKING_PATHS.iter().any(|p| path.contains(p)) {
            return Some(BookingDetection::new(BookingType::Embedded, "", candidate));
        }
    }
    None
}

fn from_lead_form(catalog: &SignatureCatalog, page: &EvidenceBundle) -> Option<BookingDetection> {
    let sources = page
        .script_srcs
        .iter()
        .chain(&page.iframe_srcs)
        .chain(&page.link_hrefs)
        .map(|s| s.to_lowercase());

    for source in sources {
        if let Some(vendor) = catalog
            .lead_form_vendors
            .iter()
            .find(|v| source.contains(v.domain.as_str()))
        {
            return Some(BookingDetection::new(BookingType::LeadForm, vendor.name.clone(), source));
        }
    }

    let phrase = catalog
        .lead_form_phrases
        .iter()
        .find(|re| re.is_match(&page.visible_text))?;
    debug!("Lead-form phrase matched: {}", phrase.as_str());
    Some(BookingDetection::new(BookingType::LeadForm, "", "visible text"))
}
