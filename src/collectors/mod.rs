//! Evidence collectors.
//!
//! Each collector is a pure function from one observation channel to a
//! [`HitSet`]:
//! - [`sources`]: HTML body plus script/iframe/link URLs
//! - [`network`]: outbound requests logged while the page was live
//! - [`cookies`]: cookie names, plus framework session conventions
//! - [`headers`]: response headers and CSP allow-lists
//! - [`text`]: natural-language phrases in visible text
//! - [`meta`]: self-reported `<meta name="generator">`
//!
//! [`robots`] is a site-level extra fetched once per scan.

pub mod cookies;
pub mod headers;
pub mod meta;
pub mod network;
pub mod robots;
pub mod sources;
pub mod text;

pub use cookies::{scan_cookies, scan_framework_cookies};
pub use headers::{scan_csp, scan_headers};
pub use meta::scan_meta_generator;
pub use network::scan_requests;
pub use robots::{fetch_robots, scan_robots};
pub use sources::scan_sources;
pub use text::scan_visible_text;

use crate::catalog::{Category, SignatureCatalog, WIX_NATIVE_FORMS};
use crate::evidence::{EvidenceBundle, HitSet};

const WIX: &str = "Wix";
const WORDPRESS: &str = "WordPress";

/// WordPress-only form plugins that cannot run on a Wix site
const WP_FORM_TOOLS: &[&str] = &["Elementor Forms", "Contact Form 7", "Gravity Forms", "WPForms"];

/// Content channels of one page: sources, visible text and meta generator
pub fn scan_content(catalog: &SignatureCatalog, bundle: &EvidenceBundle) -> HitSet {
    let mut hits = scan_sources(catalog, bundle);
    hits.merge(&scan_visible_text(catalog, &bundle.visible_text));
    hits.merge(&scan_meta_generator(catalog, bundle));
    hits
}

/// Site-level corrections for Wix sites.
///
/// A Wix site (without WordPress) that loads no third-party form script
/// uses Wix's native forms. WordPress form plugins on a Wix site are
/// false positives from generic strings and are removed.
pub fn apply_wix_guards(catalog: &SignatureCatalog, hits: &mut HitSet, script_srcs: &[String]) {
    if !hits.contains(Category::Cms, WIX) {
        return;
    }

    if !hits.contains(Category::Cms, WORDPRESS) {
        let srcs = script_srcs
            .iter()
            .map(|s| s.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        let third_party = catalog
            .wix_third_party_forms
            .iter()
            .any(|marker| srcs.contains(marker.as_str()));
        if !third_party {
            hits.insert(Category::Forms, WIX_NATIVE_FORMS);
        }
    }

    for tool in WP_FORM_TOOLS {
        hits.remove(Category::Forms, tool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wix_native_forms_added() {
        let catalog = SignatureCatalog::builtin().unwrap();
        let mut hits = HitSet::new();
        hits.insert(Category::Cms, "Wix");
        hits.insert(Category::Forms, "Elementor Forms");
        apply_wix_guards(&catalog, &mut hits, &["https://static.parastorage.com/x.js".to_string()]);
        assert!(hits.contains(Category::Forms, WIX_NATIVE_FORMS));
        assert!(!hits.contains(Category::Forms, "Elementor Forms"));
    }

    #[test]
    fn test_wix_with_third_party_form_script() {
        let catalog = SignatureCatalog::builtin().unwrap();
        let mut hits = HitSet::new();
        hits.insert(Category::Cms, "Wix");
        apply_wix_guards(&catalog, &mut hits, &["https://form.jotform.com/jsform/1".to_string()]);
        assert!(!hits.contains(Category::Forms, WIX_NATIVE_FORMS));
    }

    #[test]
    fn test_wordpress_site_untouched() {
        let catalog = SignatureCatalog::builtin().unwrap();
        let mut hits = HitSet::new();
        hits.insert(Category::Cms, "WordPress");
        hits.insert(Category::Forms, "WPForms");
        let before = hits.clone();
        apply_wix_guards(&catalog, &mut hits, &[]);
        assert_eq!(hits, before);
    }

    #[test]
    fn test_scan_content_combines_channels() {
        let catalog = SignatureCatalog::builtin().unwrap();
        let html = r#"<html><head><meta name="generator" content="WordPress 6.4">
            <script src="https://js.stripe.com/v3/"></script></head><body></body></html>"#;
        let bundle = EvidenceBundle::from_page("https://c.test/", "https://c.test/", html, "Book online via HotDoc");
        let hits = scan_content(&catalog, &bundle);
        assert!(hits.contains(Category::Cms, "WordPress"));
        assert!(hits.contains(Category::Payments, "Stripe"));
        assert!(hits.contains(Category::Booking, "HotDoc"));
    }
}
