//! Page-source collector: HTML body, script/iframe/link URLs.

use crate::catalog::{Category, SignatureCatalog, MIN_PATTERN_LEN, MIN_TEXT_PATTERN_LEN};
use crate::evidence::{EvidenceBundle, HitSet};

const WP_PLUGIN_MARKER: &str = "wp-content/plugins";

/// Match URL signatures against a page's HTML and resource URLs.
///
/// Patterns shorter than [`MIN_PATTERN_LEN`] never match. A pattern that
/// misses the sources may still match the visible text when it is at least
/// [`MIN_TEXT_PATTERN_LEN`] long.
pub fn scan_sources(catalog: &SignatureCatalog, bundle: &EvidenceBundle) -> HitSet {
    let mut hits = HitSet::new();

    let mut all_sources = bundle.html.to_lowercase();
    for src in bundle
        .script_srcs
        .iter()
        .chain(bundle.iframe_srcs.iter())
        .chain(bundle.link_hrefs.iter())
    {
        all_sources.push(' ');
        all_sources.push_str(&src.to_lowercase());
    }
    let text_lower = bundle.visible_text.to_lowercase();

    for (category, tools) in &catalog.url_signatures {
        for signature in tools {
            let matched = signature.patterns.iter().any(|pat| {
                if pat.len() < MIN_PATTERN_LEN {
                    return false;
                }
                all_sources.contains(pat.as_str())
                    || (pat.len() >= MIN_TEXT_PATTERN_LEN && text_lower.contains(pat.as_str()))
            });
            if matched {
                hits.insert(*category, signature.tool.clone());
            }
        }
    }

    hits.merge(&scan_wordpress_plugins(catalog, bundle));
    hits
}

/// Plugin slugs in script/link URLs, only once `wp-content/plugins` is seen
pub fn scan_wordpress_plugins(catalog: &SignatureCatalog, bundle: &EvidenceBundle) -> HitSet {
    let mut hits = HitSet::new();
    let srcs = bundle
        .script_srcs
        .iter()
        .chain(bundle.link_hrefs.iter())
        .map(|s| s.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    if !srcs.contains(WP_PLUGIN_MARKER) {
        return hits;
    }

    for plugin in &catalog.wordpress_plugins {
        if plugin.patterns.iter().any(|slug| srcs.contains(slug.as_str())) {
            hits.insert(Category::Forms, plugin.tool.clone());
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> SignatureCatalog {
        SignatureCatalog::builtin().unwrap()
    }

    fn bundle(html: &str, text: &str) -> EvidenceBundle {
        EvidenceBundle::from_page("https://clinic.test/", "https://clinic.test/", html, text)
    }

    #[test]
    fn test_script_src_matches() {
        let b = bundle(
            r#"<html><body><script src="https://cdn.hotdoc.com.au/widget.js"></script></body></html>"#,
            "Welcome",
        );
        let hits = scan_sources(&catalog(), &b);
        assert!(hits.contains(Category::Booking, "HotDoc"), "{:?}", hits);
    }

    #[test]
    fn test_short_pattern_never_matches() {
        // "fbq(" is a Meta Pixel pattern shorter than the minimum length
        let b = bundle(
            "<html><body><p>Ask about fbq(x) nothing else</p></body></html>",
            "Ask about fbq(x) nothing else",
        );
        let hits = scan_sources(&catalog(), &b);
        assert!(!hits.contains(Category::Pixels, "Meta Pixel"), "{:?}", hits);
    }

    #[test]
    fn test_short_pattern_inside_unrelated_word() {
        // "ghost", "cf7", "wa.me" and "__lc" all sit inside longer names
        let b = bundle(
            r#"<html><head>
            <script src="https://cdn.clinic.test/js/ghostbuttons.min.js"></script>
            <script src="https://kiwa.media/player.js"></script>
            <link rel="stylesheet" href="/assets/icons-cf7a.css">
            </head><body><div data-cache="__lcache">Meet our ghostwriter</div></body></html>"#,
            "Meet our ghostwriter",
        );
        let hits = scan_sources(&catalog(), &b);
        assert!(!hits.contains(Category::Cms, "Ghost"), "{:?}", hits);
        assert!(!hits.contains(Category::Forms, "Contact Form 7"), "{:?}", hits);
        assert!(!hits.contains(Category::LiveChat, "WhatsApp Widget"), "{:?}", hits);
        assert!(!hits.contains(Category::LiveChat, "LiveChat"), "{:?}", hits);
    }

    #[test]
    fn test_text_only_match_requires_long_pattern() {
        // Long enough pattern, present only in rendered text
        let b = bundle("<html><body></body></html>", "we use calendly.com for bookings");
        let hits = scan_sources(&catalog(), &b);
        assert!(hits.contains(Category::Booking, "Calendly"), "{:?}", hits);
    }

    #[test]
    fn test_wordpress_plugins_need_plugin_path() {
        let with_path = bundle(
            r#"<html><head><script src="/wp-content/plugins/contact-form-7/includes/js/index.js"></script></head></html>"#,
            "",
        );
        let hits = scan_wordpress_plugins(&catalog(), &with_path);
        assert!(hits.contains(Category::Forms, "Contact Form 7"));

        let without_path = bundle(
            r#"<html><head><script src="/assets/wpcf7.js"></script></head></html>"#,
            "",
        );
        assert!(scan_wordpress_plugins(&catalog(), &without_path).is_empty());
    }
}
