//! Cookie-name collectors.

use crate::catalog::SignatureCatalog;
use crate::evidence::HitSet;
use once_cell::sync::Lazy;
use regex::Regex;

/// Keys shorter than this must equal the cookie name
const MIN_PREFIX_KEY_LEN: usize = 4;

const XSRF_COOKIE: &str = "XSRF-TOKEN";
const LARAVEL_TOOL: &str = "Laravel (Custom)";

static APP_SESSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_]+_session$").unwrap());

/// Match cookie names against the cookie table by exact name or prefix.
pub fn scan_cookies(catalog: &SignatureCatalog, names: &[String]) -> HitSet {
    let mut hits = HitSet::new();
    for name in names {
        for signature in &catalog.cookie_signatures {
            let key = signature.key.as_str();
            let matched = if key.len() < MIN_PREFIX_KEY_LEN {
                name == key
            } else {
                name.starts_with(key)
            };
            if matched {
                hits.insert(signature.category, signature.tool.clone());
            }
        }
    }
    hits
}

/// Backend framework from session/CSRF cookie conventions.
///
/// Only meaningful when no CMS was otherwise detected; the caller applies
/// that gate.
pub fn scan_framework_cookies(catalog: &SignatureCatalog, names: &[String]) -> HitSet {
    let mut hits = HitSet::new();
    let has_xsrf = names.iter().any(|n| n == XSRF_COOKIE);

    for name in names {
        for signature in &catalog.framework_cookies {
            if *name == signature.key {
                hits.insert(signature.category, signature.tool.clone());
            }
        }
        if has_xsrf && APP_SESSION_RE.is_match(name) {
            hits.insert(crate::catalog::Category::Cms, LARAVEL_TOOL);
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Category;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_short_key_requires_exact_match() {
        let catalog = SignatureCatalog::builtin().unwrap();
        let hits = scan_cookies(&catalog, &names(&["hsfoo"]));
        assert!(!hits.contains(Category::Crm, "HubSpot"));

        let hits = scan_cookies(&catalog, &names(&["hs"]));
        assert!(hits.contains(Category::Crm, "HubSpot"));
    }

    #[test]
    fn test_short_key_inside_unrelated_cookie() {
        let catalog = SignatureCatalog::builtin().unwrap();
        let hits = scan_cookies(&catalog, &names(&["_gat_UA123", "_gac_x", "hs_pref", "ths"]));
        assert!(!hits.contains(Category::Pixels, "Google Analytics 4"), "{:?}", hits);
        assert!(!hits.contains(Category::Crm, "HubSpot"), "{:?}", hits);

        let hits = scan_cookies(&catalog, &names(&["_ga"]));
        assert!(hits.contains(Category::Pixels, "Google Analytics 4"));
    }

    #[test]
    fn test_prefix_match_for_long_keys() {
        let catalog = SignatureCatalog::builtin().unwrap();
        let hits = scan_cookies(&catalog, &names(&["_hjid_9f2c", "__cf_bm"]));
        assert!(hits.contains(Category::Pixels, "Hotjar"));
        assert!(hits.contains(Category::Infra, "Cloudflare"));
    }

    #[test]
    fn test_framework_cookies() {
        let catalog = SignatureCatalog::builtin().unwrap();
        let hits = scan_framework_cookies(&catalog, &names(&["csrftoken"]));
        assert!(hits.contains(Category::Cms, "Django (Custom)"));

        let hits = scan_framework_cookies(&catalog, &names(&["myclinic_session", "XSRF-TOKEN"]));
        assert!(hits.contains(Category::Cms, "Laravel (Custom)"));

        // An app session cookie alone is not enough
        let hits = scan_framework_cookies(&catalog, &names(&["myclinic_session"]));
        assert!(hits.is_empty());
    }
}
