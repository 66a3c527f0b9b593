//! Response-header collector, including Content-Security-Policy allow-lists.

use crate::catalog::{Category, SignatureCatalog};
use crate::evidence::{HitSet, ResponseHeaders};

/// Infrastructure hints from `name:value` header text plus CSP vendors
pub fn scan_headers(catalog: &SignatureCatalog, headers: &ResponseHeaders) -> HitSet {
    let mut hits = HitSet::new();
    if headers.is_empty() {
        return hits;
    }

    let joined = headers.joined_lowercase();
    for signature in &catalog.header_signatures {
        if signature.patterns.iter().any(|p| joined.contains(p.as_str())) {
            hits.insert(Category::Infra, signature.tool.clone());
        }
    }

    if let Some(csp) = headers.content_security_policy() {
        hits.merge(&scan_csp(catalog, csp));
    }
    hits
}

/// Vendors allow-listed in a CSP value. Catches tools that are wired in
/// but lazy-loaded or hidden behind a tag manager.
pub fn scan_csp(catalog: &SignatureCatalog, csp: &str) -> HitSet {
    let mut hits = HitSet::new();
    let lower = csp.to_lowercase();
    for signature in &catalog.csp_signatures {
        if lower.contains(signature.key.as_str()) {
            hits.insert(signature.category, signature.tool.clone());
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_header_infra() {
        let catalog = SignatureCatalog::builtin().unwrap();
        let headers = ResponseHeaders::new(vec![("Server", "nginx/1.25"), ("X-Powered-By", "PHP")]);
        let hits = scan_headers(&catalog, &headers);
        assert!(hits.contains(Category::Infra, "nginx"));
        assert!(!hits.contains(Category::Infra, "Cloudflare"));
    }

    #[test]
    fn test_csp_allow_list_detects_stripe() {
        let catalog = SignatureCatalog::builtin().unwrap();
        let headers = ResponseHeaders::new(vec![(
            "Content-Security-Policy",
            "default-src 'self'; script-src 'self' https://js.stripe.com",
        )]);
        let hits = scan_headers(&catalog, &headers);
        assert!(hits.contains(Category::Payments, "Stripe"));
    }

    #[test]
    fn test_empty_headers() {
        let catalog = SignatureCatalog::builtin().unwrap();
        assert!(scan_headers(&catalog, &ResponseHeaders::default()).is_empty());
    }
}
