//! Outbound request collector. Sees resources that load after the initial
//! parse, such as deferred chat widgets and tag-manager payloads.

use crate::catalog::SignatureCatalog;
use crate::evidence::HitSet;

/// Map logged request URLs to hits by substring
pub fn scan_requests(catalog: &SignatureCatalog, requests: &[String]) -> HitSet {
    let mut hits = HitSet::new();
    for request in requests {
        let url = request.to_lowercase();
        for watch in &catalog.network_watch {
            if url.contains(watch.key.as_str()) {
                hits.insert(watch.category, watch.tool.clone());
            }
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Category;

    #[test]
    fn test_deferred_widget_request() {
        let catalog = SignatureCatalog::builtin().unwrap();
        let requests = vec![
            "https://clinic.test/".to_string(),
            "https://embed.tawk.to/abc/default".to_string(),
            "https://www.googletagmanager.com/gtm.js?id=GTM-XYZ".to_string(),
        ];
        let hits = scan_requests(&catalog, &requests);
        assert!(hits.contains(Category::LiveChat, "Tawk.to"));
        assert!(hits.contains(Category::Pixels, "Google Tag Manager"));
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_no_requests_no_hits() {
        let catalog = SignatureCatalog::builtin().unwrap();
        assert!(scan_requests(&catalog, &[]).is_empty());
    }
}
