//! robots.txt collector. Disallow paths betray the CMS and common plugins.

use crate::catalog::SignatureCatalog;
use crate::evidence::HitSet;
use std::time::Duration;
use tracing::debug;

pub fn scan_robots(catalog: &SignatureCatalog, content: &str) -> HitSet {
    let mut hits = HitSet::new();
    let lower = content.to_lowercase();
    for signature in &catalog.robots_signatures {
        if lower.contains(signature.key.as_str()) {
            hits.insert(signature.category, signature.tool.clone());
        }
    }
    hits
}

/// Fetch `<base>/robots.txt` and scan it. Any failure or non-200 status
/// yields no hits.
pub async fn fetch_robots(
    client: &reqwest::Client,
    catalog: &SignatureCatalog,
    base_url: &str,
    timeout: Duration,
) -> HitSet {
    let robots_url = format!("{}/robots.txt", base_url.trim_end_matches('/'));

    let response = match client.get(&robots_url).timeout(timeout).send().await {
        Ok(resp) => resp,
        Err(e) => {
            debug!("robots.txt fetch failed for {}: {}", robots_url, e);
            return HitSet::new();
        }
    };

    if response.status() != reqwest::StatusCode::OK {
        debug!("robots.txt for {} returned {}", robots_url, response.status());
        return HitSet::new();
    }

    match response.text().await {
        Ok(body) => scan_robots(catalog, &body),
        Err(e) => {
            debug!("robots.txt body unreadable for {}: {}", robots_url, e);
            HitSet::new()
        }
    }
}
