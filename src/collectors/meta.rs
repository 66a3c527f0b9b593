//! Self-reported `<meta name="generator">` collector.

use crate::catalog::SignatureCatalog;
use crate::evidence::{EvidenceBundle, HitSet};

pub fn scan_meta_generator(catalog: &SignatureCatalog, bundle: &EvidenceBundle) -> HitSet {
    let mut hits = HitSet::new();
    if bundle.generator.is_empty() {
        return hits;
    }
    for signature in &catalog.meta_generator {
        if bundle.generator.contains(signature.key.as_str()) {
            hits.insert(signature.category, signature.tool.clone());
        }
    }
    hits
}
