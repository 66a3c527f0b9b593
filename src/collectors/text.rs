//! Visible-text collector: curated phrases for tools named in copy but
//! never loaded as a script.

use crate::catalog::SignatureCatalog;
use crate::evidence::HitSet;

pub fn scan_visible_text(catalog: &SignatureCatalog, text: &str) -> HitSet {
    let mut hits = HitSet::new();
    if text.trim().is_empty() {
        return hits;
    }

    let lower = text.to_lowercase();
    for (category, phrases) in &catalog.text_phrases {
        for signature in phrases {
            if signature.phrases.iter().any(|re| re.is_match(&lower)) {
                hits.insert(*category, signature.tool.clone());
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
    fn test_phrase_in_copy() {
        let catalog = SignatureCatalog::builtin().unwrap();
        let hits = scan_visible_text(&catalog, "Book online with HotDoc today. We also offer Coviu video calls.");
        assert!(hits.contains(Category::Booking, "HotDoc"));
        assert!(hits.contains(Category::Telehealth, "Coviu"));
    }

    #[test]
    fn test_plain_copy_has_no_hits() {
        let catalog = SignatureCatalog::builtin().unwrap();
        let hits = scan_visible_text(&catalog, "Friendly physiotherapy for the whole family.");
        assert!(hits.is_empty(), "{:?}", hits);
    }
}
