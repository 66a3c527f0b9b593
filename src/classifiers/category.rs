use crate::catalog::{SignatureCatalog, NOT_DETECTED};
use crate::evidence::EvidenceBundle;

/// Reported when the top two scores are too close to call
pub const MIXED_CATEGORY: &str = "Mixed / Multidisciplinary";

/// Top score must beat the runner-up by this ratio to win outright
const WIN_RATIO: f64 = 1.2;

const TITLE_WEIGHT: u32 = 4;
const META_WEIGHT: u32 = 3;
const HEADING_WEIGHT: u32 = 3;
const BODY_WEIGHT: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryResult {
    pub category: String,
    /// Share of the total score held by the top category, 0-100
    pub confidence: f64,
    /// Score per category, in catalog order
    pub scores: Vec<(String, u32)>,
}

/// Score each catalog category over title, meta description, first
/// heading and body text. Every keyword found in a field adds that
/// field's weight.
pub fn classify(catalog: &SignatureCatalog, page: &EvidenceBundle) -> CategoryResult {
    let fields = [
        (page.title.to_lowercase(), TITLE_WEIGHT),
        (page.meta_description.to_lowercase(), META_WEIGHT),
        (page.h1.to_lowercase(), HEADING_WEIGHT),
        (page.visible_text.to_lowercase(), BODY_WEIGHT),
    ];

    let scores: Vec<(String, u32)> = catalog
        .category_keywords
        .iter()
        .map(|entry| {
            let score = fields
                .iter()
                .map(|(text, weight)| {
                    let hits = entry.keywords.iter().filter(|kw| text.contains(kw.as_str())).count() as u32;
                    hits * weight
                })
                .sum();
            (entry.category.clone(), score)
        })
        .collect();

    decide(scores)
}

/// Pick the winner from per-category scores. Ties on the top score go to
/// the earlier category.
pub fn decide(scores: Vec<(String, u32)>) -> CategoryResult {
    let total: u32 = scores.iter().map(|(_, s)| s).sum();
    if total == 0 {
        return CategoryResult {
            category: NOT_DETECTED.to_string(),
            confidence: 0.0,
            scores,
        };
    }

    let mut top: Option<&(String, u32)> = None;
    for entry in &scores {
        if top.map_or(true, |t| entry.1 > t.1) {
            top = Some(entry);
        }
    }
    let Some((top_name, top_score)) = top.cloned() else {
        return CategoryResult {
            category: NOT_DETECTED.to_string(),
            confidence: 0.0,
            scores,
        };
    };

    let mut sorted: Vec<u32> = scores.iter().map(|(_, s)| *s).collect();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    let second = sorted.get(1).copied().unwrap_or(0);

    let category = if second > 0 && (top_score as f64) / (second as f64) < WIN_RATIO {
        MIXED_CATEGORY.to_string()
    } else {
        top_name
    };

    let confidence = ((top_score as f64 / total as f64) * 1000.0).round() / 10.0;

    CategoryResult {
        category,
        confidence,
        scores,
    }
}
