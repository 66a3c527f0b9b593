use crate::catalog::SignatureCatalog;
use crate::record::BillingType;

/// Billing model from the phrase tables, over the visible text of every
/// visited page.
///
/// A negated phrase ("we don't bulk bill") lives in the private table, so
/// a page containing it counts as private even though it also matches a
/// bulk-billing phrase.
pub fn detect_billing<'a, I>(catalog: &SignatureCatalog, texts: I) -> BillingType
where
    I: IntoIterator<Item = &'a str>,
{
    let phrases = &catalog.billing;
    let mut bulk = false;
    let mut private = false;
    let mut negated = false;

    for text in texts {
        if phrases.mixed.iter().any(|re| re.is_match(text)) {
            return BillingType::Mixed;
        }
        let page_private = phrases.private.iter().any(|re| re.is_match(text));
        let page_bulk = phrases.bulk_billed.iter().any(|re| re.is_match(text));
        if page_private && page_bulk && is_negated(text) {
            negated = true;
        } else {
            bulk |= page_bulk;
        }
        private |= page_private;
    }

    match (bulk, private || negated) {
        (true, true) => BillingType::Mixed,
        (true, false) => BillingType::BulkBilled,
        (false, true) => BillingType::Private,
        (false, false) => BillingType::NotDetected,
    }
}

fn is_negated(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["don't bulk bill", "do not bulk bill", "not bulk bill", "no bulk billing"]
        .iter()
        .any(|p| lower.contains(p))
}
