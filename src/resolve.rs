//! Resolution engine: folds per-site evidence into the record, then
//! cross-infers, applies co-occurrence rules, deduplicates and orders
//! each category by priority.
//!
//! Steps after the merge read and rewrite the record only, so running
//! [`finalize`] on an already finalized record changes nothing.

use crate::catalog::{Category, SignatureCatalog};
use crate::collectors;
use crate::evidence::HitSet;
use crate::record::{BookingType, QualificationRecord, IN_HOUSE_VENDOR, WEBSITE_FORM_VENDOR};
use crate::visitor::SiteEvidence;
use std::cmp::Reverse;
use tracing::debug;

const INFERRED_SUFFIX: &str = " (inferred)";
const CLOUDFLARE: &str = "Cloudflare";

/// Every channel of a site's evidence as one hit set.
///
/// Framework cookies only count when no CMS was found otherwise. Wix
/// guards run last, over the combined set.
pub fn merge_evidence(catalog: &SignatureCatalog, evidence: &SiteEvidence) -> HitSet {
    let mut hits = evidence.merged_hits();
    if !hits.has_any(Category::Cms) {
        hits.merge(&evidence.framework_cookies);
    }
    collectors::apply_wix_guards(catalog, &mut hits, &evidence.script_srcs);
    hits
}

/// Append hits to the record's categories. Tools within a category are
/// added in name order.
pub fn apply_hits(record: &mut QualificationRecord, hits: &HitSet) {
    for hit in hits.iter() {
        record.add_tool(hit.category, &hit.tool);
    }
}

fn inferred(tool: &str) -> String {
    if tool.ends_with(INFERRED_SUFFIX) {
        tool.to_string()
    } else {
        format!("{}{}", tool, INFERRED_SUFFIX)
    }
}

/// The record as deduplication will leave it. Inference reads this view
/// so that a later rename cannot enable a rule on the next pass.
fn deduplicated(catalog: &SignatureCatalog, record: &QualificationRecord) -> QualificationRecord {
    let mut view = record.clone();
    deduplicate(catalog, &mut view);
    view
}

/// Fill booking vendor from a dual-role PMS, or the PMS from a dual-role
/// booking vendor. Only empty targets are filled.
pub fn cross_infer(catalog: &SignatureCatalog, record: &mut QualificationRecord) {
    let view = deduplicated(catalog, record);
    let pms_candidate = view
        .tools(Category::PmsEhr)
        .iter()
        .filter(|t| catalog.is_dual_role(t))
        .max_by_key(|t| {
            (
                catalog.priority_index(Category::PmsEhr, t).map_or(0, |i| i + 1),
                Reverse((*t).clone()),
            )
        })
        .cloned();

    if let Some(pms) = pms_candidate {
        if record.booking_vendor_is_placeholder() {
            debug!("Inferring booking vendor from PMS {}", pms);
            record.booking_vendor = inferred(&pms);
            if record.booking_type == BookingType::NotDetected {
                record.booking_type = BookingType::Embedded;
            }
            return;
        }
    }

    let vendor = record.booking_vendor.trim().to_string();
    if !record.booking_vendor_is_placeholder()
        && catalog.is_dual_role(&vendor)
        && !record.has_tools(Category::PmsEhr)
    {
        debug!("Inferring PMS from booking vendor {}", vendor);
        record.set_tools(Category::PmsEhr, vec![inferred(&vendor)]);
    }
}

fn trigger_value(record: &QualificationRecord, category: Category) -> String {
    if category == Category::Booking && !record.has_tools(Category::Booking) {
        return record.booking_vendor.to_lowercase();
    }
    record.tools(category).join(", ").to_lowercase()
}

/// Same-vendor co-occurrence rules, repeated until nothing changes.
/// A rule fires only when its trigger is present and its target
/// category is still empty.
pub fn apply_co_occurrence(catalog: &SignatureCatalog, record: &mut QualificationRecord) {
    loop {
        let mut changed = false;
        let view = deduplicated(catalog, record);
        for rule in &catalog.co_occurrence_rules {
            if record.has_tools(rule.infer_category) {
                continue;
            }
            let trigger = rule.trigger.to_lowercase();
            let present = trigger_value(record, rule.trigger_category).contains(&trigger)
                || trigger_value(&view, rule.trigger_category).contains(&trigger);
            if present {
                debug!("Co-occurrence: {} implies {}", rule.trigger, rule.inferred);
                record.set_tools(rule.infer_category, vec![rule.inferred.clone()]);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

/// Collapse known duplicate pairs. When both names are present the
/// dropped one goes; otherwise it is renamed unless the rule only
/// applies to pairs.
pub fn deduplicate(catalog: &SignatureCatalog, record: &mut QualificationRecord) {
    for rule in &catalog.dedup_rules {
        let tools = record.tools(rule.category);
        let has_drop = tools.iter().any(|t| *t == rule.drop);
        if !has_drop {
            continue;
        }
        let has_keep = tools.iter().any(|t| *t == rule.keep);

        let updated: Vec<String> = if has_keep {
            tools.iter().filter(|t| **t != rule.drop).cloned().collect()
        } else if !rule.both_only {
            tools
                .iter()
                .map(|t| if *t == rule.drop { rule.keep.clone() } else { t.clone() })
                .collect()
        } else {
            continue;
        };
        record.set_tools(rule.category, updated);
    }
}

/// Order each category with a priority table so the most preferred tool
/// comes first. Unlisted tools keep their relative order after the
/// listed ones. Infrastructure always lists Cloudflare first.
pub fn apply_priority(catalog: &SignatureCatalog, record: &mut QualificationRecord) {
    for category in Category::ALL {
        if category == Category::Pixels || !catalog.priority.contains_key(&category) {
            continue;
        }
        let tools = record.tools(category);
        if tools.len() <= 1 {
            continue;
        }

        let rank = |tool: &String| Reverse(catalog.priority_index(category, tool).unwrap_or(0));

        let ordered = if category == Category::Infra && tools.iter().any(|t| t == CLOUDFLARE) {
            let mut others: Vec<String> = tools.iter().filter(|t| *t != CLOUDFLARE).cloned().collect();
            others.sort_by_key(rank);
            let mut ordered = vec![CLOUDFLARE.to_string()];
            ordered.extend(others);
            ordered
        } else {
            let mut ordered = tools.to_vec();
            ordered.sort_by_key(rank);
            ordered
        };
        record.set_tools(category, ordered);
    }
}

/// Generic vendor for a booking type found without a named vendor
pub fn fill_booking_vendor(record: &mut QualificationRecord) {
    if !record.booking_vendor.trim().is_empty() {
        return;
    }
    match record.booking_type {
        BookingType::Embedded | BookingType::ExternalVendor => record.booking_vendor = IN_HOUSE_VENDOR.to_string(),
        BookingType::LeadForm => record.booking_vendor = WEBSITE_FORM_VENDOR.to_string(),
        BookingType::NotDetected => {}
    }
}

/// Post-merge steps in fixed order: cross-inference, co-occurrence,
/// deduplication, priority, vendor placeholder
pub fn finalize(catalog: &SignatureCatalog, record: &mut QualificationRecord) {
    cross_infer(catalog, record);
    apply_co_occurrence(catalog, record);
    deduplicate(catalog, record);
    apply_priority(catalog, record);
    fill_booking_vendor(record);
}

/// Merge a site's evidence into `record` and finalize it
pub fn resolve(catalog: &SignatureCatalog, record: &mut QualificationRecord, evidence: &SiteEvidence) {
    let hits = merge_evidence(catalog, evidence);
    apply_hits(record, &hits);
    finalize(catalog, record);
}
