use crate::catalog::SignatureCatalog;
use crate::domain_utils;
use crate::evidence::Anchor;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// A 4-digit postcode directly after an Australian state abbreviation.
/// Bare 4-digit numbers are not postcodes here: years and prices would
/// count as extra locations.
static STATE_POSTCODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:NSW|VIC|QLD|SA|WA|TAS|ACT|NT),?\s+(\d{4})\b").unwrap());

static STATE_ABBREV: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(NSW|VIC|QLD|SA|WA|TAS|ACT|NT)\b").unwrap());

/// Landing paths (trailing slash trimmed) that mean a locations URL
/// bounced back to the homepage
const HOME_PATHS: &[&str] = &["", "/home"];

/// Multi-location verdict with the method that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationEstimate {
    pub multi_location: bool,
    pub count: u32,
    pub method: String,
}

impl Default for LocationEstimate {
    fn default() -> Self {
        Self {
            multi_location: false,
            count: 1,
            method: "none".to_string(),
        }
    }
}

/// Distinct state-anchored postcodes mentioned in `text`
pub fn postcodes_in(text: &str) -> BTreeSet<String> {
    STATE_POSTCODE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Method A: more than one distinct postcode, or more than three phone
/// numbers, across every visited page
pub fn by_repetition(postcodes: &BTreeSet<String>, phones: &BTreeSet<String>) -> Option<LocationEstimate> {
    if postcodes.len() > 1 || phones.len() > 3 {
        let count = postcodes.len().max(phones.len() / 2);
        return Some(LocationEstimate {
            multi_location: true,
            count: count as u32,
            method: "phone/postcode repetition".to_string(),
        });
    }
    None
}

/// Method B: text of the first navigation link naming a locations finder
pub fn nav_keyword(catalog: &SignatureCatalog, nav_anchors: &[Anchor]) -> Option<String> {
    nav_anchors.iter().find_map(|anchor| {
        let text = anchor.text.to_lowercase();
        let href = anchor.href.to_lowercase();
        catalog
            .location_nav_keywords
            .iter()
            .any(|kw| text.contains(kw.as_str()) || href.contains(kw.as_str()))
            .then_some(text)
    })
}

/// Method C, one page: number of locations a candidate page lists, the
/// larger of its distinct postcodes and its state mentions. Each listed
/// clinic names its state, so repeats count. Abbreviations match in
/// upper case only so "act" and "sa" in prose are not states.
/// `None` when the page redirected back to the homepage.
pub fn count_on_locations_page(final_url: &str, text: &str) -> Option<usize> {
    let path = domain_utils::url_path(final_url);
    if HOME_PATHS.contains(&path.trim_end_matches('/')) {
        return None;
    }

    let state_mentions = STATE_ABBREV.find_iter(text).count();
    Some(postcodes_in(text).len().max(state_mentions))
}

/// Combine method B's keyword with method C's best page count.
/// A positive without a usable count is floored at 2.
pub fn combine(nav_text: Option<String>, locations_page: Option<(String, usize)>) -> LocationEstimate {
    let mut estimate = LocationEstimate::default();

    if let Some(text) = nav_text {
        estimate.multi_location = true;
        estimate.method = format!("nav keyword: '{}'", text);
    }

    if let Some((path, count)) = locations_page {
        if count > 1 {
            estimate.multi_location = true;
            estimate.count = count as u32;
            estimate.method = format!("locations page ({})", path);
        }
    }

    if estimate.multi_location && estimate.count <= 1 {
        estimate.count = 2;
    }
    estimate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_postcodes_need_state_anchor() {
        let found = postcodes_in("Open since 1998. 12 Main St, Melbourne VIC 3000. Also Kew VIC, 3101");
        assert_eq!(found, set(&["3000", "3101"]));
    }

    #[test]
    fn test_repeated_postcodes_are_multi_location() {
        let mut postcodes = postcodes_in("Melbourne VIC 3000");
        postcodes.extend(postcodes_in("Box Hill VIC 3128 and Richmond VIC 3121"));
        postcodes.extend(postcodes_in("Melbourne VIC 3000"));
        let estimate = by_repetition(&postcodes, &BTreeSet::new()).unwrap();
        assert!(estimate.multi_location);
        assert_eq!(estimate.count, 3);
        assert_eq!(estimate.method, "phone/postcode repetition");
    }

    #[test]
    fn test_phones_are_halved() {
        let phones = set(&["+61 3 1", "+61 3 2", "+61 3 3", "+61 3 4", "+61 3 5"]);
        let estimate = by_repetition(&set(&["3000"]), &phones).unwrap();
        assert_eq!(estimate.count, 2);
        assert!(by_repetition(&set(&["3000"]), &set(&["a", "b", "c"])).is_none());
    }

    #[test]
    fn test_nav_keyword() {
        let catalog = SignatureCatalog::builtin().unwrap();
        let anchors = vec![
            Anchor { text: "Home".into(), href: "/".into() },
            Anchor { text: "Our Clinics".into(), href: "/clinics".into() },
        ];
        assert_eq!(nav_keyword(&catalog, &anchors), Some("our clinics".to_string()));
        assert_eq!(nav_keyword(&catalog, &anchors[..1]), None);
    }

    #[test]
    fn test_locations_page_redirected_home() {
        assert_eq!(count_on_locations_page("https://clinic.test/", "VIC 3000 NSW 2000"), None);
        assert_eq!(count_on_locations_page("https://clinic.test/home", "VIC 3000"), None);
        assert_eq!(
            count_on_locations_page("https://clinic.test/locations", "Kew VIC 3101, Sydney NSW 2000"),
            Some(2)
        );
    }

    #[test]
    fn test_locations_page_counts_every_state_mention() {
        let text = "Kew VIC. Box Hill VIC. Richmond VIC. Act now to book, sa ok";
        assert_eq!(count_on_locations_page("https://clinic.test/locations", text), Some(3));
    }

    #[test]
    fn test_keyword_only_floors_at_two() {
        let estimate = combine(Some("our clinics".into()), Some(("/locations".into(), 1)));
        assert!(estimate.multi_location);
        assert_eq!(estimate.count, 2);
        assert_eq!(estimate.method, "nav keyword: 'our clinics'");
    }

    #[test]
    fn test_locations_page_count_wins() {
        let estimate = combine(Some("find us".into()), Some(("/locations".into(), 4)));
        assert_eq!(estimate.count, 4);
        assert_eq!(estimate.method, "locations page (/locations)");
    }

    #[test]
    fn test_no_signal_is_single_location() {
        assert_eq!(combine(None, None), LocationEstimate::default());
        assert!(!combine(None, Some(("/find-us".into(), 1))).multi_location);
    }
}
