//! Contact-surface extraction: emails, phones, postal address, social
//! links, clinic name and home-visit mentions.

use crate::catalog::SignatureCatalog;
use crate::domain_utils;
use crate::evidence::element_text;
use crate::record::Address;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::BTreeSet;

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}\b").unwrap());
static MAILTO: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)href=["']mailto:([^"'?\s]+)"#).unwrap());
static TEL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)href=["']tel:([^"'#]+)"#).unwrap());

static PHONE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\(0\d\)\s?\d{4}\s?\d{4}",
        r"0\d{9}",
        r"0\d\s\d{4}\s\d{4}",
        r"1[38]00\s?\d{3}\s?\d{3}",
        r"\+61\s?\d[\s\d]{8,11}",
        r"\+\d{1,3}[\s\-]?\(?\d{1,4}\)?[\s\-]?\d{4}[\s\-]?\d{4}",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static JSON_LD: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

static NAME_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["h1", ".site-title", ".clinic-name", r#"[class*="logo"]"#]
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});

const AU_STATES: &str = r"(?:NSW|VIC|QLD|SA|WA|TAS|ACT|NT)";
const STREET_TYPES: &str = r"(?:Street|St\.?|Avenue|Ave\.?|Road|Rd\.?|Drive|Dr\.?|Boulevard|Blvd\.?|Lane|Ln\.?|Place|Pl\.?|Court|Ct\.?|Way|Parade|Pde\.?|Close|Cl\.?|Terrace|Tce\.?|Crescent|Cres\.?|Circuit|Cct\.?|Highway|Hwy\.?|Grove|Grv\.?|Cove|View|Vista)";

static TRAILING_STATE_POSTCODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i),?\s+{}\s+\d{{4}}\s*$", AU_STATES)).unwrap());
static STREET: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)(\d+\s+[\w\s]+?{})", STREET_TYPES)).unwrap());
static STREET_TYPE: Lazy<Regex> = Lazy::new(|| Regex::new(&format!(r"(?i){}", STREET_TYPES)).unwrap());
static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+").unwrap());
static TEXT_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\d+\s[\w\s]+(?:Street|St|Avenue|Ave|Road|Rd|Drive|Dr|Boulevard|Blvd|Lane|Ln|Place|Pl|Court|Ct|Way|Parade|Pde|Close|Cl|Terrace|Tce)[,\s]+[\w\s]+[,\s]+(NSW|VIC|QLD|SA|WA|TAS|ACT|NT)[,?\s]+(\d{4}))",
    )
    .unwrap()
});
static STATE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(NSW|VIC|QLD|SA|WA|TAS|ACT|NT)\b").unwrap());
static FOUR_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})\b").unwrap());

static INSTAGRAM: Lazy<Regex> = Lazy::new(|| Regex::new(r#"href=["'][^"']*instagram\.com/[^"']{2,}"#).unwrap());
static WHATSAPP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(wa\.me/|api\.whatsapp\.com/send|whatsapp://send|href=["'][^"']*whatsapp\.com/[^"']*[?&]phone=)"#)
        .unwrap()
});

/// Longest clinic name accepted from the page
const MAX_NAME_LEN: usize = 100;

/// State names, variants and major cities mapped to the state abbreviation
const STATE_ABBREVIATIONS: &[(&str, &str)] = &[
    ("new south wales", "NSW"),
    ("nsw", "NSW"),
    ("victoria", "VIC"),
    ("vic", "VIC"),
    ("queensland", "QLD"),
    ("qld", "QLD"),
    ("south australia", "SA"),
    ("sa", "SA"),
    ("western australia", "WA"),
    ("wa", "WA"),
    ("tasmania", "TAS"),
    ("tas", "TAS"),
    ("australian capital territory", "ACT"),
    ("act", "ACT"),
    ("northern territory", "NT"),
    ("nt", "NT"),
    ("sydney", "NSW"),
    ("melbourne", "VIC"),
    ("brisbane", "QLD"),
    ("adelaide", "SA"),
    ("perth", "WA"),
    ("hobart", "TAS"),
    ("darwin", "NT"),
    ("canberra", "ACT"),
    ("newcastle", "NSW"),
    ("wollongong", "NSW"),
    ("gold coast", "QLD"),
    ("geelong", "VIC"),
    ("ballarat", "VIC"),
    ("bendigo", "VIC"),
    ("townsville", "QLD"),
    ("cairns", "QLD"),
    ("toowoomba", "QLD"),
    ("launceston", "TAS"),
    ("alice springs", "NT"),
];

const DEFAULT_COUNTRY: &str = "Australia";

/// Contact emails from text and `mailto:` links, lowercased and sorted.
/// Addresses containing an exclusion marker are dropped.
pub fn extract_emails(catalog: &SignatureCatalog, text: &str, html: &str) -> BTreeSet<String> {
    let excluded = |email: &str| catalog.email_exclusions.iter().any(|ex| email.contains(ex.as_str()));
    let mut found = BTreeSet::new();

    for m in EMAIL.find_iter(text) {
        let email = m.as_str().to_lowercase();
        if !excluded(&email) {
            found.insert(email);
        }
    }
    for cap in MAILTO.captures_iter(html) {
        let email = cap[1].trim().to_lowercase();
        if email.contains('@') && !excluded(&email) {
            found.insert(email);
        }
    }
    found
}

/// Phone numbers from text and `tel:` links, standardized and sorted
pub fn extract_phones(text: &str, html: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();

    for pattern in PHONE_PATTERNS.iter() {
        for m in pattern.find_iter(text) {
            let raw = m.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
            if let Some(phone) = standardize_phone(&raw) {
                found.insert(phone);
            }
        }
    }
    for cap in TEL.captures_iter(html) {
        let raw = percent_decode(cap[1].trim());
        if let Some(phone) = standardize_phone(&raw) {
            found.insert(phone);
        }
    }
    found
}

fn percent_decode(raw: &str) -> String {
    url::form_urlencoded::parse(format!("v={}", raw).as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| raw.to_string())
}

/// Normalize to `+<country code>` with grouped digits.
///
/// Australian landlines render as `+61 3 9999 0000`, mobiles as
/// `+61 412 345 678` and 1300/1800 numbers as `+61 1300 123 456`.
/// Fewer than 8 digits (a bare area code) is rejected.
pub fn standardize_phone(raw: &str) -> Option<String> {
    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 8 {
        return None;
    }

    if digits.len() == 10 && digits.starts_with('0') {
        digits = format!("61{}", &digits[1..]);
    } else if digits.len() == 10 && (digits.starts_with("13") || digits.starts_with("18")) {
        digits = format!("61{}", digits);
    } else if digits.len() == 9 && !digits.starts_with("61") {
        digits = format!("61{}", digits);
    }

    if digits.starts_with("61") && digits.len() >= 11 {
        let d = digits.as_str();
        if d.len() == 12 && (&d[2..6] == "1300" || &d[2..6] == "1800") {
            return Some(format!("+{} {} {} {}", &d[..2], &d[2..6], &d[6..9], &d[9..]));
        }
        if d.len() == 11 && &d[2..3] == "4" {
            return Some(format!("+{} {} {} {}", &d[..2], &d[2..5], &d[5..8], &d[8..]));
        }
        if d.len() == 11 {
            return Some(format!("+{} {} {} {}", &d[..2], &d[2..3], &d[3..7], &d[7..]));
        }
        if d.len() == 12 {
            return Some(format!("+{} {}", &d[..2], &d[2..]));
        }
    }

    if digits.len() >= 10 && !digits.starts_with('0') {
        let cc_len = if digits.starts_with('1') { 1 } else { 2 };
        let (cc, rest) = digits.split_at(cc_len);
        if rest.len() >= 6 {
            let formatted = format!("+{} {} {} {}", cc, &rest[..3], &rest[3..6], &rest[6..]);
            return Some(formatted.trim_end().to_string());
        }
        return Some(format!("+{} {}", cc, rest));
    }

    Some(raw.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Map a state name, variant or major city to its abbreviation;
/// anything else is uppercased
pub fn standardize_state(raw: &str) -> String {
    let key = raw.trim().to_lowercase();
    STATE_ABBREVIATIONS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, abbrev)| abbrev.to_string())
        .unwrap_or_else(|| raw.trim().to_uppercase())
}

pub fn standardize_country(raw: &str) -> String {
    match raw.trim().to_lowercase().as_str() {
        "australia" | "australian" | "au" | "aus" => DEFAULT_COUNTRY.to_string(),
        _ => raw.trim().to_string(),
    }
}

/// Street part (number, name, type) of an address line, dropping a
/// trailing suburb/state/postcode. Empty when nothing looks like a street.
pub fn street_only(address: &str) -> String {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let without_tail = TRAILING_STATE_POSTCODE.replace(trimmed, "");
    let s = without_tail.trim().trim_end_matches(',');

    if let Some(m) = STREET.captures(s).and_then(|c| c.get(1)) {
        return m.as_str().trim().to_string();
    }

    s.split(|c| c == ',' || c == '\n')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .find(|part| STREET_TYPE.is_match(part) || LEADING_NUMBER.is_match(part))
        .map(str::to_string)
        .unwrap_or_default()
}

/// Postal address: schema.org JSON-LD first, then an Australian address
/// pattern in the visible text
pub fn extract_address(html: &str, text: &str) -> Address {
    let (mut address, full_address) = match address_from_json_ld(html) {
        Some(found) => found,
        None => address_from_text(text),
    };

    if !address.state.is_empty() {
        address.state = standardize_state(&address.state);
    } else if let Some(full) = &full_address {
        if let Some(cap) = STATE_WORD.captures(full) {
            address.state = standardize_state(&cap[1]);
        }
    }

    if !address.country.is_empty() {
        address.country = standardize_country(&address.country);
    } else if !address.state.is_empty() || !address.postcode.is_empty() {
        address.country = DEFAULT_COUNTRY.to_string();
    }

    if !address.street.is_empty() {
        let cleaned = street_only(&address.street);
        if !cleaned.is_empty() {
            address.street = cleaned;
        }
    } else if let Some(full) = &full_address {
        address.street = street_only(full);
    }

    address
}

/// Address from the first JSON-LD item carrying one. A plain-string
/// `address` is returned as the full address line.
fn address_from_json_ld(html: &str) -> Option<(Address, Option<String>)> {
    let document = Html::parse_document(html);

    for script in document.select(&JSON_LD) {
        let raw: String = script.text().collect();
        let Ok(data) = serde_json::from_str::<Value>(raw.trim()) else {
            continue;
        };

        let items: Vec<&Value> = match &data {
            Value::Array(list) => list.iter().collect(),
            Value::Object(map) => match map.get("@graph") {
                Some(Value::Array(graph)) => graph.iter().collect(),
                _ => vec![&data],
            },
            _ => continue,
        };

        for item in items {
            match item.get("address") {
                Some(Value::String(line)) => return Some((Address::default(), Some(line.clone()))),
                Some(Value::Object(fields)) => {
                    let field = |key: &str| fields.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
                    let raw_street = field("streetAddress");
                    let street = match street_only(&raw_street) {
                        s if s.is_empty() => raw_street.clone(),
                        s => s,
                    };
                    let country = match fields.get("addressCountry") {
                        Some(Value::Object(c)) => c.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                        Some(Value::String(c)) => c.clone(),
                        _ => String::new(),
                    };
                    let address = Address {
                        street,
                        city: field("addressLocality"),
                        state: standardize_state(&field("addressRegion")),
                        postcode: field("postalCode"),
                        country: standardize_country(&country),
                    };
                    if !address.is_empty() {
                        return Some((address, None));
                    }
                }
                _ => {}
            }
        }
    }
    None
}

fn address_from_text(text: &str) -> (Address, Option<String>) {
    let mut address = Address::default();
    let mut full = None;

    if let Some(cap) = TEXT_ADDRESS.captures(text) {
        full = Some(cap[0].trim().to_string());
        address.state = standardize_state(&cap[2]);
        address.postcode = cap[3].to_string();
    }
    if address.state.is_empty() {
        if let Some(cap) = STATE_WORD.captures(text) {
            address.state = standardize_state(&cap[1]);
        }
    }
    if address.postcode.is_empty() {
        if let Some(cap) = FOUR_DIGITS.captures(text) {
            address.postcode = cap[1].to_string();
        }
    }
    (address, full)
}

/// Instagram needs a linked profile; WhatsApp needs a click-to-chat link
pub fn social_flags(html: &str) -> (bool, bool) {
    let lower = html.to_lowercase();
    (INSTAGRAM.is_match(&lower), WHATSAPP.is_match(&lower))
}

/// Clinic name from the first short heading, site title or logo text,
/// falling back to the bare host
pub fn clinic_name(html: &str, url: &str) -> String {
    let document = Html::parse_document(html);
    for selector in NAME_SELECTORS.iter() {
        if let Some(el) = document.select(selector).next() {
            let text = element_text(el);
            if !text.is_empty() && text.chars().count() < MAX_NAME_LEN {
                return text;
            }
        }
    }
    domain_utils::site_host(url).unwrap_or_default()
}

pub fn mentions_home_visits(catalog: &SignatureCatalog, html: &str) -> bool {
    let lower = html.to_lowercase();
    catalog.home_visit_keywords.iter().any(|kw| lower.contains(kw.as_str()))
}
