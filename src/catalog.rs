//! Signature catalog for website fingerprinting.
//!
//! The catalog is shipped as `config/signatures.json` and compiled once at
//! startup into an immutable [`SignatureCatalog`]. Every collector and
//! classifier borrows it; nothing mutates it after construction.
//!
//! Lookup tables cover:
//! - URL/HTML substring patterns per category and tool
//! - Visible-text phrase regexes per category and tool
//! - Network, cookie, CSP, header, meta-generator and robots.txt tables
//! - Resolution rules (priority, dedup, co-occurrence, dual-role tools)
//! - Classifier keyword tables (booking, locations, clinic category, billing)

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Catalog shipped with the binary
pub const DEFAULT_CATALOG: &str = include_str!("../config/signatures.json");

/// URL/HTML patterns shorter than this never match
pub const MIN_PATTERN_LEN: usize = 6;

/// URL patterns must be at least this long to match visible text
pub const MIN_TEXT_PATTERN_LEN: usize = 8;

/// Literal value for a category with no detected tool
pub const NOT_DETECTED: &str = "not_detected";

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read signature catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse signature catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid phrase regex in '{table}': {pattern}: {error}")]
    InvalidPhrase {
        table: String,
        pattern: String,
        error: String,
    },

    #[error("Duplicate tool '{tool}' in {table} for category {category}")]
    DuplicateTool {
        table: String,
        category: Category,
        tool: String,
    },

    #[error("Empty tool name in {table}")]
    EmptyTool { table: String },
}

/// A qualification dimension. Declaration order is catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    PmsEhr,
    Booking,
    Cms,
    Crm,
    Payments,
    Telehealth,
    Forms,
    Pixels,
    LiveChat,
    Reviews,
    Infra,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::PmsEhr,
        Category::Booking,
        Category::Cms,
        Category::Crm,
        Category::Payments,
        Category::Telehealth,
        Category::Forms,
        Category::Pixels,
        Category::LiveChat,
        Category::Reviews,
        Category::Infra,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::PmsEhr => "pms_ehr",
            Category::Booking => "booking",
            Category::Cms => "cms",
            Category::Crm => "crm",
            Category::Payments => "payments",
            Category::Telehealth => "telehealth",
            Category::Forms => "forms",
            Category::Pixels => "pixels",
            Category::LiveChat => "live_chat",
            Category::Reviews => "reviews",
            Category::Infra => "infra",
        }
    }

    /// Spreadsheet column name. `booking` is renamed so it does not read
    /// as the booking vendor column.
    pub fn column_name(&self) -> &'static str {
        match self {
            Category::Booking => "booking_tools",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category '{}'", s))
    }
}

// ----------------------------------------------------------------------------
// On-disk format
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct ToolPatterns {
    tool: String,
    patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PatternHit {
    pattern: String,
    category: Category,
    tool: String,
}

#[derive(Debug, Clone, Deserialize)]
struct DomainName {
    domain: String,
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CategoryKeywordsFile {
    category: String,
    keywords: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct BillingPhrasesFile {
    bulk_billed: Vec<String>,
    mixed: Vec<String>,
    private: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogFile {
    version: String,
    url_signatures: BTreeMap<Category, Vec<ToolPatterns>>,
    text_phrases: BTreeMap<Category, Vec<ToolPatterns>>,
    header_signatures: Vec<ToolPatterns>,
    network_watch: Vec<PatternHit>,
    cookie_signatures: Vec<PatternHit>,
    framework_cookies: Vec<PatternHit>,
    csp_signatures: Vec<PatternHit>,
    meta_generator: Vec<PatternHit>,
    robots_signatures: Vec<PatternHit>,
    wordpress_plugins: Vec<ToolPatterns>,
    priority: BTreeMap<Category, Vec<String>>,
    dedup_rules: Vec<DedupRule>,
    co_occurrence_rules: Vec<CoOccurrenceRule>,
    booking_is_also_pms: Vec<String>,
    booking_vendor_domains: Vec<String>,
    booking_vendor_names: Vec<DomainName>,
    booking_link_keywords: Vec<String>,
    lead_form_vendors: Vec<DomainName>,
    lead_form_phrases: Vec<String>,
    category_keywords: Vec<CategoryKeywordsFile>,
    location_nav_keywords: Vec<String>,
    location_paths: Vec<String>,
    home_visit_keywords: Vec<String>,
    wix_third_party_forms: Vec<String>,
    billing_phrases: BillingPhrasesFile,
    email_exclusions: Vec<String>,
}

// ----------------------------------------------------------------------------
// Compiled catalog
// ----------------------------------------------------------------------------

/// Substring patterns for one tool, lowercased at load time
#[derive(Debug, Clone)]
pub struct ToolSignature {
    pub tool: String,
    pub patterns: Vec<String>,
}

/// Natural-language phrases for one tool
#[derive(Debug, Clone)]
pub struct PhraseSignature {
    pub tool: String,
    pub phrases: Vec<Regex>,
}

/// A single substring → (category, tool) mapping
#[derive(Debug, Clone)]
pub struct KeyedSignature {
    pub key: String,
    pub category: Category,
    pub tool: String,
}

/// Known overlapping pair: `drop` is removed when `keep` is present,
/// otherwise renamed to `keep` unless `both_only`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DedupRule {
    pub category: Category,
    pub drop: String,
    pub keep: String,
    pub both_only: bool,
}

/// Same-vendor inference from a strong trigger
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CoOccurrenceRule {
    pub trigger_category: Category,
    pub trigger: String,
    pub infer_category: Category,
    pub inferred: String,
}

/// Vendor domain → display name
#[derive(Debug, Clone)]
pub struct VendorName {
    pub domain: String,
    pub name: String,
}

/// Clinic category → keyword list (table order is tie-break order)
#[derive(Debug, Clone)]
pub struct CategoryKeywords {
    pub category: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BillingPhrases {
    pub bulk_billed: Vec<Regex>,
    pub mixed: Vec<Regex>,
    pub private: Vec<Regex>,
}

/// Immutable signature catalog, built once and shared by reference.
#[derive(Debug, Clone)]
pub struct SignatureCatalog {
    pub version: String,
    pub url_signatures: BTreeMap<Category, Vec<ToolSignature>>,
    pub text_phrases: BTreeMap<Category, Vec<PhraseSignature>>,
    /// Infrastructure hints matched against `name:value` header text
    pub header_signatures: Vec<ToolSignature>,
    pub network_watch: Vec<KeyedSignature>,
    pub cookie_signatures: Vec<KeyedSignature>,
    pub framework_cookies: Vec<KeyedSignature>,
    pub csp_signatures: Vec<KeyedSignature>,
    pub meta_generator: Vec<KeyedSignature>,
    pub robots_signatures: Vec<KeyedSignature>,
    pub wordpress_plugins: Vec<ToolSignature>,
    /// Most-preferred tool last
    pub priority: BTreeMap<Category, Vec<String>>,
    pub dedup_rules: Vec<DedupRule>,
    pub co_occurrence_rules: Vec<CoOccurrenceRule>,
    pub booking_is_also_pms: BTreeSet<String>,
    pub booking_vendor_domains: Vec<String>,
    pub booking_vendor_names: Vec<VendorName>,
    pub booking_link_keywords: Vec<String>,
    pub lead_form_vendors: Vec<VendorName>,
    pub lead_form_phrases: Vec<Regex>,
    pub category_keywords: Vec<CategoryKeywords>,
    pub location_nav_keywords: Vec<String>,
    pub location_paths: Vec<String>,
    pub home_visit_keywords: Vec<String>,
    pub wix_third_party_forms: Vec<String>,
    pub billing: BillingPhrases,
    pub email_exclusions: Vec<String>,
}

impl SignatureCatalog {
    /// Compile the catalog embedded in the binary
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(DEFAULT_CATALOG)
    }

    /// Compile a catalog from a JSON file on disk
    pub fn load_from_path(path: &Path) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(content)?;
        Self::compile(file)
    }

    fn compile(file: CatalogFile) -> Result<Self, CatalogError> {
        let mut url_signatures = BTreeMap::new();
        for (category, tools) in file.url_signatures {
            url_signatures.insert(category, compile_tools("url_signatures", category, tools)?);
        }

        let mut text_phrases = BTreeMap::new();
        for (category, tools) in file.text_phrases {
            let mut compiled = Vec::with_capacity(tools.len());
            for entry in tools {
                if entry.tool.trim().is_empty() {
                    return Err(CatalogError::EmptyTool { table: "text_phrases".to_string() });
                }
                let phrases = entry
                    .patterns
                    .iter()
                    .map(|p| compile_phrase("text_phrases", p))
                    .collect::<Result<Vec<_>, _>>()?;
                compiled.push(PhraseSignature { tool: entry.tool, phrases });
            }
            text_phrases.insert(category, compiled);
        }

        let billing = BillingPhrases {
            bulk_billed: compile_phrases("billing_phrases.bulk_billed", &file.billing_phrases.bulk_billed)?,
            mixed: compile_phrases("billing_phrases.mixed", &file.billing_phrases.mixed)?,
            private: compile_phrases("billing_phrases.private", &file.billing_phrases.private)?,
        };

        Ok(Self {
            version: file.version,
            url_signatures,
            text_phrases,
            header_signatures: compile_tools("header_signatures", Category::Infra, file.header_signatures)?,
            network_watch: keyed(file.network_watch),
            cookie_signatures: file
                .cookie_signatures
                .into_iter()
                // Cookie names are case-sensitive
                .map(|h| KeyedSignature { key: h.pattern, category: h.category, tool: h.tool })
                .collect(),
            framework_cookies: file
                .framework_cookies
                .into_iter()
                .map(|h| KeyedSignature { key: h.pattern, category: h.category, tool: h.tool })
                .collect(),
            csp_signatures: keyed(file.csp_signatures),
            meta_generator: keyed(file.meta_generator),
            robots_signatures: keyed(file.robots_signatures),
            wordpress_plugins: compile_tools("wordpress_plugins", Category::Forms, file.wordpress_plugins)?,
            priority: file.priority,
            dedup_rules: file.dedup_rules,
            co_occurrence_rules: file.co_occurrence_rules,
            booking_is_also_pms: file.booking_is_also_pms.into_iter().collect(),
            booking_vendor_domains: lowercase_all(file.booking_vendor_domains),
            booking_vendor_names: vendor_names(file.booking_vendor_names),
            booking_link_keywords: lowercase_all(file.booking_link_keywords),
            lead_form_vendors: vendor_names(file.lead_form_vendors),
            lead_form_phrases: compile_phrases("lead_form_phrases", &file.lead_form_phrases)?,
            category_keywords: file
                .category_keywords
                .into_iter()
                .map(|c| CategoryKeywords { category: c.category, keywords: lowercase_all(c.keywords) })
                .collect(),
            location_nav_keywords: lowercase_all(file.location_nav_keywords),
            location_paths: file.location_paths,
            home_visit_keywords: lowercase_all(file.home_visit_keywords),
            wix_third_party_forms: lowercase_all(file.wix_third_party_forms),
            billing,
            email_exclusions: lowercase_all(file.email_exclusions),
        })
    }

    /// Position of `tool` in the category's priority table (higher = preferred)
    pub fn priority_index(&self, category: Category, tool: &str) -> Option<usize> {
        self.priority
            .get(&category)
            .and_then(|list| list.iter().position(|t| t == tool))
    }

    /// Tools that serve as both booking surface and practice-management system
    pub fn is_dual_role(&self, tool: &str) -> bool {
        self.booking_is_also_pms.contains(tool)
    }

    /// Display name for a booking vendor domain; falls back to the domain
    pub fn booking_vendor_name(&self, domain: &str) -> String {
        let domain = domain.to_lowercase();
        self.booking_vendor_names
            .iter()
            .find(|v| domain.contains(&v.domain))
            .map(|v| v.name.clone())
            .unwrap_or(domain)
    }

    /// First known booking vendor domain contained in `text`
    pub fn find_booking_vendor(&self, text: &str) -> Option<&str> {
        let lower = text.to_lowercase();
        self.booking_vendor_domains
            .iter()
            .find(|d| lower.contains(d.as_str()))
            .map(|d| d.as_str())
    }

    /// Every tool name the catalog can emit for a category
    pub fn known_tools(&self, category: Category) -> BTreeSet<String> {
        let mut tools = BTreeSet::new();
        let keyed_tables = [
            &self.network_watch,
            &self.cookie_signatures,
            &self.framework_cookies,
            &self.csp_signatures,
            &self.meta_generator,
            &self.robots_signatures,
        ];
        if let Some(list) = self.url_signatures.get(&category) {
            tools.extend(list.iter().map(|t| t.tool.clone()));
        }
        if let Some(list) = self.text_phrases.get(&category) {
            tools.extend(list.iter().map(|t| t.tool.clone()));
        }
        for table in keyed_tables {
            tools.extend(table.iter().filter(|k| k.category == category).map(|k| k.tool.clone()));
        }
        match category {
            Category::Infra => tools.extend(self.header_signatures.iter().map(|t| t.tool.clone())),
            Category::Forms => {
                tools.extend(self.wordpress_plugins.iter().map(|t| t.tool.clone()));
                tools.insert(WIX_NATIVE_FORMS.to_string());
            }
            _ => {}
        }
        for rule in &self.co_occurrence_rules {
            if rule.infer_category == category {
                tools.insert(rule.inferred.clone());
            }
        }
        for rule in &self.dedup_rules {
            if rule.category == category {
                tools.insert(rule.keep.clone());
            }
        }
        tools
    }
}

/// Forms entry added for Wix sites without a third-party form tool
pub const WIX_NATIVE_FORMS: &str = "Wix Forms (native)";

fn compile_tools(
    table: &str,
    category: Category,
    tools: Vec<ToolPatterns>,
) -> Result<Vec<ToolSignature>, CatalogError> {
    let mut seen = BTreeSet::new();
    let mut compiled = Vec::with_capacity(tools.len());
    for entry in tools {
        if entry.tool.trim().is_empty() {
            return Err(CatalogError::EmptyTool { table: table.to_string() });
        }
        if !seen.insert(entry.tool.clone()) {
            return Err(CatalogError::DuplicateTool {
                table: table.to_string(),
                category,
                tool: entry.tool,
            });
        }
        compiled.push(ToolSignature {
            tool: entry.tool,
            patterns: lowercase_all(entry.patterns),
        });
    }
    Ok(compiled)
}

fn compile_phrase(table: &str, pattern: &str) -> Result<Regex, CatalogError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| CatalogError::InvalidPhrase {
            table: table.to_string(),
            pattern: pattern.to_string(),
            error: e.to_string(),
        })
}

fn compile_phrases(table: &str, patterns: &[String]) -> Result<Vec<Regex>, CatalogError> {
    patterns.iter().map(|p| compile_phrase(table, p)).collect()
}

fn keyed(entries: Vec<PatternHit>) -> Vec<KeyedSignature> {
    entries
        .into_iter()
        .map(|h| KeyedSignature {
            key: h.pattern.to_lowercase(),
            category: h.category,
            tool: h.tool,
        })
        .collect()
}

fn vendor_names(entries: Vec<DomainName>) -> Vec<VendorName> {
    entries
        .into_iter()
        .map(|d| VendorName { domain: d.domain.to_lowercase(), name: d.name })
        .collect()
}

fn lowercase_all(values: Vec<String>) -> Vec<String> {
    values.into_iter().map(|v| v.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_compiles() {
        let catalog = SignatureCatalog::builtin();
        assert!(catalog.is_ok(), "Builtin catalog should compile: {:?}", catalog.err());
    }

    #[test]
    fn test_builtin_catalog_covers_every_category() {
        let catalog = SignatureCatalog::builtin().unwrap();
        for category in Category::ALL {
            assert!(
                catalog.url_signatures.contains_key(&category),
                "Missing URL signatures for {}",
                category
            );
        }
    }

    #[test]
    fn test_category_serde_names() {
        let parsed: Category = serde_json::from_str("\"live_chat\"").unwrap();
        assert_eq!(parsed, Category::LiveChat);
        assert_eq!(Category::PmsEhr.to_string(), "pms_ehr");
        assert_eq!("infra".parse::<Category>().unwrap(), Category::Infra);
        assert!("email".parse::<Category>().is_err());
    }

    #[test]
    fn test_booking_column_renamed() {
        assert_eq!(Category::Booking.column_name(), "booking_tools");
        assert_eq!(Category::Cms.column_name(), "cms");
    }

    #[test]
    fn test_priority_index_prefers_later_entries() {
        let catalog = SignatureCatalog::builtin().unwrap();
        let wp = catalog.priority_index(Category::Cms, "WordPress").unwrap();
        let wix = catalog.priority_index(Category::Cms, "Wix").unwrap();
        assert!(wp > wix);
        assert_eq!(catalog.priority_index(Category::Pixels, "Meta Pixel"), None);
    }

    #[test]
    fn test_booking_vendor_name_mapping() {
        let catalog = SignatureCatalog::builtin().unwrap();
        assert_eq!(catalog.booking_vendor_name("secure.cliniko.com"), "Cliniko");
        assert_eq!(catalog.booking_vendor_name("centaurportal.com"), "D4W eAppointments");
        assert_eq!(catalog.booking_vendor_name("unknown-vendor.io"), "unknown-vendor.io");
    }

    #[test]
    fn test_dual_role_tools() {
        let catalog = SignatureCatalog::builtin().unwrap();
        assert!(catalog.is_dual_role("Cliniko"));
        assert!(!catalog.is_dual_role("HotDoc"));
    }

    #[test]
    fn test_invalid_phrase_rejected() {
        let mut value: serde_json::Value = serde_json::from_str(DEFAULT_CATALOG).unwrap();
        value["lead_form_phrases"] = serde_json::json!(["(unclosed"]);
        let result = SignatureCatalog::from_json(&value.to_string());
        assert!(matches!(result, Err(CatalogError::InvalidPhrase { .. })));
    }

    #[test]
    fn test_duplicate_tool_rejected() {
        let mut value: serde_json::Value = serde_json::from_str(DEFAULT_CATALOG).unwrap();
        value["url_signatures"]["cms"] = serde_json::json!([
            {"tool": "WordPress", "patterns": ["wp-content"]},
            {"tool": "WordPress", "patterns": ["wp-includes"]}
        ]);
        let result = SignatureCatalog::from_json(&value.to_string());
        assert!(matches!(result, Err(CatalogError::DuplicateTool { .. })));
    }

    #[test]
    fn test_known_tools_include_inferred_values() {
        let catalog = SignatureCatalog::builtin().unwrap();
        let telehealth = catalog.known_tools(Category::Telehealth);
        assert!(telehealth.contains("HotDoc (inferred)"));
        assert!(catalog.known_tools(Category::Forms).contains(WIX_NATIVE_FORMS));
    }
}
