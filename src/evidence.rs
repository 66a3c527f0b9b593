//! Evidence model shared by collectors, classifiers and resolution.
//!
//! A [`Hit`] is one `(category, tool)` observation. Collectors return
//! [`HitSet`]s, which only ever grow while a site is being scanned. An
//! [`EvidenceBundle`] is everything observed on a single page load.

use crate::catalog::Category;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, BTreeSet};

// Safety: selector strings are literals and always parse.
static SCRIPT_SRC_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("script[src]").unwrap());
static IFRAME_SRC_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("iframe[src]").unwrap());
static HREF_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("link[href], a[href]").unwrap());
static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static NAV_ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("nav a, header a, [class*='menu'] a, [class*='nav'] a").unwrap()
});
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static META_DESCRIPTION_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[name='description']").unwrap());
static META_GENERATOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[name='generator' i]").unwrap());
static H1_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());

/// A single `(category, tool)` observation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hit {
    pub category: Category,
    pub tool: String,
}

impl Hit {
    pub fn new(category: Category, tool: impl Into<String>) -> Self {
        Self { category, tool: tool.into() }
    }
}

/// Category → set of tool names. Ordered, so iteration is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HitSet {
    hits: BTreeMap<Category, BTreeSet<String>>,
}

impl HitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a hit; returns false if it was already present
    pub fn insert(&mut self, category: Category, tool: impl Into<String>) -> bool {
        self.hits.entry(category).or_default().insert(tool.into())
    }

    pub fn merge(&mut self, other: &HitSet) {
        for (category, tools) in &other.hits {
            self.hits.entry(*category).or_default().extend(tools.iter().cloned());
        }
    }

    pub fn contains(&self, category: Category, tool: &str) -> bool {
        self.hits.get(&category).map_or(false, |tools| tools.contains(tool))
    }

    pub fn get(&self, category: Category) -> Option<&BTreeSet<String>> {
        self.hits.get(&category).filter(|tools| !tools.is_empty())
    }

    pub fn has_any(&self, category: Category) -> bool {
        self.get(category).is_some()
    }

    /// Remove a hit. Only site-level guards use this; collectors never do.
    pub fn remove(&mut self, category: Category, tool: &str) -> bool {
        let removed = self
            .hits
            .get_mut(&category)
            .map_or(false, |tools| tools.remove(tool));
        if self.hits.get(&category).map_or(false, |tools| tools.is_empty()) {
            self.hits.remove(&category);
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.hits.values().all(|tools| tools.is_empty())
    }

    pub fn len(&self) -> usize {
        self.hits.values().map(|tools| tools.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = Hit> + '_ {
        self.hits
            .iter()
            .flat_map(|(category, tools)| tools.iter().map(move |tool| Hit::new(*category, tool.clone())))
    }
}

impl Extend<Hit> for HitSet {
    fn extend<T: IntoIterator<Item = Hit>>(&mut self, iter: T) {
        for hit in iter {
            self.insert(hit.category, hit.tool);
        }
    }
}

impl FromIterator<Hit> for HitSet {
    fn from_iter<T: IntoIterator<Item = Hit>>(iter: T) -> Self {
        let mut set = HitSet::new();
        set.extend(iter);
        set
    }
}

/// Response headers of a page, names lowercased
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    entries: Vec<(String, String)>,
}

impl ResponseHeaders {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into().to_lowercase(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Enforced or report-only CSP value
    pub fn content_security_policy(&self) -> Option<&str> {
        self.get("content-security-policy")
            .or_else(|| self.get("content-security-policy-report-only"))
    }

    /// All headers as lowercased `name:value` pairs joined by spaces
    pub fn joined_lowercase(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Link text and target as found in the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub text: String,
    pub href: String,
}

/// Everything observed on one page load
#[derive(Debug, Clone, Default)]
pub struct EvidenceBundle {
    /// URL that was requested
    pub url: String,
    /// URL after redirects
    pub final_url: String,
    pub html: String,
    pub visible_text: String,
    pub script_srcs: Vec<String>,
    pub iframe_srcs: Vec<String>,
    /// `link[href]` and `a[href]`, relative and absolute, minus `#`,
    /// `mailto:`, `tel:` and `javascript:`
    pub link_hrefs: Vec<String>,
    pub anchors: Vec<Anchor>,
    pub nav_anchors: Vec<Anchor>,
    pub title: String,
    pub meta_description: String,
    /// `<meta name="generator">` content, lowercased
    pub generator: String,
    pub h1: String,
    pub headers: Option<ResponseHeaders>,
    pub cookies: Vec<String>,
    pub requests: Vec<String>,
}

impl EvidenceBundle {
    /// Parse a rendered page. `visible_text` comes from the browser; when
    /// it is empty the text is recovered from the DOM.
    pub fn from_page(url: &str, final_url: &str, html: &str, visible_text: &str) -> Self {
        let document = Html::parse_document(html);

        let script_srcs = attribute_values(&document, &SCRIPT_SRC_SELECTOR, "src");
        let iframe_srcs = attribute_values(&document, &IFRAME_SRC_SELECTOR, "src");
        let link_hrefs = attribute_values(&document, &HREF_SELECTOR, "href")
            .into_iter()
            .filter(|h| is_navigable_href(h))
            .collect();

        let anchors = collect_anchors(&document, &ANCHOR_SELECTOR);
        let nav_anchors = collect_anchors(&document, &NAV_ANCHOR_SELECTOR);

        let title = document
            .select(&TITLE_SELECTOR)
            .next()
            .map(element_text)
            .unwrap_or_default();
        let meta_description = document
            .select(&META_DESCRIPTION_SELECTOR)
            .next()
            .and_then(|m| m.value().attr("content"))
            .map(|c| c.trim().to_string())
            .unwrap_or_default();
        let generator = document
            .select(&META_GENERATOR_SELECTOR)
            .next()
            .and_then(|m| m.value().attr("content"))
            .map(|c| c.trim().to_lowercase())
            .unwrap_or_default();
        let h1 = document
            .select(&H1_SELECTOR)
            .next()
            .map(element_text)
            .unwrap_or_default();

        let visible_text = if visible_text.trim().is_empty() {
            dom_visible_text(&document)
        } else {
            visible_text.to_string()
        };

        Self {
            url: url.to_string(),
            final_url: final_url.to_string(),
            html: html.to_string(),
            visible_text,
            script_srcs,
            iframe_srcs,
            link_hrefs,
            anchors,
            nav_anchors,
            title,
            meta_description,
            generator,
            h1,
            headers: None,
            cookies: Vec::new(),
            requests: Vec::new(),
        }
    }

    pub fn with_headers(mut self, headers: Option<ResponseHeaders>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_cookies(mut self, cookies: Vec<String>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn with_requests(mut self, requests: Vec<String>) -> Self {
        self.requests = requests;
        self
    }
}

fn is_navigable_href(href: &str) -> bool {
    let h = href.trim();
    !h.is_empty()
        && h != "#"
        && !h.starts_with("mailto:")
        && !h.starts_with("tel:")
        && !h.starts_with("javascript:")
}

fn attribute_values(document: &Html, selector: &Selector, attr: &str) -> Vec<String> {
    document
        .select(selector)
        .filter_map(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn collect_anchors(document: &Html, selector: &Selector) -> Vec<Anchor> {
    document
        .select(selector)
        .filter_map(|el| {
            let href = el.value().attr("href")?.trim().to_string();
            Some(Anchor { text: element_text(el), href })
        })
        .collect()
}

/// Whitespace-normalized text content of an element
pub fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(|t| t.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Body text without script, style and template contents
fn dom_visible_text(document: &Html) -> String {
    let Some(body) = document.select(&BODY_SELECTOR).next() else {
        return String::new();
    };

    let mut words: Vec<&str> = Vec::new();
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name().to_string()))
            .map_or(false, |name| matches!(name.as_str(), "script" | "style" | "noscript" | "template"));
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }
    words.join(" ")
}
