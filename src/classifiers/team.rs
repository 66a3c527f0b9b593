use crate::domain_utils;
use crate::evidence::EvidenceBundle;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

/// Link texts that lead to a team page, tried in order
const TEAM_LINK_TEXTS: &[&str] = &["team", "staff", "practitioners", "about us", "our team"];

static PRACTITIONER_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(Dr\.\s[A-Z][a-z]+|Physiotherapist|Osteopath|Podiatrist|Psychologist|Therapist|Practitioner)")
        .unwrap()
});

static TEAM_IMAGE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        r#"img[class*="team"], img[class*="staff"], img[class*="practitioner"], img[alt*="doctor"], img[alt*="dr"], img[src*="team"]"#,
    )
    .unwrap()
});

/// Absolute URL of the first link whose text names a team page
pub fn find_team_link(page: &EvidenceBundle) -> Option<String> {
    let base = if page.final_url.is_empty() { &page.url } else { &page.final_url };
    TEAM_LINK_TEXTS.iter().find_map(|wanted| {
        page.anchors
            .iter()
            .find(|a| !a.href.is_empty() && a.text.to_lowercase().contains(wanted))
            .and_then(|a| domain_utils::resolve_href(base, &a.href))
    })
}

/// Practitioner estimate for a page: half the practitioner titles
/// mentioned, or the number of team photos, whichever is larger
pub fn count_practitioners(html: &str) -> u32 {
    let titles = PRACTITIONER_TITLE.find_iter(html).count();
    let document = Html::parse_document(html);
    let images = document.select(&TEAM_IMAGE_SELECTOR).count();
    (titles / 2).max(images) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_team_link_prefers_team() {
        let page = EvidenceBundle::from_page(
            "https://clinic.test/",
            "https://clinic.test/",
            r#"<a href="/about">About Us</a><a href="/meet-the-team">Meet the Team</a>"#,
            "",
        );
        assert_eq!(find_team_link(&page).as_deref(), Some("https://clinic.test/meet-the-team"));
    }

    #[test]
    fn test_find_team_link_none() {
        let page = EvidenceBundle::from_page("https://clinic.test/", "https://clinic.test/", "<a href='/'>Home</a>", "");
        assert_eq!(find_team_link(&page), None);
    }

    #[test]
    fn test_count_titles_and_images() {
        let html = r#"<h3>Dr. Smith</h3><p>Physiotherapist</p><h3>Dr. Jones</h3><p>Osteopath</p>"#;
        assert_eq!(count_practitioners(html), 2);

        let html = r#"<img class="team-photo" src="a.jpg"><img class="team-photo" src="b.jpg">
                      <img alt="doctor lee" src="c.jpg"><p>Podiatrist</p>"#;
        assert_eq!(count_practitioners(html), 3);
    }

    #[test]
    fn test_count_empty_page() {
        assert_eq!(count_practitioners("<p>Welcome</p>"), 0);
    }
}
