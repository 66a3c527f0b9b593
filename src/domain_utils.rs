use url::Url;

/// Compound public suffixes that need three labels for the apex
const COMPOUND_TLDS: &[&str] = &[
    "com.au", "net.au", "org.au", "edu.au", "gov.au", "asn.au", "id.au",
    "co.nz", "org.nz", "co.uk", "org.uk", "co.jp", "co.kr", "com.br", "com.mx", "com.cn",
];

/// Normalize a raw spreadsheet cell into an absolute http(s) URL.
///
/// Bare hosts (`myclinic.com.au`) get an `https://` scheme. Returns `None`
/// for blank cells and values that do not parse to a URL with a host.
pub fn normalize_site_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let candidate = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&candidate).ok()?;
    parsed.host_str()?;
    Some(parsed.to_string())
}

/// Lowercased host of `url` with any leading `www.` removed
pub fn site_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

/// `scheme://host[:port]` of a URL, without a trailing slash
pub fn base_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

/// Path component of a URL, `/` when absent
pub fn url_path(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| "/".to_string())
}

/// Resolve `href` against the page it was found on
pub fn resolve_href(page_url: &str, href: &str) -> Option<String> {
    let base = Url::parse(page_url).ok()?;
    base.join(href.trim()).ok().map(|u| u.to_string())
}

/// Extract the organizational domain (e.g. `myclinic.com.au` from
/// `bookings.myclinic.com.au`)
pub fn organizational_domain(host: &str) -> String {
    let host = host.to_lowercase();
    let parts: Vec<&str> = host.split('.').collect();

    if parts.len() <= 2 {
        return host;
    }

    let last_two = format!("{}.{}", parts[parts.len() - 2], parts[parts.len() - 1]);
    if COMPOUND_TLDS.contains(&last_two.as_str()) {
        if parts.len() > 3 {
            format!("{}.{}", parts[parts.len() - 3], last_two)
        } else {
            host
        }
    } else {
        last_two
    }
}

/// True when `host` is a subdomain of the clinic's organizational domain
/// but not the clinic's own host (e.g. `book.myclinic.com.au`).
pub fn is_own_subdomain(host: &str, clinic_host: &str) -> bool {
    let host = host.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host == clinic_host {
        return false;
    }
    let root = organizational_domain(clinic_host);
    host.ends_with(&format!(".{}", root))
}

/// True when `host` is the clinic's host (ignoring `www.`)
pub fn is_same_host(host: &str, clinic_host: &str) -> bool {
    let host = host.to_lowercase();
    host.strip_prefix("www.").unwrap_or(&host) == clinic_host
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_site_url() {
        assert_eq!(
            normalize_site_url("myclinic.com.au").as_deref(),
            Some("https://myclinic.com.au/")
        );
        assert_eq!(
            normalize_site_url("  http://clinic.test/home ").as_deref(),
            Some("http://clinic.test/home")
        );
        assert_eq!(normalize_site_url(""), None);
        assert_eq!(normalize_site_url("   "), None);
    }

    #[test]
    fn test_site_host_strips_www() {
        assert_eq!(site_host("https://www.MyClinic.com.au/about").as_deref(), Some("myclinic.com.au"));
        assert_eq!(site_host("not a url"), None);
    }

    #[test]
    fn test_base_url_keeps_port() {
        assert_eq!(base_url("http://127.0.0.1:8080/a/b").as_deref(), Some("http://127.0.0.1:8080"));
        assert_eq!(base_url("https://clinic.test/x?y=1").as_deref(), Some("https://clinic.test"));
    }

    /// Regression test: compound TLDs are handled correctly
    #[test]
    fn test_compound_tld_handling() {
        assert_eq!(organizational_domain("book.myclinic.com.au"), "myclinic.com.au");
        assert_eq!(organizational_domain("myclinic.com.au"), "myclinic.com.au");
        assert_eq!(organizational_domain("api.company.co.uk"), "company.co.uk");
        assert_eq!(organizational_domain("secure.cliniko.com"), "cliniko.com");
    }

    #[test]
    fn test_own_subdomain_detection() {
        assert!(is_own_subdomain("book.myclinic.com.au", "myclinic.com.au"));
        assert!(!is_own_subdomain("www.myclinic.com.au", "myclinic.com.au"));
        assert!(!is_own_subdomain("myclinic.com.au", "myclinic.com.au"));
        // A sibling site under the same public suffix is not ours
        assert!(!is_own_subdomain("otherclinic.com.au", "myclinic.com.au"));
        assert!(!is_own_subdomain("secure.cliniko.com", "myclinic.com.au"));
    }

    #[test]
    fn test_resolve_href() {
        assert_eq!(
            resolve_href("https://clinic.test/about/", "../book").as_deref(),
            Some("https://clinic.test/book")
        );
        assert_eq!(
            resolve_href("https://clinic.test/", "https://cliniko.com/x").as_deref(),
            Some("https://cliniko.com/x")
        );
    }

    #[test]
    fn test_url_path() {
        assert_eq!(url_path("https://clinic.test"), "/");
        assert_eq!(url_path("https://clinic.test/locations"), "/locations");
    }
}
