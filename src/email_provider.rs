//! Email-provider classification from MX records and published addresses.

use crate::catalog::NOT_DETECTED;
use anyhow::Result;
use futures::future::BoxFuture;
use hickory_resolver::TokioAsyncResolver;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

/// MX records exist but none belongs to a known provider
pub const PRIVATE_EMAIL: &str = "privateemail";

const GMAIL_DIRECT: &str = "Gmail (direct)";
const GOOGLE_WORKSPACE: &str = "Google Workspace";

static CPANEL_MX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^mail\.").unwrap());

/// Provider display name and the MX host fragments that identify it
const MX_PROVIDERS: &[(&str, &[&str])] = &[
    ("Microsoft 365", &["outlook.com", "protection.outlook.com", "office365"]),
    ("Proofpoint", &["pphosted.com"]),
    ("Mimecast", &["mimecast.com"]),
    ("Zoho", &["zoho.com", "zohomail"]),
    ("GoDaddy", &["secureserver.net", "godaddy.com"]),
    ("Fastmail", &["fastmail"]),
    ("Namecheap", &["privateemail.com"]),
    ("Mailgun", &["mailgun.org"]),
    ("SendGrid", &["sendgrid.net"]),
    ("Amazon SES", &["amazonaws.com", "amazonses.com"]),
    ("iCloud", &["icloud.com", "apple.com"]),
    ("Yahoo", &["yahoodns.net", "yahoo.com"]),
    ("VentraIP", &["ventraip", "synergywholesale", "vendorinternet", "cpanelemailer", "mxroute"]),
    ("Crazy Domains", &["crazydomains"]),
    ("NetRegistry", &["netregistry"]),
];

/// Looks up MX exchange hosts for a domain
pub trait MxResolver: Send + Sync {
    /// Lowercased exchange hosts without the trailing dot
    fn lookup_mx<'a>(&'a self, domain: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;
}

/// MX lookups through the system resolver configuration
pub struct SystemMxResolver {
    resolver: TokioAsyncResolver,
}

impl SystemMxResolver {
    pub fn from_system_conf() -> Result<Self> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()?;
        Ok(Self { resolver })
    }
}

impl MxResolver for SystemMxResolver {
    fn lookup_mx<'a>(&'a self, domain: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let lookup = self.resolver.mx_lookup(domain).await?;
            Ok(lookup
                .iter()
                .map(|mx| mx.exchange().to_utf8().trim_end_matches('.').to_lowercase())
                .collect())
        })
    }
}

/// Fixed MX answers; unknown domains fail the lookup
#[derive(Debug, Clone, Default)]
pub struct StaticMxResolver {
    records: HashMap<String, Vec<String>>,
}

impl StaticMxResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, domain: &str, exchanges: &[&str]) -> Self {
        self.records.insert(
            domain.to_lowercase(),
            exchanges.iter().map(|e| e.to_lowercase()).collect(),
        );
        self
    }
}

impl MxResolver for StaticMxResolver {
    fn lookup_mx<'a>(&'a self, domain: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        let answer = self
            .records
            .get(&domain.to_lowercase())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no MX records for {}", domain));
        Box::pin(async move { answer })
    }
}

/// Comma-joined providers for a set of MX exchange hosts.
/// No known provider yields [`PRIVATE_EMAIL`].
pub fn classify_mx(records: &[String]) -> String {
    let mut providers: Vec<&str> = Vec::new();

    if records.iter().any(|r| r.contains("google") || r.contains("googlemail")) {
        if records.iter().any(|r| r.contains("aspmx")) {
            providers.push(GOOGLE_WORKSPACE);
        } else {
            providers.push("Gmail");
        }
    }

    for (name, fragments) in MX_PROVIDERS {
        if records.iter().any(|r| fragments.iter().any(|f| r.contains(f))) {
            providers.push(*name);
        }
    }

    let cpanel = records.iter().any(|r| {
        !r.contains(".mail.protection.outlook.com")
            && !r.contains("google")
            && !r.contains("microsoft")
            && CPANEL_MX.is_match(r)
    });
    if cpanel {
        providers.push("cPanel/Shared Hosting");
    }

    if providers.is_empty() {
        PRIVATE_EMAIL.to_string()
    } else {
        providers.join(", ")
    }
}

/// Provider of the first consumer mailbox among the site's addresses
pub fn provider_from_addresses(emails: &[String]) -> Option<&'static str> {
    emails.iter().find_map(|email| {
        let domain = email.rsplit('@').next().unwrap_or_default().to_lowercase();
        match domain.as_str() {
            "gmail.com" => Some(GMAIL_DIRECT),
            "outlook.com" | "hotmail.com" | "live.com" => Some("Microsoft Personal"),
            "yahoo.com" => Some("Yahoo (direct)"),
            "icloud.com" => Some("iCloud (direct)"),
            _ => None,
        }
    })
}

/// Fold a consumer-mailbox provider into the MX classification.
/// A placeholder MX result is replaced; Gmail is dropped when Google
/// Workspace hosts the domain.
pub fn combine_providers(mx: &str, direct: Option<&str>) -> String {
    let mut combined = match direct {
        Some(direct) if mx.is_empty() || mx == NOT_DETECTED || mx == PRIVATE_EMAIL => direct.to_string(),
        Some(direct) if !mx.contains(direct) => format!("{}, {}", mx, direct),
        _ => mx.to_string(),
    };

    if combined.contains(GOOGLE_WORKSPACE) && combined.contains(GMAIL_DIRECT) {
        combined = combined
            .split(", ")
            .filter(|p| *p != GMAIL_DIRECT)
            .collect::<Vec<_>>()
            .join(", ");
    }
    combined
}

/// MX-based provider for a site host. Lookup failures are `not_detected`.
pub async fn lookup_provider(resolver: &dyn MxResolver, host: &str) -> String {
    let domain = host.trim().trim_start_matches("www.").to_lowercase();
    match resolver.lookup_mx(&domain).await {
        Ok(records) if !records.is_empty() => classify_mx(&records),
        Ok(_) => NOT_DETECTED.to_string(),
        Err(e) => {
            debug!("MX lookup failed for {}: {}", domain, e);
            NOT_DETECTED.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mx(records: &[&str]) -> String {
        classify_mx(&records.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn test_google_workspace_vs_gmail() {
        assert_eq!(mx(&["aspmx.l.google.com", "alt1.aspmx.l.google.com"]), "Google Workspace");
        assert_eq!(mx(&["gmail-smtp-in.l.google.com"]), "Gmail");
    }

    #[test]
    fn test_multiple_providers() {
        assert_eq!(
            mx(&["clinic-com-au.mail.protection.outlook.com", "mx1-au.pphosted.com"]),
            "Microsoft 365, Proofpoint"
        );
    }

    #[test]
    fn test_cpanel_and_private() {
        assert_eq!(mx(&["mail.smileclinic.com.au"]), "cPanel/Shared Hosting");
        assert_eq!(mx(&["mx.obscurehost.net"]), PRIVATE_EMAIL);
    }

    #[test]
    fn test_direct_address_providers() {
        let emails = vec!["info@clinic.com.au".to_string(), "clinic@gmail.com".to_string()];
        assert_eq!(provider_from_addresses(&emails), Some("Gmail (direct)"));
        assert_eq!(provider_from_addresses(&["x@hotmail.com".to_string()]), Some("Microsoft Personal"));
        assert_eq!(provider_from_addresses(&["x@clinic.com.au".to_string()]), None);
    }

    #[test]
    fn test_combine_providers() {
        assert_eq!(combine_providers(PRIVATE_EMAIL, Some("Gmail (direct)")), "Gmail (direct)");
        assert_eq!(combine_providers("Microsoft 365", Some("Gmail (direct)")), "Microsoft 365, Gmail (direct)");
        assert_eq!(combine_providers("Google Workspace", Some("Gmail (direct)")), "Google Workspace");
        assert_eq!(combine_providers("Zoho", None), "Zoho");
    }

    #[tokio::test]
    async fn test_lookup_provider() {
        let resolver = StaticMxResolver::new().with("clinic.com.au", &["aspmx.l.google.com"]);
        assert_eq!(lookup_provider(&resolver, "www.clinic.com.au").await, "Google Workspace");
        assert_eq!(lookup_provider(&resolver, "missing.com.au").await, NOT_DETECTED);
    }
}
