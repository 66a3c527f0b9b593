use crate::catalog::{Category, NOT_DETECTED};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Vendor shown for an in-site booking surface with no named vendor
pub const IN_HOUSE_VENDOR: &str = "In-house";
/// Vendor shown for a lead form with no known form vendor
pub const WEBSITE_FORM_VENDOR: &str = "Website form";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookingType {
    Embedded,
    ExternalVendor,
    LeadForm,
    #[default]
    NotDetected,
}

impl BookingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingType::Embedded => "embedded",
            BookingType::ExternalVendor => "external_vendor",
            BookingType::LeadForm => "lead_form",
            BookingType::NotDetected => NOT_DETECTED,
        }
    }
}

impl fmt::Display for BookingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "embedded" => Ok(BookingType::Embedded),
            "external_vendor" => Ok(BookingType::ExternalVendor),
            "lead_form" => Ok(BookingType::LeadForm),
            "not_detected" | "" => Ok(BookingType::NotDetected),
            other => Err(format!("unknown booking type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BillingType {
    BulkBilled,
    Mixed,
    Private,
    #[default]
    NotDetected,
}

impl BillingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingType::BulkBilled => "bulk_billed",
            BillingType::Mixed => "mixed",
            BillingType::Private => "private",
            BillingType::NotDetected => NOT_DETECTED,
        }
    }
}

impl fmt::Display for BillingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub postcode: String,
    pub country: String,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self.street.is_empty()
            && self.city.is_empty()
            && self.state.is_empty()
            && self.postcode.is_empty()
            && self.country.is_empty()
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// One scanned site: the unit of output and of persistence
#[derive(Debug, Clone, PartialEq)]
pub struct QualificationRecord {
    pub url: String,
    pub clinic_name: String,
    pub primary_category: String,
    pub category_confidence: f64,
    pub multi_location: bool,
    pub location_count: u32,
    pub location_method: String,
    pub email_provider: String,
    /// Resolved tools per category, most significant first
    tools: BTreeMap<Category, Vec<String>>,
    pub booking_type: BookingType,
    pub booking_vendor: String,
    pub booking_url: String,
    pub address: Address,
    pub phones: Vec<String>,
    pub emails: Vec<String>,
    pub practitioner_count: u32,
    pub home_visits: bool,
    pub billing_type: BillingType,
    pub instagram: bool,
    pub whatsapp: bool,
    pub scraping_date: String,
    pub error: Option<String>,
}

impl QualificationRecord {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            clinic_name: String::new(),
            primary_category: NOT_DETECTED.to_string(),
            category_confidence: 0.0,
            multi_location: false,
            location_count: 1,
            location_method: "none".to_string(),
            email_provider: NOT_DETECTED.to_string(),
            tools: BTreeMap::new(),
            booking_type: BookingType::NotDetected,
            booking_vendor: String::new(),
            booking_url: String::new(),
            address: Address::default(),
            phones: Vec::new(),
            emails: Vec::new(),
            practitioner_count: 0,
            home_visits: false,
            billing_type: BillingType::NotDetected,
            instagram: false,
            whatsapp: false,
            scraping_date: String::new(),
            error: None,
        }
    }

    /// A record for a site that failed before any evidence was gathered
    pub fn failed(url: &str, error: impl Into<String>) -> Self {
        let mut record = Self::new(url);
        record.error = Some(error.into());
        record
    }

    pub fn tools(&self, category: Category) -> &[String] {
        self.tools.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_tools(&self, category: Category) -> bool {
        !self.tools(category).is_empty()
    }

    /// Replace a category's tools. Blank names and repeats are dropped,
    /// first occurrence wins.
    pub fn set_tools(&mut self, category: Category, tools: Vec<String>) {
        let mut clean: Vec<String> = Vec::with_capacity(tools.len());
        for tool in tools {
            let tool = tool.trim().to_string();
            if !tool.is_empty() && !clean.contains(&tool) {
                clean.push(tool);
            }
        }
        if clean.is_empty() {
            self.tools.remove(&category);
        } else {
            self.tools.insert(category, clean);
        }
    }

    /// Append a tool unless already present; returns whether it was added
    pub fn add_tool(&mut self, category: Category, tool: &str) -> bool {
        let tool = tool.trim();
        if tool.is_empty() {
            return false;
        }
        let list = self.tools.entry(category).or_default();
        if list.iter().any(|t| t == tool) {
            return false;
        }
        list.push(tool.to_string());
        true
    }

    /// The category's sheet value: `not_detected` or a comma-joined list
    pub fn category_value(&self, category: Category) -> String {
        let tools = self.tools(category);
        if tools.is_empty() {
            NOT_DETECTED.to_string()
        } else {
            tools.join(", ")
        }
    }

    /// True for an empty vendor or one of the generic placeholders
    pub fn booking_vendor_is_placeholder(&self) -> bool {
        let vendor = self.booking_vendor.trim();
        vendor.is_empty() || vendor == IN_HOUSE_VENDOR || vendor == WEBSITE_FORM_VENDOR || vendor == NOT_DETECTED
    }

    /// Sheet column headers, in row order
    pub fn sheet_headers() -> Vec<String> {
        let mut headers: Vec<String> = [
            "website_url",
            "clinic_name",
            "clinic_category",
            "category_confidence",
            "multi_location",
            "location_count",
            "location_method",
            "email_provider",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        headers.extend(Category::ALL.iter().map(|c| c.column_name().to_string()));
        headers.extend(
            [
                "booking_type",
                "booking_vendor",
                "street",
                "city",
                "state",
                "postcode",
                "country",
                "phones",
                "emails",
                "practitioner_count",
                "home_visits",
                "billing_type",
                "instagram",
                "whatsapp",
                SCRAPING_DATE_COLUMN,
                "error_log",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        headers
    }

    /// Row values matching [`sheet_headers`](Self::sheet_headers)
    pub fn to_row(&self) -> Vec<String> {
        let mut row = vec![
            self.url.clone(),
            self.clinic_name.clone(),
            self.primary_category.clone(),
            format!("{:.1}", self.category_confidence),
            yes_no(self.multi_location).to_string(),
            self.location_count.to_string(),
            self.location_method.clone(),
            self.email_provider.clone(),
        ];
        row.extend(Category::ALL.iter().map(|c| self.category_value(*c)));

        let vendor = if self.booking_vendor.is_empty() {
            NOT_DETECTED.to_string()
        } else {
            self.booking_vendor.clone()
        };
        row.extend([
            self.booking_type.to_string(),
            vendor,
            self.address.street.clone(),
            self.address.city.clone(),
            self.address.state.clone(),
            self.address.postcode.clone(),
            self.address.country.clone(),
            self.phones.join(", "),
            self.emails.join(", "),
            self.practitioner_count.to_string(),
            yes_no(self.home_visits).to_string(),
            self.billing_type.to_string(),
            yes_no(self.instagram).to_string(),
            yes_no(self.whatsapp).to_string(),
            self.scraping_date.clone(),
            self.error.clone().unwrap_or_default(),
        ]);
        row
    }
}

/// Resume column: rows with a value here are skipped
pub const SCRAPING_DATE_COLUMN: &str = "scraping_date";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_matches_headers() {
        let record = QualificationRecord::new("https://clinic.test/");
        assert_eq!(record.to_row().len(), QualificationRecord::sheet_headers().len());
    }

    #[test]
    fn test_category_value() {
        let mut record = QualificationRecord::new("https://clinic.test/");
        assert_eq!(record.category_value(Category::Cms), NOT_DETECTED);
        record.set_tools(
            Category::Cms,
            vec!["WordPress".into(), " ".into(), "Wix".into(), "WordPress".into()],
        );
        assert_eq!(record.category_value(Category::Cms), "WordPress, Wix");
        record.set_tools(Category::Cms, Vec::new());
        assert!(!record.has_tools(Category::Cms));
    }

    #[test]
    fn test_add_tool_skips_duplicates() {
        let mut record = QualificationRecord::new("https://clinic.test/");
        assert!(record.add_tool(Category::Pixels, "Meta Pixel"));
        assert!(!record.add_tool(Category::Pixels, "Meta Pixel"));
        assert!(!record.add_tool(Category::Pixels, ""));
        assert_eq!(record.tools(Category::Pixels).len(), 1);
    }

    #[test]
    fn test_row_rendering() {
        let mut record = QualificationRecord::new("https://clinic.test/");
        record.category_confidence = 52.63;
        record.instagram = true;
        record.emails = vec!["a@clinic.test".into(), "b@clinic.test".into()];
        record.error = Some("Timeout loading homepage".into());

        let headers = QualificationRecord::sheet_headers();
        let row = record.to_row();
        let cell = |name: &str| row[headers.iter().position(|h| h == name).unwrap()].clone();

        assert_eq!(cell("category_confidence"), "52.6");
        assert_eq!(cell("instagram"), "yes");
        assert_eq!(cell("whatsapp"), "no");
        assert_eq!(cell("booking_vendor"), NOT_DETECTED);
        assert_eq!(cell("booking_tools"), NOT_DETECTED);
        assert_eq!(cell("emails"), "a@clinic.test, b@clinic.test");
        assert_eq!(cell("error_log"), "Timeout loading homepage");
    }

    #[test]
    fn test_booking_type_round_trip_names() {
        for t in [
            BookingType::Embedded,
            BookingType::ExternalVendor,
            BookingType::LeadForm,
            BookingType::NotDetected,
        ] {
            assert_eq!(t.as_str().parse::<BookingType>().unwrap(), t);
        }
        assert!("calendar".parse::<BookingType>().is_err());
    }
}
