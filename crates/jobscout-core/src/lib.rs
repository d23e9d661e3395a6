//! Core domain model for job acquisition: sources, raw records, outcomes, identities.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const CRATE_NAME: &str = "jobscout-core";

/// Currency assumed when a portal does not state one.
pub const DEFAULT_CURRENCY: &str = "INR";

/// One external job-listing portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    LinkedIn,
    Indeed,
    Naukri,
    HiringCafe,
    #[serde(alias = "angellist")]
    Wellfound,
    IimJobs,
}

impl Source {
    pub const ALL: [Source; 6] = [
        Source::LinkedIn,
        Source::Indeed,
        Source::Naukri,
        Source::HiringCafe,
        Source::Wellfound,
        Source::IimJobs,
    ];

    /// Stable lowercase key used in config files and content hashes.
    pub fn key(self) -> &'static str {
        match self {
            Source::LinkedIn => "linkedin",
            Source::Indeed => "indeed",
            Source::Naukri => "naukri",
            Source::HiringCafe => "hiringcafe",
            Source::Wellfound => "wellfound",
            Source::IimJobs => "iimjobs",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Source::LinkedIn => "LinkedIn",
            Source::Indeed => "Indeed",
            Source::Naukri => "Naukri",
            Source::HiringCafe => "HiringCafe",
            Source::Wellfound => "Wellfound",
            Source::IimJobs => "IIMJobs",
        }
    }

    pub fn default_currency(self) -> &'static str {
        match self {
            Source::Wellfound => "USD",
            _ => DEFAULT_CURRENCY,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown source `{0}`")]
pub struct UnknownSource(pub String);

impl FromStr for Source {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linkedin" => Ok(Source::LinkedIn),
            "indeed" => Ok(Source::Indeed),
            "naukri" => Ok(Source::Naukri),
            "hiringcafe" => Ok(Source::HiringCafe),
            "wellfound" | "angellist" => Ok(Source::Wellfound),
            "iimjobs" => Ok(Source::IimJobs),
            other => Err(UnknownSource(other.to_string())),
        }
    }
}

/// Normalized, source-agnostic job posting produced by every extractor.
///
/// `company` and `role` are guaranteed non-empty: the only constructor refuses
/// blank values, so extractors drop such fragments by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawJobRecord {
    pub source: Source,
    pub company: String,
    pub role: String,
    pub salary: Option<String>,
    pub salary_currency: String,
    pub location: String,
    pub description: String,
    pub apply_url: String,
    pub date_posted: Option<NaiveDate>,
}

impl RawJobRecord {
    pub fn new(
        source: Source,
        company: impl AsRef<str>,
        role: impl AsRef<str>,
        location: impl AsRef<str>,
        apply_url: impl Into<String>,
    ) -> Option<Self> {
        let company = collapse_whitespace(company.as_ref());
        let role = collapse_whitespace(role.as_ref());
        if company.is_empty() || role.is_empty() {
            return None;
        }
        Some(Self {
            source,
            company,
            role,
            salary: None,
            salary_currency: source.default_currency().to_string(),
            location: collapse_whitespace(location.as_ref()),
            description: String::new(),
            apply_url: apply_url.into(),
            date_posted: None,
        })
    }

    pub fn with_salary(mut self, salary: Option<String>) -> Self {
        self.salary = salary
            .map(|s| collapse_whitespace(&s))
            .filter(|s| !s.is_empty());
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.salary_currency = currency.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_date_posted(mut self, date_posted: Option<NaiveDate>) -> Self {
        self.date_posted = date_posted;
        self
    }

    /// Exact-duplicate key for in-batch dedup.
    pub fn batch_key(&self) -> (String, String, String) {
        (
            self.company.trim().to_lowercase(),
            self.role.trim().to_lowercase(),
            self.location.trim().to_lowercase(),
        )
    }
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortalStatus {
    Success,
    Failed,
}

impl fmt::Display for PortalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortalStatus::Success => f.write_str("success"),
            PortalStatus::Failed => f.write_str("failed"),
        }
    }
}

/// Final result of one source's task within one orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortalOutcome {
    pub status: PortalStatus,
    pub count: usize,
    pub elapsed_secs: f64,
}

impl PortalOutcome {
    pub fn success(count: usize, elapsed_secs: f64) -> Self {
        Self {
            status: PortalStatus::Success,
            count,
            elapsed_secs: round_tenths(elapsed_secs),
        }
    }

    pub fn failed(elapsed_secs: f64) -> Self {
        Self {
            status: PortalStatus::Failed,
            count: 0,
            elapsed_secs: round_tenths(elapsed_secs),
        }
    }
}

fn round_tenths(secs: f64) -> f64 {
    (secs * 10.0).round() / 10.0
}

/// Durable dedup key of a record once admitted to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredJobIdentity {
    pub job_id: String,
    pub normalized_company: String,
    pub role: String,
}

impl StoredJobIdentity {
    pub fn for_record(record: &RawJobRecord) -> Self {
        Self {
            job_id: job_id(record.source, &record.company, &record.role, &record.location),
            normalized_company: normalize_company(&record.company),
            role: record.role.clone(),
        }
    }
}

/// Deterministic content hash over `(source, company, role, location)`.
pub fn job_id(source: Source, company: &str, role: &str, location: &str) -> String {
    let raw = format!(
        "{}:{}:{}:{}",
        source.key(),
        company.trim().to_lowercase(),
        role.trim().to_lowercase(),
        location.trim().to_lowercase()
    );
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

const LEGAL_SUFFIXES: &[&str] = &[
    "pvt", "private", "ltd", "limited", "inc", "incorporated", "llc", "llp", "corp",
    "corporation", "co", "company", "plc", "gmbh", "pte",
];

/// Case-folded company name with punctuation and legal-suffix noise removed.
pub fn normalize_company(company: &str) -> String {
    let cleaned = company
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '&' { c } else { ' ' })
        .collect::<String>();
    let mut tokens = cleaned.split_whitespace().collect::<Vec<_>>();
    while tokens.len() > 1 {
        match tokens.last() {
            Some(last) if LEGAL_SUFFIXES.contains(last) => {
                tokens.pop();
            }
            _ => break,
        }
    }
    tokens.join(" ")
}

const CITY_PATTERNS: &[(&str, &[&str])] = &[
    ("Pune", &["pune", "hinjewadi", "kharadi", "hadapsar", "baner", "wakad", "magarpatta"]),
    (
        "Mumbai",
        &[
            "mumbai", "navi mumbai", "thane", "andheri", "bandra", "powai", "goregaon", "malad",
            "worli", "lower parel", "bkc", "airoli", "vashi",
        ],
    ),
    (
        "Bengaluru",
        &[
            "bengaluru", "bangalore", "whitefield", "koramangala", "indiranagar",
            "electronic city", "marathahalli", "sarjapur", "bellandur", "hsr layout",
        ],
    ),
    (
        "Delhi / NCR",
        &[
            "delhi", "noida", "gurgaon", "gurugram", "ghaziabad", "greater noida", "faridabad",
            "manesar", "dwarka", "connaught place", "aerocity",
        ],
    ),
    (
        "Hyderabad",
        &[
            "hyderabad", "secunderabad", "hitec city", "hitech city", "gachibowli", "madhapur",
            "kondapur", "banjara hills",
        ],
    ),
    ("Chennai", &["chennai", "sholinganallur", "omr", "porur", "guindy", "tidel park"]),
    ("Kolkata", &["kolkata", "salt lake", "sector v", "rajarhat", "new town"]),
    ("Ahmedabad", &["ahmedabad", "gandhinagar", "gift city"]),
    ("Jaipur", &["jaipur"]),
    ("Chandigarh", &["chandigarh", "mohali", "panchkula"]),
    ("Kochi", &["kochi", "cochin", "infopark"]),
    ("Indore", &["indore"]),
    ("Coimbatore", &["coimbatore"]),
    ("Thiruvananthapuram", &["thiruvananthapuram", "trivandrum", "technopark"]),
    ("Singapore", &["singapore"]),
    ("Dubai / UAE", &["dubai", "abu dhabi", "uae", "united arab emirates"]),
    ("London", &["london", "uk", "united kingdom"]),
    ("US - Remote", &["united states", "usa"]),
    ("Remote", &["remote", "work from home", "wfh", "anywhere"]),
    ("India", &["india"]),
];

/// Map free-text location to a canonical city name; unmatched input is returned as-is.
pub fn canonical_location(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if lower.trim().is_empty() {
        return String::new();
    }
    for (canonical, patterns) in CITY_PATTERNS {
        if patterns.iter().any(|p| lower.contains(p)) {
            return (*canonical).to_string();
        }
    }
    raw.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_requires_company_and_role() {
        assert!(RawJobRecord::new(Source::Indeed, "  ", "Product Manager", "Pune", "u").is_none());
        assert!(RawJobRecord::new(Source::Indeed, "Acme", "", "Pune", "u").is_none());
        let rec = RawJobRecord::new(Source::Indeed, " Acme  Bank ", "Product\n Manager", "Pune", "u")
            .expect("valid record");
        assert_eq!(rec.company, "Acme Bank");
        assert_eq!(rec.role, "Product Manager");
        assert_eq!(rec.salary_currency, "INR");
    }

    #[test]
    fn wellfound_defaults_to_usd() {
        let rec = RawJobRecord::new(Source::Wellfound, "Acme", "PM", "Remote", "u").unwrap();
        assert_eq!(rec.salary_currency, "USD");
    }

    #[test]
    fn blank_salary_is_dropped() {
        let rec = RawJobRecord::new(Source::Naukri, "Acme", "PM", "Pune", "u")
            .unwrap()
            .with_salary(Some("   ".to_string()));
        assert_eq!(rec.salary, None);
    }

    #[test]
    fn job_id_is_stable_and_case_insensitive() {
        let a = job_id(Source::LinkedIn, "Acme Bank", "Product Manager", "Bengaluru");
        let b = job_id(Source::LinkedIn, " ACME BANK", "product manager ", "bengaluru");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        let other_source = job_id(Source::Indeed, "Acme Bank", "Product Manager", "Bengaluru");
        assert_ne!(a, other_source);
    }

    #[test]
    fn company_normalization_strips_punctuation_and_suffixes() {
        assert_eq!(normalize_company("ACME BANK"), "acme bank");
        assert_eq!(normalize_company("Acme Bank Pvt. Ltd."), "acme bank");
        assert_eq!(normalize_company("Acme, Inc."), "acme");
        assert_eq!(normalize_company("Co"), "co");
    }

    #[test]
    fn locations_map_to_canonical_cities() {
        assert_eq!(canonical_location("Whitefield, Bangalore"), "Bengaluru");
        assert_eq!(canonical_location("Gurugram, Haryana"), "Delhi / NCR");
        assert_eq!(canonical_location("Cincinnati, OH"), "Cincinnati, OH");
        assert_eq!(canonical_location(""), "");
    }

    #[test]
    fn source_parses_config_keys_and_legacy_alias() {
        assert_eq!("angellist".parse::<Source>(), Ok(Source::Wellfound));
        assert_eq!("IIMJobs".parse::<Source>(), Ok(Source::IimJobs));
        assert!("monster".parse::<Source>().is_err());
        let parsed: Source = serde_json::from_str("\"angellist\"").unwrap();
        assert_eq!(parsed, Source::Wellfound);
    }

    #[test]
    fn unknown_source_is_a_std_error_with_the_name() {
        let err = "Monster".parse::<Source>().unwrap_err();
        assert_eq!(err, UnknownSource("monster".to_string()));
        assert_eq!(err.to_string(), "unknown source `monster`");
        let wrapped = anyhow::Error::from(err);
        assert!(wrapped.downcast_ref::<UnknownSource>().is_some());
    }

    #[test]
    fn outcome_rounds_elapsed_and_zeroes_failed_count() {
        let failed = PortalOutcome::failed(3.14159);
        assert_eq!(failed.count, 0);
        assert_eq!(failed.elapsed_secs, 3.1);
        assert_eq!(PortalOutcome::success(7, 1.06).elapsed_secs, 1.1);
    }
}
