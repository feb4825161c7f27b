//! Raw provider rows to canonical job records.

use log::debug;
use scraper::Html;
use std::fmt;

use crate::dates::DateNormalizer;
use crate::models::{CanonicalJobRecord, JobStatus, RawJobRecord};

/// Why a raw row could not become a canonical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingIdentifier,
    MissingListingUrl,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingIdentifier => f.write_str("missing identifier"),
            Rejection::MissingListingUrl => f.write_str("missing listing URL"),
        }
    }
}

/// A value together with the field that supplied it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub from: &'static str,
}

/// First non-blank candidate wins. Logs which field supplied the value.
pub fn resolve_first(
    target: &str,
    candidates: &[(&'static str, Option<&str>)],
) -> Option<Resolved<String>> {
    let found = candidates.iter().find_map(|&(from, value)| {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Resolved {
                value: v.to_string(),
                from,
            })
    });
    match &found {
        Some(resolved) => debug!("{} resolved from '{}'", target, resolved.from),
        None => debug!("{} has no value", target),
    }
    found
}

pub struct RecordNormalizer {
    dates: DateNormalizer,
    fallback_scraped_at: String,
}

impl RecordNormalizer {
    /// `fallback_scraped_at` stamps rows that arrive without a batch stamp.
    pub fn new(dates: DateNormalizer, fallback_scraped_at: impl Into<String>) -> Self {
        Self {
            dates,
            fallback_scraped_at: fallback_scraped_at.into(),
        }
    }

    pub fn normalize(&self, raw: &RawJobRecord) -> Result<CanonicalJobRecord, Rejection> {
        let listing_url = non_blank(raw.job_url.as_deref());
        let site_id = resolve_first(
            "site_id",
            &[("id", raw.id.as_deref()), ("job_url", listing_url.as_deref())],
        )
        .ok_or(Rejection::MissingIdentifier)?;
        let listing_url = listing_url.ok_or(Rejection::MissingListingUrl)?;

        let source = resolve_first("source", &[("site", raw.site.as_deref())])
            .map(|r| r.value)
            .unwrap_or_else(|| "unknown".to_string());

        Ok(CanonicalJobRecord {
            site_id: site_id.value,
            title: non_blank(raw.title.as_deref()),
            company: non_blank(raw.company.as_deref()),
            location: non_blank(raw.location.as_deref()),
            date_posted: self.dates.normalize(raw.date_posted.as_ref()),
            listing_url,
            application_url: non_blank(raw.job_url_direct.as_deref()),
            description_text: raw.description.as_deref().and_then(description_text),
            source,
            emails: email_list(raw.emails.as_ref()),
            salary_text: salary_text(raw),
            job_type: non_blank(raw.job_type.as_deref()),
            is_remote: raw.is_remote,
            scraped_at: raw
                .scraped_at
                .clone()
                .unwrap_or_else(|| self.fallback_scraped_at.clone()),
            status: JobStatus::New,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Ordered list of the string entries; anything that is not a list is
/// dropped.
fn email_list(value: Option<&serde_json::Value>) -> Option<Vec<String>> {
    let entries = value?.as_array()?;
    let emails: Vec<String> = entries
        .iter()
        .filter_map(|e| e.as_str())
        .map(str::to_string)
        .collect();
    (!emails.is_empty()).then_some(emails)
}

/// Salary stays opaque text: textual `salary`, then a structured
/// `salary` serialized as-is, then the provider's amount columns.
fn salary_text(raw: &RawJobRecord) -> Option<String> {
    match &raw.salary {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
            debug!("salary_text resolved from 'salary'");
            return Some(s.trim().to_string());
        }
        Some(value @ (serde_json::Value::Object(_) | serde_json::Value::Number(_))) => {
            debug!("salary_text resolved from structured 'salary'");
            return Some(value.to_string());
        }
        _ => {}
    }

    let amount = match (raw.min_amount, raw.max_amount) {
        (Some(min), Some(max)) => format!("{}-{}", format_amount(min), format_amount(max)),
        (Some(min), None) => format!("{}+", format_amount(min)),
        (None, Some(max)) => format!("up to {}", format_amount(max)),
        (None, None) => return None,
    };
    let text = [raw.currency.as_deref(), Some(amount.as_str()), raw.interval.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    debug!("salary_text resolved from amount columns");
    Some(text)
}

fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}

/// Markup is reduced to its text; markdown and plain text pass through.
fn description_text(description: &str) -> Option<String> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !looks_like_html(trimmed) {
        return Some(trimmed.to_string());
    }

    let fragment = Html::parse_fragment(trimmed);
    let text = fragment
        .root_element()
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

fn looks_like_html(text: &str) -> bool {
    const TAGS: [&str; 8] = ["<p", "<div", "<br", "<li", "<ul", "<span", "<strong", "<b>"];
    let lower = text.to_lowercase();
    TAGS.iter().any(|tag| lower.contains(tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawDate;
    use chrono::NaiveDate;
    use serde_json::json;

    fn normalizer() -> RecordNormalizer {
        let now = NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        RecordNormalizer::new(DateNormalizer::at(now), "2024-03-10T12:00:00Z")
    }

    fn raw() -> RawJobRecord {
        RawJobRecord {
            id: Some("in-42".to_string()),
            site: Some("indeed".to_string()),
            job_url: Some("https://indeed.com/viewjob?jk=42".to_string()),
            job_url_direct: Some("https://acme.example/careers/42".to_string()),
            title: Some("Engineer".to_string()),
            company: Some("Acme".to_string()),
            location: Some("Remote".to_string()),
            date_posted: Some(RawDate::Text("2 days ago".to_string())),
            job_type: Some("fulltime".to_string()),
            description: Some("Build things.".to_string()),
            scraped_at: Some("2024-03-10T08:00:00Z".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_full_mapping() {
        let record = normalizer().normalize(&raw()).unwrap();
        assert_eq!(record.site_id, "in-42");
        assert_eq!(record.listing_url, "https://indeed.com/viewjob?jk=42");
        assert_eq!(record.application_url.as_deref(), Some("https://acme.example/careers/42"));
        assert_eq!(record.date_posted.as_deref(), Some("2024-03-08"));
        assert_eq!(record.source, "indeed");
        assert_eq!(record.description_text.as_deref(), Some("Build things."));
        assert_eq!(record.scraped_at, "2024-03-10T08:00:00Z");
        assert_eq!(record.status, JobStatus::New);
        assert!(record.emails.is_none());
        assert!(record.salary_text.is_none());
    }

    #[test]
    fn test_site_id_falls_back_to_listing_url() {
        let mut row = raw();
        row.id = Some("  ".to_string());
        let record = normalizer().normalize(&row).unwrap();
        assert_eq!(record.site_id, "https://indeed.com/viewjob?jk=42");
    }

    #[test]
    fn test_rejections() {
        let mut row = raw();
        row.id = None;
        row.job_url = None;
        assert_eq!(normalizer().normalize(&row), Err(Rejection::MissingIdentifier));

        let mut row = raw();
        row.job_url = Some(String::new());
        let rejection = normalizer().normalize(&row).unwrap_err();
        assert_eq!(rejection, Rejection::MissingListingUrl);
        assert_eq!(rejection.to_string(), "missing listing URL");
    }

    #[test]
    fn test_unparseable_date_is_null_not_rejection() {
        let mut row = raw();
        row.date_posted = Some(RawDate::Text("posted 2 days ago".to_string()));
        let record = normalizer().normalize(&row).unwrap();
        assert!(record.date_posted.is_none());
    }

    #[test]
    fn test_emails_keep_order_and_drop_non_lists() {
        let mut row = raw();
        row.emails = Some(json!(["b@x.com", "a@x.com", "b@x.com", "not-an-email"]));
        let record = normalizer().normalize(&row).unwrap();
        assert_eq!(
            record.emails,
            Some(vec![
                "b@x.com".to_string(),
                "a@x.com".to_string(),
                "b@x.com".to_string(),
                "not-an-email".to_string()
            ])
        );

        row.emails = Some(json!("a@x.com, b@x.com"));
        assert!(normalizer().normalize(&row).unwrap().emails.is_none());

        row.emails = Some(json!([]));
        assert!(normalizer().normalize(&row).unwrap().emails.is_none());
    }

    #[test]
    fn test_salary_resolution_chain() {
        let mut row = raw();
        row.salary = Some(json!("$50k - $70k"));
        row.min_amount = Some(1.0);
        assert_eq!(salary_text(&row).as_deref(), Some("$50k - $70k"));

        row.salary = Some(json!({"min": 50000, "max": 70000}));
        assert_eq!(salary_text(&row).as_deref(), Some(r#"{"max":70000,"min":50000}"#));

        row.salary = None;
        row.min_amount = Some(50000.0);
        row.max_amount = Some(70000.0);
        row.currency = Some("USD".to_string());
        row.interval = Some("yearly".to_string());
        assert_eq!(salary_text(&row).as_deref(), Some("USD 50000-70000 yearly"));

        row.max_amount = None;
        row.currency = None;
        row.interval = Some("hourly".to_string());
        row.min_amount = Some(42.5);
        assert_eq!(salary_text(&row).as_deref(), Some("42.50+ hourly"));
    }

    #[test]
    fn test_html_description_reduced_to_text() {
        let mut row = raw();
        row.description = Some("<p>Build <strong>fast</strong> things.</p><ul><li>Rust</li></ul>".to_string());
        let record = normalizer().normalize(&row).unwrap();
        assert_eq!(
            record.description_text.as_deref(),
            Some("Build fast things. Rust")
        );

        row.description = Some("   ".to_string());
        assert!(normalizer().normalize(&row).unwrap().description_text.is_none());
    }

    #[test]
    fn test_missing_site_and_batch_stamp_fall_back() {
        let mut row = raw();
        row.site = None;
        row.scraped_at = None;
        let record = normalizer().normalize(&row).unwrap();
        assert_eq!(record.source, "unknown");
        assert_eq!(record.scraped_at, "2024-03-10T12:00:00Z");
    }

    #[test]
    fn test_resolve_first_reports_provenance() {
        let resolved = resolve_first("site_id", &[("id", None), ("job_url", Some("u1"))]).unwrap();
        assert_eq!(resolved.value, "u1");
        assert_eq!(resolved.from, "job_url");
        assert!(resolve_first("site_id", &[("id", Some(" "))]).is_none());
    }
}
