use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

// --- Raw provider rows ---

/// A posting date exactly as the provider delivered it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "serde_json::Value")]
pub enum RawDate {
    Text(String),
    /// Epoch value; seconds or milliseconds, decided by magnitude.
    EpochMillis(i64),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
}

impl From<serde_json::Value> for RawDate {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => RawDate::Text(s),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(epoch) => RawDate::EpochMillis(epoch),
                None => RawDate::Text(n.to_string()),
            },
            other => RawDate::Text(other.to_string()),
        }
    }
}

/// One listing as returned by a provider query. Field names follow the
/// JobSpy column set; everything is optional because sites disagree.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawJobRecord {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub job_url: Option<String>,
    #[serde(default)]
    pub job_url_direct: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub date_posted: Option<RawDate>,
    #[serde(default)]
    pub job_type: Option<String>,
    #[serde(default)]
    pub salary: Option<serde_json::Value>,
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub min_amount: Option<f64>,
    #[serde(default)]
    pub max_amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub is_remote: Option<bool>,
    #[serde(default)]
    pub emails: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
    /// Stamped by the source adapter, shared by every row of one fetch.
    #[serde(skip)]
    pub scraped_at: Option<String>,
}

// Some boards hand out numeric ids.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// --- Canonical records ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    New,
    Interested,
    Applied,
    Interviewing,
    Offer,
    Rejected,
    Ignored,
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        JobStatus::New,
        JobStatus::Interested,
        JobStatus::Applied,
        JobStatus::Interviewing,
        JobStatus::Offer,
        JobStatus::Rejected,
        JobStatus::Ignored,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::Interested => "interested",
            JobStatus::Applied => "applied",
            JobStatus::Interviewing => "interviewing",
            JobStatus::Offer => "offer",
            JobStatus::Rejected => "rejected",
            JobStatus::Ignored => "ignored",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| {
                PipelineError::config(format!(
                    "Unknown status '{}'. Expected one of: new, interested, applied, \
                     interviewing, offer, rejected, ignored",
                    s
                ))
            })
    }
}

/// Storage-ready job listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalJobRecord {
    pub site_id: String,
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub date_posted: Option<String>,
    pub listing_url: String,
    pub application_url: Option<String>,
    pub description_text: Option<String>,
    pub source: String,
    pub emails: Option<Vec<String>>,
    pub salary_text: Option<String>,
    pub job_type: Option<String>,
    pub is_remote: Option<bool>,
    pub scraped_at: String,
    pub status: JobStatus,
}

/// A canonical record as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredJob {
    pub id: i64,
    #[serde(flatten)]
    pub record: CanonicalJobRecord,
}

/// Read filters for listing stored jobs. Title and location match by
/// substring, source and status by equality.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub title: Option<String>,
    pub location: Option<String>,
    pub source: Option<String>,
    pub status: Option<JobStatus>,
}

// --- Results ---

/// Outcome of one `Database::store` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreReport {
    pub inserted: usize,
    pub skipped: usize,
    pub errored: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    CompletedNoData,
    CompletedWithErrors,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Success => "success",
            RunStatus::CompletedNoData => "completed_no_data",
            RunStatus::CompletedWithErrors => "completed_with_errors",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Summary of one pipeline run. Callers must inspect both `status` and
/// `errors`: partial failures are reported under `completed_with_errors`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub total_jobs_fetched: usize,
    pub new_jobs_added: usize,
    pub duplicate_skipped: usize,
    pub records_rejected: usize,
    pub records_errored: usize,
    pub failed_queries: usize,
    pub errors: Vec<String>,
}

impl RunSummary {
    pub fn new(status: RunStatus) -> Self {
        Self {
            status,
            total_jobs_fetched: 0,
            new_jobs_added: 0,
            duplicate_skipped: 0,
            records_rejected: 0,
            records_errored: 0,
            failed_queries: 0,
            errors: Vec::new(),
        }
    }
}
