//! Job-search provider access.
//!
//! A `SearchConfiguration` fans out into one provider query per
//! (role, location) pair. Results are flattened into a single batch that
//! shares one `scraped_at` stamp. A failing pair is logged and skipped.

use chrono::{DateTime, SecondsFormat, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{DEFAULT_MAX_AGE_HOURS, DEFAULT_RESULTS_WANTED, DescriptionFormat, ProviderSettings, SearchConfiguration};
use crate::error::{PipelineError, Result};
use crate::models::RawJobRecord;

const SEARCH_PATH: &str = "/api/v1/search_jobs";

/// One provider request. Field names match the JobSpy search parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchQuery {
    pub site_name: Vec<String>,
    pub search_term: String,
    pub location: String,
    pub results_wanted: u32,
    pub hours_old: u32,
    pub country_indeed: String,
    pub linkedin_fetch_description: bool,
    pub is_remote: bool,
    pub easy_apply: bool,
    pub description_format: DescriptionFormat,
}

impl SearchQuery {
    pub fn label(&self) -> String {
        format!("'{}' in '{}'", self.search_term, self.location)
    }
}

/// What one query returned: the rows that decoded, and one record error
/// per row that did not.
#[derive(Debug, Default)]
pub struct SearchResults {
    pub rows: Vec<RawJobRecord>,
    pub malformed: Vec<PipelineError>,
}

impl From<Vec<RawJobRecord>> for SearchResults {
    fn from(rows: Vec<RawJobRecord>) -> Self {
        Self {
            rows,
            malformed: Vec::new(),
        }
    }
}

/// A multi-site job-search provider.
pub trait JobSource {
    /// Run one query. Empty results mean "no matches"; `Err` is reserved
    /// for transport-level failures.
    fn search(&self, query: &SearchQuery) -> Result<SearchResults>;
}

/// Decode provider rows one at a time so a bad row only costs itself.
pub fn decode_rows(query_label: &str, rows: Vec<serde_json::Value>) -> SearchResults {
    let mut results = SearchResults::default();
    for (index, row) in rows.into_iter().enumerate() {
        let key = row_key(&row)
            .unwrap_or_else(|| format!("row {} of {}", index + 1, query_label));
        match serde_json::from_value::<RawJobRecord>(row) {
            Ok(record) => results.rows.push(record),
            Err(e) => {
                let err = PipelineError::record(key, format!("malformed provider row: {}", e));
                warn!("{}", err);
                results.malformed.push(err);
            }
        }
    }
    results
}

fn row_key(row: &serde_json::Value) -> Option<String> {
    ["id", "job_url"].iter().find_map(|field| match row.get(*field)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

// --- HTTP provider ---

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    jobs: Vec<serde_json::Value>,
}

/// Client for a JobSpy-compatible HTTP search service.
#[derive(Debug)]
pub struct HttpJobSource {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpJobSource {
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: format!("{}{}", settings.base_url.trim_end_matches('/'), SEARCH_PATH),
            api_key: settings.api_key.clone(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl JobSource for HttpJobSource {
    fn search(&self, query: &SearchQuery) -> Result<SearchResults> {
        let mut request = self.client.post(&self.endpoint).json(query);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send()
            .map_err(|e| PipelineError::transport(query.label(), e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(PipelineError::transport(
                query.label(),
                format!("provider returned {}: {}", status, body.trim()),
            ));
        }

        let parsed: SearchResponse = response.json().map_err(|e| {
            PipelineError::transport(query.label(), format!("malformed provider response: {}", e))
        })?;
        Ok(decode_rows(&query.label(), parsed.jobs))
    }
}

// --- Fetching ---

/// Everything one fetch produced, including the queries that failed.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<RawJobRecord>,
    /// The instant the fetch began; `scraped_at` is its RFC 3339 form.
    pub started_at: DateTime<Utc>,
    pub scraped_at: String,
    pub queries_attempted: usize,
    pub failures: Vec<PipelineError>,
    /// Rows the provider sent that could not be decoded.
    pub malformed: Vec<PipelineError>,
}

impl FetchOutcome {
    /// True when queries ran and every one of them failed.
    pub fn all_failed(&self) -> bool {
        self.queries_attempted > 0 && self.failures.len() == self.queries_attempted
    }
}

/// Expand a configuration into the Cartesian product of roles and locations.
pub fn build_queries(config: &SearchConfiguration) -> Vec<SearchQuery> {
    let sites = config.resolved_sites();
    let country = config.resolved_country();
    let mut queries = Vec::new();

    for role in config.effective_roles() {
        for location in config.effective_locations() {
            queries.push(SearchQuery {
                site_name: sites.clone(),
                search_term: role.to_string(),
                location: location.to_string(),
                results_wanted: config.results_wanted.unwrap_or(DEFAULT_RESULTS_WANTED),
                hours_old: config.max_age_hours.unwrap_or(DEFAULT_MAX_AGE_HOURS),
                country_indeed: country.clone(),
                linkedin_fetch_description: config.fetch_full_description.unwrap_or(true),
                is_remote: config.remote_only.unwrap_or(false),
                easy_apply: config.easy_apply_only.unwrap_or(false),
                description_format: config.description_format.unwrap_or_default(),
            });
        }
    }
    queries
}

/// Fetch raw listings for every (role, location) pair.
///
/// An invalid configuration yields an empty outcome without contacting
/// the provider. A failed pair is recorded in `failures` and the
/// remaining pairs still run.
pub fn fetch_raw(config: &SearchConfiguration, source: &dyn JobSource) -> FetchOutcome {
    let started_at = Utc::now();
    let scraped_at = started_at.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut outcome = FetchOutcome {
        started_at,
        scraped_at: scraped_at.clone(),
        ..Default::default()
    };

    if let Err(e) = config.validate() {
        error!("Not fetching: {}", e);
        return outcome;
    }

    let queries = build_queries(config);
    info!(
        "Fetching {} queries across sites {:?}",
        queries.len(),
        config.resolved_sites()
    );

    for query in &queries {
        outcome.queries_attempted += 1;
        match source.search(query) {
            Ok(results) => {
                info!(
                    "{}: {} listings, {} malformed",
                    query.label(),
                    results.rows.len(),
                    results.malformed.len()
                );
                outcome.records.extend(results.rows.into_iter().map(|mut row| {
                    row.scraped_at = Some(scraped_at.clone());
                    row
                }));
                outcome.malformed.extend(results.malformed);
            }
            Err(e) => {
                warn!("Query {} failed, continuing: {}", query.label(), e);
                outcome.failures.push(e);
            }
        }
    }

    if outcome.all_failed() {
        warn!("Every provider query failed; no listings were fetched");
    }
    outcome
}
