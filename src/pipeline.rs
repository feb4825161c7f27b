//! End-to-end ingestion run: load config, fetch, normalize, store, summarize.
//!
//! The run is linear. Configuration failures and an unreachable store end
//! it as `failed`; everything smaller is counted and reported in
//! `RunSummary::errors`.

use log::{error, info, warn};

use crate::config::{SearchConfiguration, Settings, load_search_config};
use crate::dates::DateNormalizer;
use crate::db::Database;
use crate::error::Result;
use crate::models::{CanonicalJobRecord, RawJobRecord, RunStatus, RunSummary};
use crate::normalize::RecordNormalizer;
use crate::source::{JobSource, fetch_raw};

const TOTAL_STEPS: usize = 4;

pub struct Pipeline<'a> {
    settings: &'a Settings,
    source: &'a dyn JobSource,
    dates: Option<DateNormalizer>,
}

impl<'a> Pipeline<'a> {
    pub fn new(settings: &'a Settings, source: &'a dyn JobSource) -> Self {
        Self {
            settings,
            source,
            dates: None,
        }
    }

    /// Pin the clock used for relative posting dates.
    pub fn with_dates(mut self, dates: DateNormalizer) -> Self {
        self.dates = Some(dates);
        self
    }

    pub fn run(&self, config_override: Option<SearchConfiguration>) -> RunSummary {
        info!("[1/{}] Loading search configuration", TOTAL_STEPS);
        let config = match self.load_config(config_override) {
            Ok(config) => config,
            Err(e) => {
                error!("Configuration loading failed: {}", e);
                let mut summary = RunSummary::new(RunStatus::Failed);
                summary.errors.push(format!("Configuration loading failed: {}", e));
                return summary;
            }
        };

        info!("[2/{}] Fetching listings", TOTAL_STEPS);
        let outcome = fetch_raw(&config, self.source);
        let mut summary = RunSummary::new(RunStatus::Success);
        summary.total_jobs_fetched = outcome.records.len() + outcome.malformed.len();
        summary.failed_queries = outcome.failures.len();
        summary.records_rejected = outcome.malformed.len();
        summary
            .errors
            .extend(outcome.failures.iter().map(|e| e.to_string()));
        summary
            .errors
            .extend(outcome.malformed.iter().map(|e| e.to_string()));

        if outcome.records.is_empty() {
            if outcome.all_failed() {
                warn!("No listings fetched because every provider query failed");
            } else {
                info!("No listings matched the search");
            }
            summary.status = RunStatus::CompletedNoData;
            return summary;
        }

        info!("[3/{}] Normalizing {} listings", TOTAL_STEPS, outcome.records.len());
        let dates = self
            .dates
            .unwrap_or_else(|| DateNormalizer::at(outcome.started_at.naive_utc()));
        let normalizer = RecordNormalizer::new(dates, outcome.scraped_at.clone());
        let records = normalize_all(&normalizer, &outcome.records, &mut summary);

        info!("[4/{}] Storing {} records", TOTAL_STEPS, records.len());
        if let Err(e) = self.store(&records, &mut summary) {
            if e.is_fatal() {
                error!("Store unreachable: {}", e);
            } else {
                error!("Storage failed: {}", e);
            }
            summary.status = RunStatus::Failed;
            summary.errors.push(e.to_string());
            return summary;
        }

        summary.status = if summary.errors.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::CompletedWithErrors
        };
        info!(
            "Run finished ({}): {} fetched, {} new, {} duplicate, {} issue(s)",
            summary.status,
            summary.total_jobs_fetched,
            summary.new_jobs_added,
            summary.duplicate_skipped,
            summary.errors.len()
        );
        summary
    }

    fn load_config(&self, config_override: Option<SearchConfiguration>) -> Result<SearchConfiguration> {
        let config = match config_override {
            Some(config) => {
                info!("Using configuration supplied by the caller");
                config
            }
            None => load_search_config(&self.settings.config_path)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn store(&self, records: &[CanonicalJobRecord], summary: &mut RunSummary) -> Result<()> {
        let db = Database::open(&self.settings.db_path)?;
        db.init()?;
        let report = db.store(records)?;
        summary.new_jobs_added = report.inserted;
        summary.duplicate_skipped = report.skipped;
        summary.records_errored = report.errored;
        summary.errors.extend(report.errors);
        Ok(())
    }
}

/// Run the pipeline once with the given collaborators.
pub fn run_pipeline(
    settings: &Settings,
    source: &dyn JobSource,
    config_override: Option<SearchConfiguration>,
) -> RunSummary {
    Pipeline::new(settings, source).run(config_override)
}

fn normalize_all(
    normalizer: &RecordNormalizer,
    rows: &[RawJobRecord],
    summary: &mut RunSummary,
) -> Vec<CanonicalJobRecord> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        match normalizer.normalize(row) {
            Ok(record) => records.push(record),
            Err(reason) => {
                let label = row
                    .title
                    .as_deref()
                    .or(row.job_url.as_deref())
                    .unwrap_or("<untitled>");
                warn!("Rejected listing '{}': {}", label, reason);
                summary.records_rejected += 1;
                summary
                    .errors
                    .push(format!("Rejected listing '{}': {}", label, reason));
            }
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use crate::models::JobFilter;
    use crate::source::testing::{ScriptedSource, raw};
    use chrono::NaiveDate;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn settings(dir: &Path) -> Settings {
        Settings {
            config_path: dir.join("config.json"),
            db_path: dir.join("data").join("job_listings.db"),
            provider: ProviderSettings {
                base_url: "http://unused".to_string(),
                api_key: None,
                timeout_secs: 1,
            },
        }
    }

    fn search(roles: &[&str]) -> SearchConfiguration {
        SearchConfiguration::new(
            roles.iter().map(|s| s.to_string()).collect(),
            vec!["Remote".to_string()],
        )
    }

    fn dates() -> DateNormalizer {
        let now = NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        DateNormalizer::at(now)
    }

    #[test]
    fn test_successful_run() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let mut listing = raw("e1", "u1");
        listing.date_posted = Some(crate::models::RawDate::Text("2 days ago".to_string()));
        let source = ScriptedSource::new().returning("Engineer", vec![listing, raw("e2", "u2")]);

        let summary = Pipeline::new(&settings, &source)
            .with_dates(dates())
            .run(Some(search(&["Engineer"])));

        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.total_jobs_fetched, 2);
        assert_eq!(summary.new_jobs_added, 2);
        assert_eq!(summary.duplicate_skipped, 0);
        assert!(summary.errors.is_empty());

        let db = Database::open(&settings.db_path).unwrap();
        let jobs = db.list_jobs(&JobFilter::default(), 0, 10).unwrap();
        assert_eq!(jobs[0].record.date_posted.as_deref(), Some("2024-03-08"));
        assert_eq!(jobs[0].record.scraped_at, jobs[1].record.scraped_at);
    }

    #[test]
    fn test_config_load_failure_stops_before_fetch() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let source = ScriptedSource::new();

        let summary = run_pipeline(&settings, &source, None);

        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.total_jobs_fetched, 0);
        assert!(summary.errors[0].starts_with("Configuration loading failed"));
        assert_eq!(source.call_count(), 0);
        assert!(!settings.db_path.exists());
    }

    #[test]
    fn test_invalid_override_is_a_config_failure() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let source = ScriptedSource::new();

        let summary = run_pipeline(&settings, &source, Some(search(&[])));

        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(source.call_count(), 0);
    }

    #[test]
    fn test_config_loaded_from_file() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let mut file = std::fs::File::create(&settings.config_path).unwrap();
        file.write_all(
            br#"{"job_preferences": {"desired_roles": ["Dev"], "target_locations": ["Mars"],
                 "sites_to_scrape": ["mars_jobs_inc"]}}"#,
        )
        .unwrap();
        let source = ScriptedSource::new().returning("Dev", vec![raw("xyz", "u-xyz")]);

        let summary = run_pipeline(&settings, &source, None);

        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.new_jobs_added, 1);
        let calls = source.calls.borrow();
        assert_eq!(calls[0].site_name, vec!["mars_jobs_inc"]);
        assert_eq!(calls[0].location, "Mars");
    }

    #[test]
    fn test_no_data_never_touches_storage() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let source = ScriptedSource::new();

        let summary = run_pipeline(&settings, &source, Some(search(&["Manager"])));

        assert_eq!(summary.status, RunStatus::CompletedNoData);
        assert_eq!(summary.total_jobs_fetched, 0);
        assert!(summary.errors.is_empty());
        assert!(!settings.db_path.exists());
    }

    #[test]
    fn test_all_queries_failing_is_no_data_with_errors() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let source = ScriptedSource::new().failing("Sales", "connection refused");

        let summary = run_pipeline(&settings, &source, Some(search(&["Sales"])));

        assert_eq!(summary.status, RunStatus::CompletedNoData);
        assert_eq!(summary.failed_queries, 1);
        assert!(summary.errors[0].contains("connection refused"));
    }

    #[test]
    fn test_unreachable_store_reports_fetched_count() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(dir.path());
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file, not a directory").unwrap();
        settings.db_path = blocker.join("job_listings.db");

        let rows = (1..=5).map(|i| raw(&format!("j{}", i), &format!("u{}", i))).collect();
        let source = ScriptedSource::new().returning("Engineer", rows);

        let summary = run_pipeline(&settings, &source, Some(search(&["Engineer"])));

        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.total_jobs_fetched, 5);
        assert_eq!(summary.new_jobs_added, 0);
        assert!(
            summary
                .errors
                .iter()
                .any(|e| e.contains("Database connection failed"))
        );
    }

    #[test]
    fn test_same_site_id_different_url() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let source = ScriptedSource::new()
            .returning("Engineer", vec![raw("dup", "u1"), raw("dup", "u2")]);

        let summary = run_pipeline(&settings, &source, Some(search(&["Engineer"])));

        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.new_jobs_added, 1);
        assert_eq!(summary.duplicate_skipped, 1);
    }

    #[test]
    fn test_rejected_records_keep_good_work() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let mut no_url = raw("j2", "");
        no_url.job_url = None;
        let source = ScriptedSource::new()
            .returning("Engineer", vec![raw("j1", "u1"), no_url, raw("j3", "u3")]);

        let summary = run_pipeline(&settings, &source, Some(search(&["Engineer"])));

        assert_eq!(summary.status, RunStatus::CompletedWithErrors);
        assert_eq!(summary.total_jobs_fetched, 3);
        assert_eq!(summary.new_jobs_added, 2);
        assert_eq!(summary.records_rejected, 1);
        assert!(summary.errors[0].contains("missing listing URL"));
    }

    #[test]
    fn test_malformed_provider_row_is_a_record_error() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let source = ScriptedSource::new().returning_json(
            "Engineer",
            vec![
                serde_json::json!({"id": "j1", "site": "indeed", "job_url": "u1"}),
                serde_json::json!({"id": "j2", "site": "indeed", "job_url": "u2", "min_amount": "50000"}),
            ],
        );

        let summary = run_pipeline(&settings, &source, Some(search(&["Engineer"])));

        assert_eq!(summary.status, RunStatus::CompletedWithErrors);
        assert_eq!(summary.total_jobs_fetched, 2);
        assert_eq!(summary.new_jobs_added, 1);
        assert_eq!(summary.records_rejected, 1);
        assert_eq!(summary.failed_queries, 0);
        assert!(summary.errors[0].contains("j2"));
    }

    #[test]
    fn test_relative_dates_follow_the_batch_clock() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let mut listing = raw("j1", "u1");
        listing.date_posted = Some(crate::models::RawDate::Text("today".to_string()));
        let source = ScriptedSource::new().returning("Engineer", vec![listing]);

        run_pipeline(&settings, &source, Some(search(&["Engineer"])));

        let db = Database::open(&settings.db_path).unwrap();
        let job = db.get_job(1).unwrap().unwrap();
        assert_eq!(
            job.record.date_posted.as_deref(),
            Some(&job.record.scraped_at[..10])
        );
    }

    #[test]
    fn test_partial_fetch_failure_is_completed_with_errors() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let source = ScriptedSource::new()
            .returning("Engineer", vec![raw("j1", "u1")])
            .failing("Analyst", "timeout");

        let summary = run_pipeline(&settings, &source, Some(search(&["Engineer", "Analyst"])));

        assert_eq!(summary.status, RunStatus::CompletedWithErrors);
        assert_eq!(summary.new_jobs_added, 1);
        assert_eq!(summary.failed_queries, 1);
    }

    #[test]
    fn test_second_run_only_skips() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let source = ScriptedSource::new()
            .returning("Engineer", vec![raw("j1", "u1"), raw("j2", "u2")]);

        run_pipeline(&settings, &source, Some(search(&["Engineer"])));
        let summary = run_pipeline(&settings, &source, Some(search(&["Engineer"])));

        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.new_jobs_added, 0);
        assert_eq!(summary.duplicate_skipped, 2);
        let db = Database::open(&settings.db_path).unwrap();
        assert_eq!(db.count_jobs().unwrap(), 2);
    }

    #[test]
    fn test_settings_path_is_used_for_storage() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path());
        let source = ScriptedSource::new().returning("Engineer", vec![raw("j1", "u1")]);
        run_pipeline(&settings, &source, Some(search(&["Engineer"])));
        assert!(PathBuf::from(&settings.db_path).exists());
    }
}
