use log::{debug, info, warn};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::models::{CanonicalJobRecord, JobFilter, JobStatus, StoreReport, StoredJob};

const JOB_COLUMNS: &str = "id, site_id, title, company, location, date_posted, listing_url, \
     application_url, description_text, source, emails, salary_text, job_type, is_remote, \
     scraped_at, status";

pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (creating if needed) the database file. Any failure here means
    /// the store is unreachable.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                PipelineError::connection(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(path).map_err(|e| {
            PipelineError::connection(format!("cannot open {}: {}", path.display(), e))
        })?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(PipelineError::connection)?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                site_id TEXT NOT NULL UNIQUE,
                title TEXT,
                company TEXT,
                location TEXT,
                date_posted TEXT,
                listing_url TEXT NOT NULL UNIQUE,
                application_url TEXT,
                description_text TEXT,
                source TEXT NOT NULL,
                emails TEXT,
                salary_text TEXT,
                job_type TEXT,
                is_remote INTEGER,
                scraped_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'new' CHECK (status IN
                    ('new', 'interested', 'applied', 'interviewing', 'offer', 'rejected', 'ignored'))
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE INDEX IF NOT EXISTS idx_jobs_source ON jobs(source);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='jobs'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(PipelineError::config(
                "Database not initialized. Run 'autocv init' first.",
            ));
        }
        Ok(())
    }

    // --- Writes ---

    /// Insert every record whose `site_id` and `listing_url` are both new.
    ///
    /// A record colliding on either key is skipped. A record missing a key,
    /// or whose insert fails, is counted as errored without stopping the
    /// batch. Successful inserts are committed together before returning.
    pub fn store(&self, records: &[CanonicalJobRecord]) -> Result<StoreReport> {
        let mut report = StoreReport::default();
        if records.is_empty() {
            return Ok(report);
        }

        let tx = self.conn.unchecked_transaction()?;
        for record in records {
            if record.site_id.trim().is_empty() || record.listing_url.trim().is_empty() {
                let err = PipelineError::record(
                    record_key(record),
                    "missing site_id or listing_url",
                );
                warn!("{}", err);
                report.errored += 1;
                report.errors.push(err.to_string());
                continue;
            }

            match insert_if_new(&tx, record) {
                Ok(true) => {
                    debug!("Inserted {} ({})", record.site_id, record.listing_url);
                    report.inserted += 1;
                }
                Ok(false) => {
                    debug!("Skipped duplicate {} ({})", record.site_id, record.listing_url);
                    report.skipped += 1;
                }
                Err(e) => {
                    let err = PipelineError::record(record_key(record), e);
                    warn!("{}", err);
                    report.errored += 1;
                    report.errors.push(err.to_string());
                }
            }
        }
        tx.commit()?;

        info!(
            "Stored batch: {} new, {} duplicate, {} errored",
            report.inserted, report.skipped, report.errored
        );
        Ok(report)
    }

    /// Workflow status change; the only mutation a stored job ever sees.
    pub fn set_status(&self, id: i64, status: JobStatus) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE jobs SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(changed > 0)
    }

    // --- Reads ---

    pub fn list_jobs(&self, filter: &JobFilter, skip: usize, limit: usize) -> Result<Vec<StoredJob>> {
        let mut sql = format!("SELECT {} FROM jobs WHERE 1=1", JOB_COLUMNS);
        let mut values: Vec<Value> = Vec::new();

        if let Some(title) = &filter.title {
            values.push(Value::Text(contains_pattern(title)));
            sql.push_str(&format!(" AND title LIKE ?{} ESCAPE '\\'", values.len()));
        }
        if let Some(location) = &filter.location {
            values.push(Value::Text(contains_pattern(location)));
            sql.push_str(&format!(" AND location LIKE ?{} ESCAPE '\\'", values.len()));
        }
        if let Some(source) = &filter.source {
            values.push(Value::Text(source.clone()));
            sql.push_str(&format!(" AND source = ?{}", values.len()));
        }
        if let Some(status) = filter.status {
            values.push(Value::Text(status.as_str().to_string()));
            sql.push_str(&format!(" AND status = ?{}", values.len()));
        }

        values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        sql.push_str(&format!(" ORDER BY id ASC LIMIT ?{}", values.len()));
        values.push(Value::Integer(i64::try_from(skip).unwrap_or(i64::MAX)));
        sql.push_str(&format!(" OFFSET ?{}", values.len()));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), Self::row_to_job)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_job(&self, id: i64) -> Result<Option<StoredJob>> {
        let job = self
            .conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
                [id],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    pub fn count_jobs(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<StoredJob> {
        let emails: Option<String> = row.get(10)?;
        let status: String = row.get(15)?;
        Ok(StoredJob {
            id: row.get(0)?,
            record: CanonicalJobRecord {
                site_id: row.get(1)?,
                title: row.get(2)?,
                company: row.get(3)?,
                location: row.get(4)?,
                date_posted: row.get(5)?,
                listing_url: row.get(6)?,
                application_url: row.get(7)?,
                description_text: row.get(8)?,
                source: row.get(9)?,
                emails: emails.and_then(|json| serde_json::from_str(&json).ok()),
                salary_text: row.get(11)?,
                job_type: row.get(12)?,
                is_remote: row.get(13)?,
                scraped_at: row.get(14)?,
                status: status.parse().unwrap_or_default(),
            },
        })
    }
}

/// Insert unless a row already holds this `site_id` or `listing_url`.
/// Returns whether a row was written.
fn insert_if_new(conn: &Connection, record: &CanonicalJobRecord) -> Result<bool> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM jobs WHERE site_id = ?1 OR listing_url = ?2 LIMIT 1",
            params![record.site_id, record.listing_url],
            |row| row.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Ok(false);
    }

    let emails = record.emails.as_ref().map(serde_json::to_string).transpose()?;
    let changed = conn.execute(
        "INSERT OR IGNORE INTO jobs (
            site_id, title, company, location, date_posted, listing_url, application_url,
            description_text, source, emails, salary_text, job_type, is_remote, scraped_at, status
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            record.site_id,
            record.title,
            record.company,
            record.location,
            record.date_posted,
            record.listing_url,
            record.application_url,
            record.description_text,
            record.source,
            emails,
            record.salary_text,
            record.job_type,
            record.is_remote,
            record.scraped_at,
            record.status.as_str(),
        ],
    )?;
    Ok(changed > 0)
}

fn record_key(record: &CanonicalJobRecord) -> String {
    if !record.site_id.trim().is_empty() {
        record.site_id.clone()
    } else if !record.listing_url.trim().is_empty() {
        record.listing_url.clone()
    } else {
        record.title.clone().unwrap_or_else(|| "<unidentified>".to_string())
    }
}

/// LIKE pattern matching `needle` as a literal substring.
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
