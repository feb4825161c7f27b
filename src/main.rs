use anyhow::{Context, Result, anyhow};
use autocv::ai::{DEFAULT_GEMINI_MODEL, GeminiClient, tailor_cv};
use autocv::config::Settings;
use autocv::cv::load_cv;
use autocv::db::Database;
use autocv::models::{JobFilter, JobStatus, RunStatus, RunSummary, StoredJob};
use autocv::pipeline::run_pipeline;
use autocv::source::HttpJobSource;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "autocv")]
#[command(about = "Job listing ingestion - fetch, deduplicate, track and tailor")]
struct Cli {
    /// Path to config.json
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the SQLite database
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Base URL of the JobSpy service
    #[arg(long, global = true)]
    provider_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Fetch listings for every configured role and location and store new ones
    Scrape {
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored jobs
    List {
        /// Filter by title substring
        #[arg(short, long)]
        title: Option<String>,

        /// Filter by location substring
        #[arg(short, long)]
        location: Option<String>,

        /// Filter by source site (indeed, linkedin, ...)
        #[arg(long)]
        source: Option<String>,

        /// Filter by status (new, interested, applied, interviewing, offer, rejected, ignored)
        #[arg(short, long)]
        status: Option<JobStatus>,

        /// Number of jobs to skip
        #[arg(long, default_value = "0")]
        skip: usize,

        /// Maximum number of jobs to show
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },

    /// Show job details
    Show {
        /// Job ID
        id: i64,
    },

    /// Set the workflow status of a job
    Status {
        /// Job ID
        id: i64,

        /// New status
        status: JobStatus,
    },

    /// Generate a CV tailored to a stored job
    Tailor {
        /// Job ID to tailor the CV for
        id: i64,

        /// Path to the base CV (.txt, .md or .json)
        #[arg(long)]
        cv: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Gemini model to use
        #[arg(long, default_value = DEFAULT_GEMINI_MODEL)]
        model: String,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings::resolve(cli.config, cli.db, cli.provider_url);

    match cli.command {
        Commands::Init => {
            let db = open_db(&settings)?;
            db.init()?;
            println!("Database initialized at {}", settings.db_path.display());
        }

        Commands::Scrape { json } => {
            let source = HttpJobSource::new(&settings.provider)?;
            log::info!("Using job provider at {}", source.endpoint());
            let summary = run_pipeline(&settings, &source, None);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
            if summary.status == RunStatus::Failed {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::List {
            title,
            location,
            source,
            status,
            skip,
            limit,
        } => {
            let db = open_db(&settings)?;
            db.ensure_initialized()?;
            let filter = JobFilter {
                title,
                location,
                source,
                status,
            };
            let jobs = db.list_jobs(&filter, skip, limit)?;
            let shown = jobs.len();
            if jobs.is_empty() {
                println!("No jobs found.");
            } else {
                println!(
                    "{:<6} {:<13} {:<30} {:<20} {:<18} {:<10}",
                    "ID", "STATUS", "TITLE", "COMPANY", "LOCATION", "POSTED"
                );
                println!("{}", "-".repeat(102));
                for job in jobs {
                    let record = &job.record;
                    println!(
                        "{:<6} {:<13} {:<30} {:<20} {:<18} {:<10}",
                        job.id,
                        record.status,
                        truncate(record.title.as_deref().unwrap_or("-"), 28),
                        truncate(record.company.as_deref().unwrap_or("-"), 18),
                        truncate(record.location.as_deref().unwrap_or("-"), 16),
                        record.date_posted.as_deref().unwrap_or("-")
                    );
                }
                println!("\n{} shown, {} stored", shown, db.count_jobs()?);
            }
        }

        Commands::Show { id } => {
            let db = open_db(&settings)?;
            db.ensure_initialized()?;
            match db.get_job(id)? {
                Some(job) => print_job(&job),
                None => println!("Job #{} not found.", id),
            }
        }

        Commands::Status { id, status } => {
            let db = open_db(&settings)?;
            db.ensure_initialized()?;
            if db.set_status(id, status)? {
                println!("Job #{} marked as {}.", id, status);
            } else {
                println!("Job #{} not found.", id);
            }
        }

        Commands::Tailor {
            id,
            cv,
            output,
            model,
        } => {
            let db = open_db(&settings)?;
            db.ensure_initialized()?;
            let job = db
                .get_job(id)?
                .ok_or_else(|| anyhow!("Job #{} not found", id))?;
            let cv_text = load_cv(&cv)?;
            let generator = GeminiClient::from_env(model)?;
            let tailored = tailor_cv(&generator, &cv_text, &job)?;

            if let Some(out_path) = output {
                std::fs::write(&out_path, &tailored)
                    .with_context(|| format!("Failed to write to {}", out_path.display()))?;
                println!("Tailored CV saved to: {}", out_path.display());
            } else {
                println!("Tailored CV for job #{}", id);
                println!("\n--- Tailored CV ---\n{}", tailored);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn open_db(settings: &Settings) -> Result<Database> {
    Database::open(&settings.db_path)
        .with_context(|| format!("Failed to open database at {}", settings.db_path.display()))
}

fn print_summary(summary: &RunSummary) {
    println!("\nRun status: {}", summary.status);
    println!("  Jobs fetched:      {}", summary.total_jobs_fetched);
    println!("  New jobs added:    {}", summary.new_jobs_added);
    println!("  Duplicates:        {}", summary.duplicate_skipped);
    if summary.records_rejected > 0 {
        println!("  Rejected:          {}", summary.records_rejected);
    }
    if summary.records_errored > 0 {
        println!("  Storage errors:    {}", summary.records_errored);
    }
    if summary.failed_queries > 0 {
        println!("  Failed queries:    {}", summary.failed_queries);
    }
    if !summary.errors.is_empty() {
        println!("\nIssues:");
        for error in &summary.errors {
            println!("  - {}", error);
        }
    }
}

fn print_job(job: &StoredJob) {
    let record = &job.record;
    println!("Job #{}", job.id);
    println!("Title: {}", record.title.as_deref().unwrap_or("-"));
    if let Some(company) = &record.company {
        println!("Company: {}", company);
    }
    if let Some(location) = &record.location {
        println!("Location: {}", location);
    }
    println!("Status: {}", record.status);
    println!("Source: {} ({})", record.source, record.site_id);
    println!("URL: {}", record.listing_url);
    if let Some(url) = &record.application_url {
        println!("Apply: {}", url);
    }
    if let Some(posted) = &record.date_posted {
        println!("Posted: {}", posted);
    }
    if let Some(job_type) = &record.job_type {
        println!("Type: {}", job_type);
    }
    if let Some(remote) = record.is_remote {
        println!("Remote: {}", if remote { "yes" } else { "no" });
    }
    if let Some(salary) = &record.salary_text {
        println!("Salary: {}", salary);
    }
    if let Some(emails) = &record.emails {
        println!("Emails: {}", emails.join(", "));
    }
    println!("Scraped: {}", record.scraped_at);
    if let Some(description) = &record.description_text {
        println!("\n--- Description ---");
        for line in textwrap::wrap(description, 80) {
            println!("{}", line);
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
