//! Runtime settings and the user's search configuration.
//!
//! Nothing here is global: `Settings` and `SearchConfiguration` are plain
//! values handed to the pipeline by whoever runs it.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

pub const DEFAULT_SITES: [&str; 2] = ["indeed", "linkedin"];
pub const DEFAULT_RESULTS_WANTED: u32 = 10;
pub const DEFAULT_MAX_AGE_HOURS: u32 = 72;
pub const DEFAULT_COUNTRY: &str = "USA";
pub const DEFAULT_PROVIDER_URL: &str = "http://localhost:8000";
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 120;

// --- Runtime settings ---

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

/// Where things live: configuration file, database file, provider endpoint.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_path: PathBuf,
    pub db_path: PathBuf,
    pub provider: ProviderSettings,
}

impl Settings {
    /// Explicit values win, then environment variables, then defaults.
    pub fn resolve(
        config_path: Option<PathBuf>,
        db_path: Option<PathBuf>,
        provider_url: Option<String>,
    ) -> Self {
        let config_path = config_path
            .or_else(|| env::var_os("AUTOCV_CONFIG").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config.json"));
        let db_path = db_path
            .or_else(|| env::var_os("AUTOCV_DB").map(PathBuf::from))
            .unwrap_or_else(default_db_path);
        let base_url = provider_url
            .or_else(|| env::var("JOBSPY_API_URL").ok())
            .unwrap_or_else(|| DEFAULT_PROVIDER_URL.to_string());
        let timeout_secs = env::var("JOBSPY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PROVIDER_TIMEOUT_SECS);

        Self {
            config_path,
            db_path,
            provider: ProviderSettings {
                base_url,
                api_key: env::var("JOBSPY_API_KEY").ok().filter(|k| !k.trim().is_empty()),
                timeout_secs,
            },
        }
    }
}

fn default_db_path() -> PathBuf {
    // Use XDG data directory or fallback
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "autocv") {
        proj_dirs.data_dir().join("job_listings.db")
    } else {
        PathBuf::from("job_listings.db")
    }
}

// --- Search configuration ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptionFormat {
    #[default]
    Markdown,
    Html,
    Plain,
}

/// What the user wants searched: every role in every location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfiguration {
    pub roles: Vec<String>,
    pub locations: Vec<String>,
    #[serde(default)]
    pub sites: Option<Vec<String>>,
    #[serde(default)]
    pub results_wanted: Option<u32>,
    #[serde(default)]
    pub max_age_hours: Option<u32>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub fetch_full_description: Option<bool>,
    #[serde(default)]
    pub remote_only: Option<bool>,
    #[serde(default)]
    pub easy_apply_only: Option<bool>,
    #[serde(default)]
    pub description_format: Option<DescriptionFormat>,
}

impl SearchConfiguration {
    pub fn new(roles: Vec<String>, locations: Vec<String>) -> Self {
        Self {
            roles,
            locations,
            sites: None,
            results_wanted: None,
            max_age_hours: None,
            country: None,
            fetch_full_description: None,
            remote_only: None,
            easy_apply_only: None,
            description_format: None,
        }
    }

    /// Roles with blank entries dropped.
    pub fn effective_roles(&self) -> Vec<&str> {
        non_blank(&self.roles)
    }

    /// Locations with blank entries dropped.
    pub fn effective_locations(&self) -> Vec<&str> {
        non_blank(&self.locations)
    }

    /// Both lists need at least one non-blank entry.
    pub fn validate(&self) -> Result<()> {
        if self.effective_roles().is_empty() {
            return Err(PipelineError::config(
                "at least one non-empty role is required",
            ));
        }
        if self.effective_locations().is_empty() {
            return Err(PipelineError::config(
                "at least one non-empty location is required",
            ));
        }
        Ok(())
    }

    pub fn resolved_sites(&self) -> Vec<String> {
        match &self.sites {
            Some(sites) if !non_blank(sites).is_empty() => {
                non_blank(sites).into_iter().map(str::to_string).collect()
            }
            _ => {
                info!("No sites configured, using default sites: {:?}", DEFAULT_SITES);
                DEFAULT_SITES.iter().map(|s| s.to_string()).collect()
            }
        }
    }

    pub fn resolved_country(&self) -> String {
        self.country
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_COUNTRY)
            .to_string()
    }
}

fn non_blank(values: &[String]) -> Vec<&str> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect()
}

// --- config.json layout ---

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    personal_info: Option<PersonalInfo>,
    #[serde(default)]
    job_preferences: Option<JobPreferences>,
}

#[derive(Debug, Default, Deserialize)]
struct PersonalInfo {
    #[serde(default)]
    address: Option<Address>,
}

#[derive(Debug, Default, Deserialize)]
struct Address {
    #[serde(default, alias = "Country")]
    country: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct JobPreferences {
    #[serde(default)]
    desired_roles: Vec<String>,
    #[serde(default)]
    target_locations: Vec<String>,
    #[serde(default)]
    sites_to_scrape: Option<Vec<String>>,
    #[serde(default)]
    results_wanted: Option<u32>,
    #[serde(default)]
    hours_old: Option<u32>,
    #[serde(default)]
    country_indeed: Option<String>,
    #[serde(default)]
    linkedin_fetch_description: Option<bool>,
    #[serde(default)]
    is_remote: Option<bool>,
    #[serde(default)]
    easy_apply: Option<bool>,
    #[serde(default)]
    description_format: Option<DescriptionFormat>,
}

/// Load the search configuration from a `config.json` file.
pub fn load_search_config(path: &Path) -> Result<SearchConfiguration> {
    let content = fs::read_to_string(path).map_err(|e| {
        PipelineError::config(format!(
            "cannot read configuration file '{}': {}",
            path.display(),
            e
        ))
    })?;
    let config = parse_search_config(&content).map_err(|e| match e {
        PipelineError::Config(msg) => {
            PipelineError::config(format!("{} ({})", msg, path.display()))
        }
        other => other,
    })?;
    info!("Configuration loaded from '{}'", path.display());
    Ok(config)
}

pub fn parse_search_config(content: &str) -> Result<SearchConfiguration> {
    let file: ConfigFile = serde_json::from_str(content)
        .map_err(|e| PipelineError::config(format!("malformed configuration JSON: {}", e)))?;
    let prefs = file
        .job_preferences
        .ok_or_else(|| PipelineError::config("'job_preferences' section is missing"))?;

    let address_country = file
        .personal_info
        .and_then(|p| p.address)
        .and_then(|a| a.country);
    let country = resolve_country(prefs.country_indeed.as_deref(), address_country.as_deref());

    Ok(SearchConfiguration {
        roles: prefs.desired_roles,
        locations: prefs.target_locations,
        sites: prefs.sites_to_scrape,
        results_wanted: prefs.results_wanted,
        max_age_hours: prefs.hours_old,
        country: Some(country),
        fetch_full_description: prefs.linkedin_fetch_description,
        remote_only: prefs.is_remote,
        easy_apply_only: prefs.easy_apply,
        description_format: prefs.description_format,
    })
}

/// Explicit country, then the user's address, then the default.
fn resolve_country(explicit: Option<&str>, address: Option<&str>) -> String {
    if let Some(country) = explicit.map(str::trim).filter(|c| !c.is_empty()) {
        debug!("Country '{}' from job_preferences.country_indeed", country);
        return country.to_string();
    }
    if let Some(raw) = address.map(str::trim).filter(|c| !c.is_empty()) {
        if let Some(country) = country_alias(raw) {
            debug!("Country '{}' from personal_info.address.country", country);
            return country.to_string();
        }
        debug!("Unrecognised address country '{}', using default", raw);
    }
    debug!("Country '{}' from default", DEFAULT_COUNTRY);
    DEFAULT_COUNTRY.to_string()
}

fn country_alias(raw: &str) -> Option<&'static str> {
    match raw.to_lowercase().as_str() {
        "us" | "usa" | "united states" | "united states of america" => Some("USA"),
        "uk" | "gb" | "united kingdom" | "great britain" => Some("UK"),
        "canada" | "ca" => Some("Canada"),
        "germany" | "de" => Some("Germany"),
        "france" | "fr" => Some("France"),
        "india" | "in" => Some("India"),
        "australia" | "au" => Some("Australia"),
        "netherlands" | "nl" => Some("Netherlands"),
        "ireland" | "ie" => Some("Ireland"),
        _ => None,
    }
}
