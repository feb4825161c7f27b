use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;

use crate::error::{PipelineError, Result};
use crate::models::StoredJob;

// --- Generator trait ---

pub trait TextGenerator {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;
    fn model_name(&self) -> &str;
}

// --- Gemini provider ---

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug)]
pub struct GeminiClient {
    api_key: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl GeminiClient {
    /// Build a client from `GOOGLE_API_KEY`.
    pub fn from_env(model_id: impl Into<String>) -> Result<Self> {
        let api_key = env::var("GOOGLE_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::config(
                    "GOOGLE_API_KEY environment variable not set. Set it with: export GOOGLE_API_KEY=your-key-here",
                )
            })?;
        Ok(Self {
            api_key,
            model_id: model_id.into(),
            client: reqwest::blocking::Client::new(),
        })
    }
}

impl TextGenerator for GeminiClient {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: max_tokens,
            },
        };

        let url = format!("{}/{}:generateContent", GEMINI_API_BASE, self.model_id);
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(PipelineError::generation(format!(
                "Gemini API request failed with status {}: {}",
                status, error_text
            )));
        }

        let api_response: GeminiResponse = response.json()?;
        api_response
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text.filter(|t| !t.trim().is_empty()))
            .ok_or_else(|| PipelineError::generation("No content in Gemini API response"))
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- CV tailoring ---

const CODE_FENCE: &str = r"(?s)^\s*```(?:[A-Za-z]+\n|\n)?(.*?)\n?```\s*$";

/// Drop a markdown code fence wrapped around the whole reply.
pub fn strip_code_fence(text: &str) -> Result<String> {
    let re = Regex::new(CODE_FENCE)?;
    let stripped = match re.captures(text) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => text,
    };
    Ok(stripped.trim().to_string())
}

fn job_text(job: &StoredJob) -> String {
    let record = &job.record;
    let mut text = String::new();
    if let Some(title) = &record.title {
        text.push_str(&format!("Title: {}\n", title));
    }
    if let Some(company) = &record.company {
        text.push_str(&format!("Company: {}\n", company));
    }
    if let Some(location) = &record.location {
        text.push_str(&format!("Location: {}\n", location));
    }
    if let Some(job_type) = &record.job_type {
        text.push_str(&format!("Type: {}\n", job_type));
    }
    if let Some(description) = &record.description_text {
        text.push('\n');
        text.push_str(description);
    }
    text
}

/// Rewrite `cv_text` for one stored listing.
pub fn tailor_cv(generator: &dyn TextGenerator, cv_text: &str, job: &StoredJob) -> Result<String> {
    if cv_text.trim().is_empty() {
        return Err(PipelineError::config("CV text is empty"));
    }
    let prompt = format!(
        "You are an expert CV writer. Rewrite the CV below so it is tailored to the job posting.\n\n\
        RULES:\n\
        - Only use facts present in the CV\n\
        - Emphasize the experience and skills the posting asks for\n\
        - Output the complete CV and nothing else\n\n\
        --- BEGIN CV ---\n{}\n--- END CV ---\n\n\
        --- BEGIN JOB POSTING ---\n{}\n--- END JOB POSTING ---\n",
        cv_text.trim(),
        job_text(job)
    );

    info!(
        "Tailoring CV for job {} with {}",
        job.id,
        generator.model_name()
    );
    let reply = generator.complete(&prompt, 8192)?;
    let tailored = strip_code_fence(&reply)?;
    if tailored.is_empty() {
        return Err(PipelineError::generation("generator returned an empty CV"));
    }
    Ok(tailored)
}
