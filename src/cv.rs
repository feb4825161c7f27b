//! Reading the user's base CV from disk.

use log::info;
use std::fs;
use std::path::Path;

use crate::error::{PipelineError, Result};

/// Load a CV as prompt-ready text.
///
/// `.txt` and `.md` are read as-is, `.json` is re-serialized pretty so the
/// generator sees a stable layout. Anything else is rejected.
pub fn load_cv(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let text = match extension.as_str() {
        "txt" | "md" => read(path)?,
        "json" => {
            let value: serde_json::Value = serde_json::from_str(&read(path)?).map_err(|e| {
                PipelineError::config(format!("CV '{}' is not valid JSON: {}", path.display(), e))
            })?;
            serde_json::to_string_pretty(&value)?
        }
        other => {
            return Err(PipelineError::config(format!(
                "unsupported CV format '.{}' for '{}' (use .txt, .md or .json)",
                other,
                path.display()
            )));
        }
    };

    if text.trim().is_empty() {
        return Err(PipelineError::config(format!("CV '{}' is empty", path.display())));
    }
    info!("Loaded CV from '{}' ({} chars)", path.display(), text.len());
    Ok(text)
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| PipelineError::config(format!("cannot read CV '{}': {}", path.display(), e)))
}
