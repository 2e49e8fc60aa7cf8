use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use log::info;

pub const DEFAULT_ANALYSIS_PROMPT: &str =
    r#"You are a data visualization expert analyzing ride-sharing responses from Austin, TX. Your job is to:

1. Extract addresses/locations mentioned in the text
2. Extract numerical data (trip counts, distances, percentages, etc.)
3. Determine the best visualization approach
4. Return structured JSON for visualization

VISUALIZATION TYPES:
- "map": For location-based data
- "none": When no location data is available

RESPONSE FORMAT (JSON only):
{
  "visualizationType": "map" | "none",
  "mapData": [
    {
      "name": "Location Name",
      "address": "Original Address",
      "lat": number | null,
      "lng": number | null,
      "visits": number,
      "category": "inferred category"
    }
  ],
  "reasoning": "Brief explanation of visualization choice"
}

INSTRUCTIONS:
1. Only fill lat/lng when you are certain; otherwise use null and give the fullest address you can
2. Extract trip counts, distances, or other numerical data for display in location cards
3. Infer categories (Entertainment, Restaurant, etc.) from context
4. Only create map visualizations - NO CHARTS OR GRAPHS
5. Keep locations in the order they appear in the text
6. ALWAYS return valid JSON only

EXAMPLES:
Input: "The most popular drop-off location was 403 E 6th St, Austin, TX with 64 trips"
- Extract: location + trip count
- Choose: "map"

Input: "Top locations: Wiggle Room (234 trips), Shakespeare's (198 trips), Aquarium (174 trips)"
- Extract: multiple locations + trip counts
- Choose: "map"

Input: "Average distance for 18-24 is 2.82 miles, 25-34 is 5.87 miles"
- No locations
- Choose: "none"

Now analyze this data:"#;

#[derive(Debug)]
pub enum PromptError {
    EmptyPrompt(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::EmptyPrompt(path) => write!(f, "Analysis prompt in '{}' is empty", path),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PromptConfig {
    pub analysis_prompt: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            analysis_prompt: DEFAULT_ANALYSIS_PROMPT.to_string(),
        }
    }
}

impl PromptConfig {
    pub fn analysis_request(&self, answer_text: &str) -> String {
        format!("{}\n\n{}", self.analysis_prompt, answer_text)
    }
}

/// Reads the prompt override at `path`, falling back to the built-in prompt
/// when no file exists there.
pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    let path = path.as_ref();
    let file_content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No prompts file at '{}', using built-in analysis prompt", path.display());
            return Ok(Arc::new(PromptConfig::default()));
        }
        Err(e) => {
            return Err(e.into());
        }
    };

    let config: PromptConfig = serde_json::from_str(&file_content)?;
    if config.analysis_prompt.trim().is_empty() {
        return Err(PromptError::EmptyPrompt(path.display().to_string()));
    }
    info!("Loaded analysis prompt from '{}'", path.display());
    Ok(Arc::new(config))
}
