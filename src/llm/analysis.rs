use async_trait::async_trait;
use log::{ info, warn };
use rllm::builder::LLMBuilder;
use rllm::chat::{ ChatMessage, ChatRole, MessageType };
use rllm::LLMProvider;
use std::sync::Arc;
use thiserror::Error;

use super::geocode::Geocoder;
use super::LlmConfig;
use crate::config::prompt::PromptConfig;
use crate::models::analysis::{ AnalysisResult, VisualizationType };

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis model is misconfigured: {0}")]
    Config(String),
    #[error("analysis model call failed: {0}")]
    Llm(String),
    #[error("analysis reply contained no JSON object")]
    NoJson,
    #[error("analysis reply was not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("geocoding request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geocoding failed: {0}")]
    Geocoder(String),
}

/// The text-analysis capability: turns an assistant answer into the
/// visualization payload.
#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<AnalysisResult, AnalysisError>;
}

/// Outermost `{ ... }` span of a model reply, which may wrap its JSON in
/// prose or code fences.
pub fn extract_json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

/// Analyzer backed by any rllm chat provider, with a geocoder filling in
/// coordinates the model left out.
pub struct LlmAnalyzer {
    llm: Box<dyn LLMProvider + Send + Sync>,
    model: String,
    prompts: Arc<PromptConfig>,
    geocoder: Option<Arc<dyn Geocoder>>,
}

impl LlmAnalyzer {
    pub fn from_config(
        config: &LlmConfig,
        prompts: Arc<PromptConfig>,
        geocoder: Option<Arc<dyn Geocoder>>
    ) -> Result<Self, AnalysisError> {
        let api_key = config.api_key.clone().filter(|k| !k.is_empty());
        if config.llm_type.requires_api_key() && api_key.is_none() {
            return Err(
                AnalysisError::Config(format!("{:?} analysis requires an API key", config.llm_type))
            );
        }
        let model = config.model_or_default();

        let mut builder = LLMBuilder::new()
            .backend(config.llm_type.backend())
            .model(&model)
            .stream(false);

        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        if let Some(url) = &config.base_url {
            builder = builder.base_url(url);
        }
        if let Some(temp) = config.temperature {
            builder = builder.temperature(temp);
        }

        let llm = builder.build().map_err(|e| AnalysisError::Config(e.to_string()))?;

        Ok(Self {
            llm,
            model,
            prompts,
            geocoder,
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String, AnalysisError> {
        let messages = vec![ChatMessage {
            role: ChatRole::User,
            content: prompt.to_string(),
            message_type: MessageType::Text,
        }];
        let resp = self.llm.chat(&messages).await.map_err(|e| AnalysisError::Llm(e.to_string()))?;
        Ok(
            resp
                .text()
                .map(|s| s.to_string())
                .unwrap_or_else(|| resp.to_string())
        )
    }

    async fn resolve_coordinates(&self, result: &mut AnalysisResult) {
        let geocoder = match &self.geocoder {
            Some(g) => g,
            None => {
                return;
            }
        };

        for entry in result.map_data.iter_mut() {
            if entry.lat.is_some() && entry.lng.is_some() {
                continue;
            }
            let query = entry
                .resolved_address()
                .or(entry.name.as_deref())
                .map(str::to_string);
            let Some(query) = query else {
                continue;
            };

            match geocoder.geocode(&query).await {
                Ok(Some(hit)) => {
                    entry.lat = Some(hit.coordinates.lat);
                    entry.lng = Some(hit.coordinates.lng);
                    if entry.resolved_address().is_none() {
                        entry.formatted_address = hit.formatted_address;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Geocoding '{}' failed: {}", query, e),
            }
        }
    }
}

#[async_trait]
impl TextAnalyzer for LlmAnalyzer {
    async fn analyze(&self, text: &str) -> Result<AnalysisResult, AnalysisError> {
        info!("LlmAnalyzer::analyze() → model={} chars={}", self.model, text.len());
        let reply = self.complete(&self.prompts.analysis_request(text)).await?;
        let json = extract_json_object(&reply).ok_or(AnalysisError::NoJson)?;
        let mut result: AnalysisResult = serde_json::from_str(json)?;

        if result.visualization_type == VisualizationType::Map {
            self.resolve_coordinates(&mut result).await;
        }
        Ok(result)
    }
}
