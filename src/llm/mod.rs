pub mod analysis;
pub mod extractor;
pub mod geocode;

use rllm::builder::LLMBackend;
use serde::{ Deserialize, Serialize };
use std::str::FromStr;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    Gemini,
    OpenAI,
    Ollama,
    Anthropic,
    DeepSeek,
    XAI,
    Groq,
}

impl LlmType {
    pub fn backend(self) -> LLMBackend {
        match self {
            LlmType::Gemini => LLMBackend::Google,
            LlmType::OpenAI => LLMBackend::OpenAI,
            LlmType::Ollama => LLMBackend::Ollama,
            LlmType::Anthropic => LLMBackend::Anthropic,
            LlmType::DeepSeek => LLMBackend::DeepSeek,
            LlmType::XAI => LLMBackend::XAI,
            LlmType::Groq => LLMBackend::Groq,
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            LlmType::Gemini => "gemini-2.5-flash",
            LlmType::OpenAI => "gpt-4o-mini",
            LlmType::Ollama => "llama3",
            LlmType::Anthropic => "claude-3-5-haiku-latest",
            LlmType::DeepSeek => "deepseek-chat",
            LlmType::XAI => "grok-2-latest",
            LlmType::Groq => "llama-3.1-8b-instant",
        }
    }

    pub fn requires_api_key(self) -> bool {
        self != LlmType::Ollama
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseLlmTypeError {
    message: String,
}

impl fmt::Display for ParseLlmTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseLlmTypeError {}
impl FromStr for LlmType {
    type Err = ParseLlmTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(LlmType::Gemini),
            "openai" => Ok(LlmType::OpenAI),
            "ollama" => Ok(LlmType::Ollama),
            "anthropic" => Ok(LlmType::Anthropic),
            "deepseek" => Ok(LlmType::DeepSeek),
            "xai" => Ok(LlmType::XAI),
            "groq" => Ok(LlmType::Groq),
            _ =>
                Err(ParseLlmTypeError {
                    message: format!("Invalid LLM type: '{}'", s),
                }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            llm_type: LlmType::Gemini,
            api_key: None,
            model: None,
            base_url: None,
            temperature: Some(0.2),
        }
    }
}

impl LlmConfig {
    pub fn model_or_default(&self) -> String {
        self.model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.llm_type.default_model().to_string())
    }
}
