//! Generative model capability.
//!
//! The pipeline talks to language models only through [`Generator`]; the
//! app crate provides OpenAI and Ollama implementations.

use anyhow::Result;
use async_trait::async_trait;

/// Expected shape of the model reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseFormat {
    #[default]
    Text,
    /// Ask the provider for a JSON object (`application/json`).
    Json,
}

/// Per-call generation options.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub format: ResponseFormat,
    pub temperature: Option<f32>,
}

impl GenerateOptions {
    pub fn json() -> Self {
        Self {
            format: ResponseFormat::Json,
            temperature: None,
        }
    }
}

/// A single-prompt text generator.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String>;
}

/// Strip Markdown code fences that models like to wrap JSON in.
pub fn json_payload(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
