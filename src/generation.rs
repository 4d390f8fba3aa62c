//! Generation providers.
//!
//! | Config Value | Provider |
//! |-------------|----------|
//! | `"disabled"` | [`DisabledGenerator`] (every call fails) |
//! | `"openai"` | [`OpenAIGenerator`] (`/chat/completions`) |
//! | `"ollama"` | [`OllamaGenerator`] (`/api/generate`) |
//!
//! JSON replies are requested natively where the provider supports it
//! (`response_format` for OpenAI, `format` for Ollama).

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use plan_rag_core::generation::{GenerateOptions, Generator, ResponseFormat};

use crate::config::GenerationConfig;

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

/// Used when `generation.provider = "disabled"`.
///
/// Enrichment is skipped and queries fail with an upstream error.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str, _options: &GenerateOptions) -> Result<String> {
        bail!("Generation provider is disabled. Set [generation] provider in config.")
    }
}

// ============ OpenAI ============

pub struct OpenAIGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let base_url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string());

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        let start = std::time::Instant::now();
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });
        if let Some(t) = options.temperature.or(self.temperature) {
            body["temperature"] = serde_json::json!(t);
        }
        if options.format == ResponseFormat::Json {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "OpenAI API error");
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        let content = parse_openai_chat(&json)?;
        tracing::debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "OpenAI chat completion"
        );
        Ok(content)
    }
}

fn parse_openai_chat(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

// ============ Ollama ============

pub struct OllamaGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: Option<f32>,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        Ok(Self {
            client: reqwest::Client::new(),
            url,
            model,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        if let Some(t) = options.temperature.or(self.temperature) {
            body["options"] = serde_json::json!({"temperature": t});
        }
        if options.format == ResponseFormat::Json {
            body["format"] = serde_json::json!("json");
        }

        let response = self
            .client
            .post(format!("{}/api/generate", self.url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url,
                    e
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response"))
    }
}
