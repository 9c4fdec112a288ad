//! Ollama backend for local models.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::{Value, json};

use super::trait_def::{GenerateRequest, Generator};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Local models degrade past this; requests are capped regardless of what
/// the caller asks for.
const MAX_LOCAL_TOKENS: u32 = 1500;

pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaGenerator {
    pub fn new(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            model: model.into(),
            temperature,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        let body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": {
                "num_predict": request.max_tokens.min(MAX_LOCAL_TOKENS),
                "temperature": self.temperature,
            },
        });

        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("ollama request failed")?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .context("failed to decode ollama response")?;

        if !status.is_success() {
            bail!("ollama returned {status}: {payload}");
        }

        let text = payload["message"]["content"]
            .as_str()
            .context("ollama response had no message content")?;

        Ok(text.to_owned())
    }
}
