//! The `Generator` trait -- the adapter interface for text-generation
//! backends.
//!
//! Each concrete backend (Anthropic, OpenAI, Ollama) implements this trait.
//! The trait is object-safe so the engine can hold it as
//! `Arc<dyn Generator>`, with the backend selected by configuration at
//! process start.

use anyhow::Result;
use async_trait::async_trait;

/// A single generation request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// The user-facing prompt.
    pub prompt: String,
    /// Optional system prompt framing the task.
    pub system_prompt: Option<String>,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            max_tokens,
        }
    }

    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// Adapter interface for text-generation providers.
///
/// Failures are reported as-is and never retried here; retry policy, if
/// any, belongs to the backend or an outer supervisor.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Human-readable backend name (e.g. "anthropic").
    fn name(&self) -> &str;

    /// Generate text for the request.
    async fn generate(&self, request: &GenerateRequest) -> Result<String>;
}

// Compile-time assertion: Generator must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Generator) {}
};
