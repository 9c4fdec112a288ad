//! Text-generation backends and the adapter trait over them.

mod anthropic;
mod ollama;
mod openai;
pub mod prompts;
mod trait_def;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;

pub use anthropic::AnthropicGenerator;
pub use ollama::OllamaGenerator;
pub use openai::OpenAiGenerator;
pub use trait_def::{GenerateRequest, Generator};

use crate::error::EngineError;

/// Supported generation providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    OpenAi,
    Ollama,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        };
        f.write_str(s)
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => bail!("unsupported generation provider: {other:?}"),
        }
    }
}

impl Provider {
    fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => "claude-3-5-sonnet-20241022",
            Self::OpenAi => "gpt-4o",
            Self::Ollama => "mistral",
        }
    }

    fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Ollama => None,
        }
    }
}

/// Configuration for selecting and building a generation backend.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub provider: Provider,
    /// Model name; falls back to the provider default when `None`.
    pub model: Option<String>,
    /// API key; falls back to the provider's environment variable.
    pub api_key: Option<String>,
    /// Base URL override for OpenAI-compatible or local servers.
    pub base_url: Option<String>,
    pub temperature: f32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Anthropic,
            model: None,
            api_key: None,
            base_url: None,
            temperature: 0.7,
        }
    }
}

/// Build the configured backend.
///
/// The API key resolution chain is config value, then the provider's
/// environment variable.
pub fn build_generator(config: &GeneratorConfig) -> Result<Arc<dyn Generator>> {
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| config.provider.default_model().to_owned());

    let api_key = match config.provider.api_key_env() {
        Some(env_name) => match &config.api_key {
            Some(key) => key.clone(),
            None => std::env::var(env_name)
                .with_context(|| format!("no API key configured and {env_name} is unset"))?,
        },
        None => String::new(),
    };

    let generator: Arc<dyn Generator> = match config.provider {
        Provider::Anthropic => {
            Arc::new(AnthropicGenerator::new(api_key, model, config.temperature))
        }
        Provider::OpenAi => {
            let mut backend = OpenAiGenerator::new(api_key, model, config.temperature);
            if let Some(base_url) = &config.base_url {
                backend = backend.with_base_url(base_url);
            }
            Arc::new(backend)
        }
        Provider::Ollama => {
            let mut backend = OllamaGenerator::new(model, config.temperature);
            if let Some(base_url) = &config.base_url {
                backend = backend.with_base_url(base_url);
            }
            Arc::new(backend)
        }
    };

    Ok(generator)
}

/// Run a generation call under the engine's deadline and cancellation
/// token.
///
/// All three exits (backend failure, deadline elapsed, cancellation) map to
/// [`EngineError::Backend`]; the caller rolls back lifecycle state the same
/// way for each.
pub async fn generate_bounded(
    generator: &dyn Generator,
    request: &GenerateRequest,
    deadline: Duration,
    cancel: &CancellationToken,
) -> Result<String, EngineError> {
    tokio::select! {
        result = tokio::time::timeout(deadline, generator.generate(request)) => match result {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(EngineError::Backend(format!("{e:#}"))),
            Err(_) => Err(EngineError::Backend(format!(
                "backend call exceeded the {}s deadline",
                deadline.as_secs()
            ))),
        },
        _ = cancel.cancelled() => Err(EngineError::Backend("backend call cancelled".to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[test]
    fn provider_parse_roundtrip() {
        for p in [Provider::Anthropic, Provider::OpenAi, Provider::Ollama] {
            let parsed: Provider = p.to_string().parse().expect("should parse");
            assert_eq!(p, parsed);
        }
        assert!("hal9000".parse::<Provider>().is_err());
    }

    struct SlowGenerator;

    #[async_trait]
    impl Generator for SlowGenerator {
        fn name(&self) -> &str {
            "slow"
        }

        async fn generate(&self, _request: &GenerateRequest) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".to_owned())
        }
    }

    #[tokio::test]
    async fn deadline_bounds_the_call() {
        let request = GenerateRequest::new("p", 10);
        let cancel = CancellationToken::new();
        let result = generate_bounded(
            &SlowGenerator,
            &request,
            Duration::from_millis(20),
            &cancel,
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), "backend_error");
        assert!(err.to_string().contains("deadline"));
    }

    #[tokio::test]
    async fn cancellation_aborts_the_call() {
        let request = GenerateRequest::new("p", 10);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = generate_bounded(
            &SlowGenerator,
            &request,
            Duration::from_secs(60),
            &cancel,
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }
}
