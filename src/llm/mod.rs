//! Model access for coaching answers and follow-up suggestions.
//!
//! The pipeline only talks to `LlmProvider`. `create_provider` picks the
//! configured backend (Anthropic or OpenAI), builds its rig-core client and
//! wraps the completion model in `RigAdapter`, which serves both the
//! streamed answer and the one-shot follow-up call.

pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmBackend::Anthropic => "anthropic",
            LlmBackend::OpenAi => "openai",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmBackend::Anthropic => "claude-sonnet-4-20250514",
            LlmBackend::OpenAi => "gpt-4o",
        }
    }

    /// Environment variable holding the API key for this backend.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
            LlmBackend::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl std::str::FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(LlmBackend::Anthropic),
            "openai" => Ok(LlmBackend::OpenAi),
            other => Err(format!("unknown backend '{other}' (expected anthropic or openai)")),
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_provider(config),
        LlmBackend::OpenAi => create_openai_provider(config),
    }
}

fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret())
            .map_err(|e| client_error(LlmBackend::Anthropic, e))?;

    let model = client.completion_model(&config.model);
    tracing::info!(
        backend = LlmBackend::Anthropic.as_str(),
        model = %config.model,
        "LLM provider ready"
    );
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret())
            .map_err(|e| client_error(LlmBackend::OpenAi, e))?;

    let model = client.completion_model(&config.model);
    tracing::info!(
        backend = LlmBackend::OpenAi.as_str(),
        model = %config.model,
        "LLM provider ready"
    );
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

fn client_error(backend: LlmBackend, err: impl std::fmt::Display) -> LlmError {
    LlmError::RequestFailed {
        provider: backend.as_str().to_string(),
        reason: format!("client setup failed: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_providers_build_for_each_backend() {
        // Keys are only checked when a request is made.
        for (backend, model) in [
            (LlmBackend::Anthropic, "claude-sonnet-4-20250514"),
            (LlmBackend::OpenAi, "gpt-4o-mini"),
        ] {
            let config = LlmConfig {
                backend,
                api_key: secrecy::SecretString::from("test-key"),
                model: model.to_string(),
            };
            let provider = create_provider(&config).unwrap();
            assert_eq!(provider.model_name(), model);
        }
    }

    #[test]
    fn test_client_error_names_backend() {
        let err = client_error(LlmBackend::OpenAi, "bad base url");
        assert!(matches!(
            err,
            LlmError::RequestFailed { ref provider, ref reason }
                if provider == "openai" && reason.contains("bad base url")
        ));
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("Anthropic".parse::<LlmBackend>(), Ok(LlmBackend::Anthropic));
        assert_eq!(" openai ".parse::<LlmBackend>(), Ok(LlmBackend::OpenAi));
        assert!("gemini".parse::<LlmBackend>().is_err());
    }

    #[test]
    fn test_backend_defaults() {
        assert_eq!(LlmBackend::OpenAi.default_model(), "gpt-4o");
        assert_eq!(LlmBackend::Anthropic.api_key_var(), "ANTHROPIC_API_KEY");
    }
}
