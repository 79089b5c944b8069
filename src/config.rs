//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::pipeline::orchestrator::{ANSWER_MAX_TOKENS, ANSWER_TEMPERATURE, TurnConfig};

/// Default system prompt for the coach.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly, practical career coach. You help \
people explore careers, especially skilled trades, technical jobs and the training programs, \
apprenticeships and certifications that lead to them.\n\n\
Guidelines:\n\
- Give concrete, accurate information: what the job involves, typical pay ranges, training \
paths and how long they take.\n\
- Use any reference material provided in system messages before relying on general knowledge.\n\
- When the user's location is known, tailor your answer to that area.\n\
- Keep answers focused and easy to scan. Use short paragraphs and bullet points.\n\
- Stay on the topic of careers, education and job searching.";

/// Service configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct CoachConfig {
    pub llm: LlmConfig,
    pub port: u16,
    pub turn: TurnConfig,
    /// Optional JSON listing catalog.
    pub listings_path: Option<PathBuf>,
    /// Optional JSON knowledge base.
    pub knowledge_path: Option<PathBuf>,
    /// Most recent conversation turns kept for the model.
    pub max_history: usize,
    /// Directory for daily-rolling log files.
    pub log_dir: Option<PathBuf>,
}

impl CoachConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let backend: LlmBackend = parse_or(
            get("COACH_LLM_BACKEND"),
            "COACH_LLM_BACKEND",
            LlmBackend::Anthropic,
        )?;
        let api_key_var = backend.api_key_var();
        let api_key = get(api_key_var)
            .ok_or_else(|| ConfigError::MissingEnvVar(api_key_var.to_string()))?;
        let model = get("COACH_MODEL").unwrap_or_else(|| backend.default_model().to_string());

        let temperature: f32 = parse_or(
            get("COACH_TEMPERATURE"),
            "COACH_TEMPERATURE",
            ANSWER_TEMPERATURE,
        )?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidValue {
                key: "COACH_TEMPERATURE".to_string(),
                message: format!("{temperature} is outside 0.0..=2.0"),
            });
        }

        let turn = TurnConfig {
            system_prompt: get("COACH_SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            temperature,
            max_tokens: parse_or(get("COACH_MAX_TOKENS"), "COACH_MAX_TOKENS", ANSWER_MAX_TOKENS)?,
            stream_buffer: parse_or(get("COACH_STREAM_BUFFER"), "COACH_STREAM_BUFFER", 64)?,
        };

        Ok(Self {
            llm: LlmConfig {
                backend,
                api_key: SecretString::from(api_key),
                model,
            },
            port: parse_or(get("COACH_PORT"), "COACH_PORT", 8080)?,
            turn,
            listings_path: get("COACH_LISTINGS_PATH").map(PathBuf::from),
            knowledge_path: get("COACH_KNOWLEDGE_PATH").map(PathBuf::from),
            max_history: parse_or(get("COACH_MAX_HISTORY"), "COACH_MAX_HISTORY", 20)?,
            log_dir: get("COACH_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{value}': {e}"),
        }),
    }
}
