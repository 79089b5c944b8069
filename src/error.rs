//! Error types for the career coach.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Stream from {provider} failed: {reason}")]
    StreamFailed { provider: String, reason: String },
}

/// Errors raised while running a conversational turn.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The query needs a location and none was provided. Recoverable by the user.
    #[error("Location required to answer this question")]
    LocationRequired,

    #[error("Preamble failed: {0}")]
    Preamble(String),

    #[error("Listing match failed: {0}")]
    Listings(String),

    #[error("Follow-up generation failed: {0}")]
    Followups(String),

    #[error("Catalog load failed: {0}")]
    Catalog(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

impl PipelineError {
    /// Whether the user can fix this themselves (as opposed to a server fault).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PipelineError::LocationRequired)
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
