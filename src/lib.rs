//! Career Coach: streaming, enriched answers for a career-coaching chat.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
