//! Collaborators consumed by the turn pipeline.
//!
//! The orchestrator only sees these traits; each has one simple concrete
//! implementation here so the service runs end to end:
//! - `BasicPreamble`: history normalization, location check, domain guard, knowledge lookup
//! - `CatalogListingMatcher`: keyword search over a JSON listing catalog
//! - `LlmFollowupGenerator`: LLM-written follow-up questions

pub mod followups;
pub mod listings;
pub mod preamble;

pub use followups::LlmFollowupGenerator;
pub use listings::CatalogListingMatcher;
pub use preamble::{BasicPreamble, KnowledgeEntry};

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::pipeline::types::{FeaturedListing, Message, PreambleResult};

/// Builds the grounded context for one turn.
#[async_trait]
pub trait PreambleBuilder: Send + Sync {
    /// Fails with `PipelineError::LocationRequired` when the query needs a
    /// location that was not given.
    async fn build(
        &self,
        conversation: &[Message],
        location: Option<&str>,
    ) -> Result<PreambleResult, PipelineError>;
}

/// Finds marketplace listings relevant to a query.
#[async_trait]
pub trait ListingMatcher: Send + Sync {
    async fn find_featured(
        &self,
        query: &str,
        location: Option<&str>,
    ) -> Result<Vec<FeaturedListing>, PipelineError>;
}

/// Suggests short follow-up questions for the user.
#[async_trait]
pub trait FollowupGenerator: Send + Sync {
    async fn generate(
        &self,
        history: &[Message],
        final_answer: &str,
        location: Option<&str>,
    ) -> Result<Vec<String>, PipelineError>;
}
