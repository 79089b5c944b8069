//! Post-completion enrichment.
//!
//! Runs once per streamed answer, after the last token:
//! 1. Featured listings (best effort)
//! 2. Next-steps normalization (only when the knowledge base was used;
//!    model-written steps are cut before listings are appended)
//! 3. Follow-up suggestions (defaults on failure)
//! 4. Final payload

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::collaborators::{FollowupGenerator, ListingMatcher};

use super::guard::default_followups;
use super::next_steps::{append_next_steps, strip_next_steps};
use super::types::{FeaturedListing, FinalPayload, Message, PreambleResult, cap_followups};

/// Everything the enricher needs from the preamble, owned so it can move
/// into the relay task.
#[derive(Debug, Clone)]
pub struct EnrichmentContext {
    pub last_user_raw: String,
    pub effective_location: Option<String>,
    pub used_internal_rag: bool,
    pub history: Vec<Message>,
}

impl From<&PreambleResult> for EnrichmentContext {
    fn from(preamble: &PreambleResult) -> Self {
        Self {
            last_user_raw: preamble.last_user_raw.clone(),
            effective_location: preamble.effective_location.clone(),
            used_internal_rag: preamble.used_internal_rag(),
            history: preamble.messages_for_llm.clone(),
        }
    }
}

/// Turns a raw model answer into the final payload.
#[derive(Clone)]
pub struct Enricher {
    listings: Arc<dyn ListingMatcher>,
    followups: Arc<dyn FollowupGenerator>,
}

impl Enricher {
    pub fn new(listings: Arc<dyn ListingMatcher>, followups: Arc<dyn FollowupGenerator>) -> Self {
        Self {
            listings,
            followups,
        }
    }

    pub async fn finalize(&self, raw_answer: String, ctx: &EnrichmentContext) -> FinalPayload {
        let location = ctx.effective_location.as_deref();
        // Cut model-written next steps before listings go on the end.
        let mut answer = if ctx.used_internal_rag {
            strip_next_steps(&raw_answer)
        } else {
            raw_answer
        };

        match self.listings.find_featured(&ctx.last_user_raw, location).await {
            Ok(listings) if !listings.is_empty() => {
                debug!(count = listings.len(), "Appending featured listings");
                answer.push_str(&featured_block(&listings, location));
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Listing match failed, continuing without listings");
            }
        }

        if ctx.used_internal_rag {
            answer = append_next_steps(&answer);
        }

        let mut history = ctx.history.clone();
        history.push(Message::assistant(answer.clone()));

        let followups = match self.followups.generate(&history, &answer, location).await {
            Ok(generated) => {
                let capped = cap_followups(generated);
                if capped.is_empty() {
                    default_followups()
                } else {
                    capped
                }
            }
            Err(e) => {
                warn!(error = %e, "Follow-up generation failed, using defaults");
                default_followups()
            }
        };

        info!(
            chars = answer.len(),
            followups = followups.len(),
            next_steps = ctx.used_internal_rag,
            "Answer enriched"
        );

        FinalPayload {
            final_answer: answer,
            followups,
        }
    }
}

/// Markdown block listing featured jobs and programs.
pub fn featured_block(listings: &[FeaturedListing], location: Option<&str>) -> String {
    let mut block = String::from("\n\n**Featured programs and jobs");
    if let Some(loc) = location {
        block.push_str(&format!(" near {loc}"));
    }
    block.push_str(":**");
    for listing in listings {
        block.push_str(&format!(
            "\n- {}, {} ({})",
            listing.title, listing.org, listing.location
        ));
    }
    block
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::PipelineError;
    use crate::llm::Role;
    use crate::pipeline::next_steps::{
        CANONICAL_NEXT_STEPS, count_next_steps_sections, normalize_next_steps,
    };

    struct FixedListings(Result<Vec<FeaturedListing>, String>);

    #[async_trait]
    impl ListingMatcher for FixedListings {
        async fn find_featured(
            &self,
            _query: &str,
            _location: Option<&str>,
        ) -> Result<Vec<FeaturedListing>, PipelineError> {
            self.0.clone().map_err(PipelineError::Listings)
        }
    }

    /// Records the history it was given and returns a fixed result.
    struct RecordingFollowups {
        result: Result<Vec<String>, String>,
        seen: Mutex<Vec<Message>>,
    }

    impl RecordingFollowups {
        fn new(result: Result<Vec<String>, String>) -> Arc<Self> {
            Arc::new(Self {
                result,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl FollowupGenerator for RecordingFollowups {
        async fn generate(
            &self,
            history: &[Message],
            _final_answer: &str,
            _location: Option<&str>,
        ) -> Result<Vec<String>, PipelineError> {
            *self.seen.lock().unwrap() = history.to_vec();
            self.result.clone().map_err(PipelineError::Followups)
        }
    }

    fn listing() -> FeaturedListing {
        FeaturedListing {
            title: "CNC Machining Certificate".into(),
            org: "Austin Community College".into(),
            location: "Austin, TX".into(),
        }
    }

    fn ctx(used_internal_rag: bool, location: Option<&str>) -> EnrichmentContext {
        EnrichmentContext {
            last_user_raw: "What does a CNC machinist do?".into(),
            effective_location: location.map(String::from),
            used_internal_rag,
            history: vec![Message::user("What does a CNC machinist do?")],
        }
    }

    #[test]
    fn featured_block_formats_listings() {
        let block = featured_block(&[listing()], Some("Austin, TX"));
        assert_eq!(
            block,
            "\n\n**Featured programs and jobs near Austin, TX:**\n- CNC Machining Certificate, Austin Community College (Austin, TX)"
        );
        let no_loc = featured_block(&[listing()], None);
        assert!(no_loc.starts_with("\n\n**Featured programs and jobs:**"));
    }

    #[tokio::test]
    async fn listings_and_next_steps_with_rag() {
        let followups = RecordingFollowups::new(Ok(vec!["a".into(), "b".into()]));
        let enricher = Enricher::new(Arc::new(FixedListings(Ok(vec![listing()]))), followups.clone());

        let payload = enricher
            .finalize(
                "Machinists run CNC mills.\n\n## Next Steps\n- old".into(),
                &ctx(true, Some("Austin, TX")),
            )
            .await;

        assert!(payload.final_answer.contains("- CNC Machining Certificate"));
        assert_eq!(count_next_steps_sections(&payload.final_answer), 1);
        assert!(payload.final_answer.ends_with(CANONICAL_NEXT_STEPS));
        assert!(!payload.final_answer.contains("- old"));
        assert_eq!(payload.followups, vec!["a", "b"]);

        let seen = followups.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].role, Role::Assistant);
        assert_eq!(seen[1].content, payload.final_answer);
    }

    #[tokio::test]
    async fn model_steps_with_sub_headings_are_dropped_but_listings_kept() {
        let enricher = Enricher::new(
            Arc::new(FixedListings(Ok(vec![listing()]))),
            RecordingFollowups::new(Ok(vec!["a".into()])),
        );

        let raw = "Machinists run CNC mills.\n\n## Next Steps\n### Step 1: Research\n- Look up programs\n**2. Enroll**\n- Pick a school";
        let payload = enricher.finalize(raw.into(), &ctx(true, Some("Austin, TX"))).await;

        assert!(!payload.final_answer.contains("Look up programs"));
        assert!(!payload.final_answer.contains("Pick a school"));
        assert_eq!(
            payload.final_answer,
            format!(
                "Machinists run CNC mills.{}\n\n{CANONICAL_NEXT_STEPS}",
                featured_block(&[listing()], Some("Austin, TX"))
            )
        );
    }

    #[tokio::test]
    async fn no_next_steps_without_rag() {
        let enricher = Enricher::new(
            Arc::new(FixedListings(Ok(vec![listing()]))),
            RecordingFollowups::new(Ok(vec!["a".into()])),
        );

        let payload = enricher
            .finalize("Plain answer.".into(), &ctx(false, Some("Austin, TX")))
            .await;

        assert!(payload.final_answer.contains("Featured programs"));
        assert_eq!(count_next_steps_sections(&payload.final_answer), 0);
    }

    #[tokio::test]
    async fn listing_failure_is_swallowed() {
        let enricher = Enricher::new(
            Arc::new(FixedListings(Err("catalog offline".into()))),
            RecordingFollowups::new(Ok(vec!["a".into()])),
        );

        let raw = "Machinists run CNC mills.";
        let without_rag = enricher.finalize(raw.into(), &ctx(false, None)).await;
        assert_eq!(without_rag.final_answer, raw);

        let with_rag = enricher.finalize(raw.into(), &ctx(true, None)).await;
        assert_eq!(with_rag.final_answer, normalize_next_steps(raw));
    }

    #[tokio::test]
    async fn empty_listings_leave_answer_alone() {
        let enricher = Enricher::new(
            Arc::new(FixedListings(Ok(vec![]))),
            RecordingFollowups::new(Ok(vec!["a".into()])),
        );
        let payload = enricher.finalize("Answer.".into(), &ctx(false, None)).await;
        assert_eq!(payload.final_answer, "Answer.");
    }

    #[tokio::test]
    async fn followup_failure_uses_defaults() {
        let enricher = Enricher::new(
            Arc::new(FixedListings(Ok(vec![]))),
            RecordingFollowups::new(Err("model down".into())),
        );
        let payload = enricher.finalize("Answer.".into(), &ctx(false, None)).await;
        assert_eq!(payload.followups, default_followups());
    }

    #[tokio::test]
    async fn followups_are_capped_at_three() {
        let enricher = Enricher::new(
            Arc::new(FixedListings(Ok(vec![]))),
            RecordingFollowups::new(Ok(vec![
                "1".into(),
                "2".into(),
                "3".into(),
                "4".into(),
                "5".into(),
            ])),
        );
        let payload = enricher.finalize("Answer.".into(), &ctx(false, None)).await;
        assert_eq!(payload.followups, vec!["1", "2", "3"]);
    }
}
