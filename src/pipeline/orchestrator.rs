//! Turn orchestrator: one user turn from request to streamed, enriched answer.
//!
//! Flow:
//! 1. Intent classification (logged only)
//! 2. Preamble (context, location check, domain guard)
//! 3. Guard short-circuit
//! 4. Message composition
//! 5. Streaming completion, with enrichment once the stream ends
//!
//! Any failure in steps 2 to 5 is answered by the fallback handler, so the
//! caller always gets a well-formed reply with a follow-up list.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::collaborators::{FollowupGenerator, ListingMatcher, PreambleBuilder};
use crate::error::PipelineError;
use crate::llm::{CompletionRequest, LlmProvider};

use super::composer::compose_messages;
use super::enricher::{EnrichmentContext, Enricher};
use super::guard::{self, APOLOGY_MESSAGE, GuardDecision, default_followups};
use super::intent::classify_intent;
use super::stream::{TurnStream, spawn_relay};
use super::types::{Message, TurnReply, TurnRequest, cap_followups, last_user_text};

/// Temperature for coaching answers (kept low for consistent advice).
pub const ANSWER_TEMPERATURE: f32 = 0.2;

/// Default max tokens for a coaching answer.
pub const ANSWER_MAX_TOKENS: u32 = 1024;

/// Model parameters and prompt for the answer completion.
#[derive(Debug, Clone)]
pub struct TurnConfig {
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Capacity of the per-turn event channel.
    pub stream_buffer: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            system_prompt: crate::config::DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: ANSWER_TEMPERATURE,
            max_tokens: ANSWER_MAX_TOKENS,
            stream_buffer: 64,
        }
    }
}

/// How a turn is delivered to the caller.
pub enum TurnOutcome {
    /// A complete JSON reply (guard, location-required, or error).
    Reply(TurnReply),
    /// Tokens followed by the final payload.
    Streaming(TurnStream),
}

/// Runs conversational turns against injected collaborators.
pub struct TurnOrchestrator {
    llm: Arc<dyn LlmProvider>,
    preamble: Arc<dyn PreambleBuilder>,
    followups: Arc<dyn FollowupGenerator>,
    enricher: Enricher,
    config: TurnConfig,
}

impl TurnOrchestrator {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        preamble: Arc<dyn PreambleBuilder>,
        listings: Arc<dyn ListingMatcher>,
        followups: Arc<dyn FollowupGenerator>,
        config: TurnConfig,
    ) -> Self {
        let enricher = Enricher::new(listings, Arc::clone(&followups));
        Self {
            llm,
            preamble,
            followups,
            enricher,
            config,
        }
    }

    /// Run one turn. Never fails: errors become fallback replies.
    pub async fn run_turn(&self, request: TurnRequest) -> TurnOutcome {
        // Best location known so far, for fallback follow-ups.
        let mut known_location = request.location.clone();

        match self.try_run_turn(&request, &mut known_location).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_recoverable() => {
                info!("Turn needs a location, asking the user to set one");
                TurnOutcome::Reply(guard::location_required_reply())
            }
            Err(e) => {
                error!(error = %e, "Turn failed, sending fallback reply");
                TurnOutcome::Reply(
                    self.fallback_reply(&request.messages, known_location.as_deref())
                        .await,
                )
            }
        }
    }

    async fn try_run_turn(
        &self,
        request: &TurnRequest,
        known_location: &mut Option<String>,
    ) -> Result<TurnOutcome, PipelineError> {
        let intent = classify_intent(last_user_text(&request.messages));
        info!(
            intent = %intent,
            messages = request.messages.len(),
            has_location = request.location.is_some(),
            "Starting turn"
        );

        let preamble = self
            .preamble
            .build(&request.messages, request.location.as_deref())
            .await?;
        known_location.clone_from(&preamble.effective_location);

        if guard::evaluate(preamble.domain_guarded) == GuardDecision::OffDomain {
            return Ok(TurnOutcome::Reply(guard::off_domain_reply()));
        }

        let messages = compose_messages(
            &self.config.system_prompt,
            preamble.effective_location.as_deref(),
            &preamble.messages_for_llm,
        );
        let completion = CompletionRequest::new(messages)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        let tokens = self.llm.stream_complete(completion).await?;
        info!(
            model = self.llm.model_name(),
            internal_rag = preamble.used_internal_rag(),
            "Streaming answer"
        );

        let enricher = self.enricher.clone();
        let ctx = EnrichmentContext::from(&preamble);
        let stream = spawn_relay(tokens, self.config.stream_buffer, move |answer| async move {
            enricher.finalize(answer, &ctx).await
        });

        Ok(TurnOutcome::Streaming(stream))
    }

    /// Apology plus best-effort follow-ups from whatever context survived.
    async fn fallback_reply(&self, messages: &[Message], location: Option<&str>) -> TurnReply {
        let followups = match self.followups.generate(messages, "", location).await {
            Ok(generated) => {
                let capped = cap_followups(generated);
                if capped.is_empty() {
                    default_followups()
                } else {
                    capped
                }
            }
            Err(e) => {
                warn!(error = %e, "Fallback follow-up generation failed, using defaults");
                default_followups()
            }
        };

        TurnReply::error(APOLOGY_MESSAGE, followups)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::LlmError;
    use crate::llm::{ChatMessage, CompletionResponse, Role, TokenStream};
    use crate::pipeline::guard::{LOCATION_REQUIRED_MESSAGE, OFF_DOMAIN_MESSAGE};
    use crate::pipeline::next_steps::count_next_steps_sections;
    use crate::pipeline::stream::{STREAM_INTERRUPTED_MESSAGE, StreamEvent};
    use crate::pipeline::types::{FeaturedListing, PreambleResult, ReplyStatus};

    /// What the stub LLM does when asked to stream.
    enum StreamScript {
        Tokens(Vec<&'static str>),
        FailBeforeStart,
        FailMidStream,
    }

    struct StubLlm {
        script: StreamScript,
        calls: AtomicUsize,
        last_request: Mutex<Option<CompletionRequest>>,
    }

    impl StubLlm {
        fn new(script: StreamScript) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for StubLlm {
        fn model_name(&self) -> &str {
            "stub"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            unimplemented!("orchestrator only streams")
        }

        async fn stream_complete(
            &self,
            request: CompletionRequest,
        ) -> Result<TokenStream, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request);

            let items: Vec<Result<String, LlmError>> = match &self.script {
                StreamScript::Tokens(tokens) => {
                    tokens.iter().map(|t| Ok(t.to_string())).collect()
                }
                StreamScript::FailBeforeStart => {
                    return Err(LlmError::RequestFailed {
                        provider: "stub".into(),
                        reason: "503".into(),
                    });
                }
                StreamScript::FailMidStream => vec![
                    Ok("Half an ans".to_string()),
                    Err(LlmError::StreamFailed {
                        provider: "stub".into(),
                        reason: "reset".into(),
                    }),
                ],
            };
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    enum PreambleScript {
        Ok(PreambleResult),
        LocationRequired,
        Fail,
    }

    struct StubPreamble(PreambleScript);

    #[async_trait]
    impl PreambleBuilder for StubPreamble {
        async fn build(
            &self,
            _conversation: &[Message],
            _location: Option<&str>,
        ) -> Result<PreambleResult, PipelineError> {
            match &self.0 {
                PreambleScript::Ok(result) => Ok(result.clone()),
                PreambleScript::LocationRequired => Err(PipelineError::LocationRequired),
                PreambleScript::Fail => Err(PipelineError::Preamble("index unavailable".into())),
            }
        }
    }

    struct StubListings(Vec<FeaturedListing>);

    #[async_trait]
    impl ListingMatcher for StubListings {
        async fn find_featured(
            &self,
            _query: &str,
            _location: Option<&str>,
        ) -> Result<Vec<FeaturedListing>, PipelineError> {
            Ok(self.0.clone())
        }
    }

    struct StubFollowups(Option<Vec<String>>);

    #[async_trait]
    impl FollowupGenerator for StubFollowups {
        async fn generate(
            &self,
            _history: &[Message],
            _final_answer: &str,
            _location: Option<&str>,
        ) -> Result<Vec<String>, PipelineError> {
            self.0
                .clone()
                .ok_or_else(|| PipelineError::Followups("generator offline".into()))
        }
    }

    fn cnc_request() -> TurnRequest {
        TurnRequest {
            messages: vec![Message::user("What does a CNC machinist do?")],
            location: Some("Austin, TX".into()),
        }
    }

    fn cnc_preamble(internal_rag: &str, domain_guarded: bool) -> PreambleResult {
        PreambleResult {
            messages_for_llm: vec![Message::user("What does a CNC machinist do?")],
            last_user_raw: "What does a CNC machinist do?".into(),
            effective_location: Some("Austin, TX".into()),
            internal_rag: internal_rag.into(),
            domain_guarded,
        }
    }

    fn orchestrator(
        llm: Arc<StubLlm>,
        preamble: PreambleScript,
        listings: Vec<FeaturedListing>,
        followups: Option<Vec<String>>,
    ) -> TurnOrchestrator {
        TurnOrchestrator::new(
            llm,
            Arc::new(StubPreamble(preamble)),
            Arc::new(StubListings(listings)),
            Arc::new(StubFollowups(followups)),
            TurnConfig {
                system_prompt: "BASE PROMPT".into(),
                ..TurnConfig::default()
            },
        )
    }

    fn expect_reply(outcome: TurnOutcome) -> TurnReply {
        match outcome {
            TurnOutcome::Reply(reply) => reply,
            TurnOutcome::Streaming(_) => panic!("expected a reply, got a stream"),
        }
    }

    fn expect_stream(outcome: TurnOutcome) -> TurnStream {
        match outcome {
            TurnOutcome::Streaming(stream) => stream,
            TurnOutcome::Reply(reply) => panic!("expected a stream, got {:?}", reply),
        }
    }

    #[tokio::test]
    async fn domain_guard_short_circuits_without_model_call() {
        let llm = StubLlm::new(StreamScript::Tokens(vec!["never"]));
        let orch = orchestrator(
            llm.clone(),
            PreambleScript::Ok(cnc_preamble("", true)),
            vec![],
            Some(vec!["x".into()]),
        );

        let reply = expect_reply(orch.run_turn(cnc_request()).await);
        assert_eq!(reply.status, ReplyStatus::Ok);
        assert_eq!(reply.body.answer, OFF_DOMAIN_MESSAGE);
        assert_eq!(reply.body.followups, default_followups());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn location_required_is_success_with_no_followups() {
        let llm = StubLlm::new(StreamScript::Tokens(vec!["never"]));
        let orch = orchestrator(
            llm.clone(),
            PreambleScript::LocationRequired,
            vec![],
            Some(vec!["x".into()]),
        );

        let reply = expect_reply(orch.run_turn(cnc_request()).await);
        assert_eq!(reply.status, ReplyStatus::Ok);
        assert_eq!(reply.body.answer, LOCATION_REQUIRED_MESSAGE);
        assert!(reply.body.followups.is_empty());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn preamble_failure_returns_apology_with_generated_followups() {
        let llm = StubLlm::new(StreamScript::Tokens(vec!["never"]));
        let orch = orchestrator(
            llm,
            PreambleScript::Fail,
            vec![],
            Some(vec!["Try again?".into()]),
        );

        let reply = expect_reply(orch.run_turn(cnc_request()).await);
        assert_eq!(reply.status, ReplyStatus::Error);
        assert_eq!(reply.body.answer, APOLOGY_MESSAGE);
        assert_eq!(reply.body.followups, vec!["Try again?"]);
    }

    #[tokio::test]
    async fn completion_failure_with_failing_followups_uses_defaults() {
        let llm = StubLlm::new(StreamScript::FailBeforeStart);
        let orch = orchestrator(
            llm.clone(),
            PreambleScript::Ok(cnc_preamble("", false)),
            vec![],
            None,
        );

        let reply = expect_reply(orch.run_turn(cnc_request()).await);
        assert_eq!(reply.status, ReplyStatus::Error);
        assert_eq!(reply.body.answer, APOLOGY_MESSAGE);
        assert_eq!(reply.body.followups, default_followups());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fallback_with_empty_generated_list_uses_defaults() {
        let llm = StubLlm::new(StreamScript::FailBeforeStart);
        let orch = orchestrator(llm, PreambleScript::Fail, vec![], Some(vec![]));

        let reply = expect_reply(orch.run_turn(cnc_request()).await);
        assert!(!reply.body.followups.is_empty());
    }

    #[tokio::test]
    async fn completion_request_is_composed_with_location_and_low_temperature() {
        let llm = StubLlm::new(StreamScript::Tokens(vec!["ok"]));
        let orch = orchestrator(
            llm.clone(),
            PreambleScript::Ok(cnc_preamble("", false)),
            vec![],
            Some(vec![]),
        );

        let _ = expect_stream(orch.run_turn(cnc_request()).await).collect().await;

        let request = llm.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.temperature, Some(ANSWER_TEMPERATURE));
        assert_eq!(request.messages[0], ChatMessage::system("BASE PROMPT"));
        assert_eq!(request.messages[1].role, Role::System);
        assert!(request.messages[1].content.contains("Austin, TX"));
        assert_eq!(request.messages[2].content, "What does a CNC machinist do?");
    }

    #[tokio::test]
    async fn end_to_end_cnc_machinist_turn() {
        let llm = StubLlm::new(StreamScript::Tokens(vec![
            "A CNC machinist programs ",
            "and runs computer-controlled mills and lathes.",
            "\n\n## Next Steps\n- Watch a shop video",
        ]));
        let orch = orchestrator(
            llm,
            PreambleScript::Ok(cnc_preamble("Machinists: median pay, training paths.", false)),
            vec![FeaturedListing {
                title: "CNC Machining Certificate".into(),
                org: "Austin Community College".into(),
                location: "Austin, TX".into(),
            }],
            Some(vec![
                "What does CNC training cost?".into(),
                "Are there apprenticeships near me?".into(),
                "What do machinists earn?".into(),
                "Extra".into(),
            ]),
        );

        let events = expect_stream(orch.run_turn(cnc_request()).await)
            .collect()
            .await;

        let tokens: String = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Token(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert!(tokens.contains("Watch a shop video"));

        let Some(StreamEvent::Final(payload)) = events.last() else {
            panic!("last event should be the final payload, got {:?}", events.last());
        };
        assert!(
            payload
                .final_answer
                .contains("- CNC Machining Certificate, Austin Community College (Austin, TX)")
        );
        assert_eq!(count_next_steps_sections(&payload.final_answer), 1);
        assert!(!payload.final_answer.contains("Watch a shop video"));
        assert_eq!(payload.followups.len(), 3);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, StreamEvent::Final(_)))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn mid_stream_failure_ends_with_error_event() {
        let llm = StubLlm::new(StreamScript::FailMidStream);
        let orch = orchestrator(
            llm,
            PreambleScript::Ok(cnc_preamble("rag", false)),
            vec![],
            Some(vec!["x".into()]),
        );

        let events = expect_stream(orch.run_turn(cnc_request()).await)
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Token("Half an ans".into()),
                StreamEvent::Failed(STREAM_INTERRUPTED_MESSAGE.into()),
            ]
        );
    }
}
