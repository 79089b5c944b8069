//! Conversational turn pipeline.
//!
//! Every chat turn flows through:
//! 1. `intent::classify_intent()` (logged, no routing yet)
//! 2. `PreambleBuilder::build()` (context, location check, domain guard)
//! 3. `guard::evaluate()` (off-domain short-circuit)
//! 4. `composer::compose_messages()`
//! 5. `stream::spawn_relay()` (tokens now, `Enricher::finalize()` at end of stream)
//!
//! `orchestrator::TurnOrchestrator` ties the steps together and owns the
//! fallback replies; `routes` exposes it over HTTP.

pub mod composer;
pub mod enricher;
pub mod guard;
pub mod intent;
pub mod next_steps;
pub mod orchestrator;
pub mod routes;
pub mod stream;
pub mod types;

pub use orchestrator::{TurnConfig, TurnOrchestrator, TurnOutcome};
pub use routes::chat_routes;
