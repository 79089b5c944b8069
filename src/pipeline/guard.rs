//! Domain guard and the canned replies shared by the short-circuit paths.

use tracing::info;

use super::types::TurnReply;

/// Answer for queries outside the coaching domain.
pub const OFF_DOMAIN_MESSAGE: &str = "I'm your career coach, so I can only help with careers, \
     training programs, apprenticeships and job searching. Try asking me about a job you're \
     curious about or how to get started in a trade.";

/// Answer when the query needs a location the user has not set.
pub const LOCATION_REQUIRED_MESSAGE: &str = "To find opportunities near you, please set your \
     location (a city and state, or a ZIP code) and ask again.";

/// Answer when the turn failed for any other reason.
pub const APOLOGY_MESSAGE: &str =
    "Sorry, something went wrong while preparing your answer. Please try again in a moment.";

/// Suggestions used whenever a generated list is unavailable.
pub const DEFAULT_FOLLOWUPS: [&str; 3] = [
    "Which careers match my interests?",
    "How do I find a training program?",
    "What skilled trades are in demand right now?",
];

pub fn default_followups() -> Vec<String> {
    DEFAULT_FOLLOWUPS.iter().map(|s| s.to_string()).collect()
}

/// Result of checking the preamble's domain-guard flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// In-domain; continue to the model.
    Allow,
    /// Out of domain; stop before any model call.
    OffDomain,
}

pub fn evaluate(domain_guarded: bool) -> GuardDecision {
    if domain_guarded {
        info!("Domain guard tripped, skipping completion");
        GuardDecision::OffDomain
    } else {
        GuardDecision::Allow
    }
}

/// Fixed reply for an off-domain query.
pub fn off_domain_reply() -> TurnReply {
    TurnReply::ok(OFF_DOMAIN_MESSAGE, default_followups())
}

/// Fixed reply when a location is needed. Carries no follow-ups.
pub fn location_required_reply() -> TurnReply {
    TurnReply::ok(LOCATION_REQUIRED_MESSAGE, Vec::new())
}
