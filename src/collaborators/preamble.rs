//! Basic preamble: history cleanup, location check, domain guard and a
//! keyword lookup into a small JSON knowledge base.

use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::llm::Role;
use crate::pipeline::types::{Message, PreambleResult, last_user_text};

use super::PreambleBuilder;

/// Queries that only make sense with a location.
static NEARBY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(near me|nearby|in my area|close to me|around here)\b")
        .expect("static regex")
});

/// Topics the coach does not cover.
static OFF_TOPIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(recipes?|horoscopes?|lottery|sports? scores?|movie recommendations?|celebrity gossip|dating advice)\b",
    )
    .expect("static regex")
});

/// Career vocabulary that keeps a query in-domain even when it mentions an
/// off-topic word ("do chefs write recipes for a living?").
static CAREER_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(jobs?|careers?|work|training|schools?|apprentice\w*|salary|pay|certif\w*|trades?|hir\w+|employ\w*|resume|interview\w*)\b",
    )
    .expect("static regex")
});

/// Header for knowledge-base material passed to the model.
const REFERENCE_HEADER: &str = "Reference material from the career knowledge base:";

/// One knowledge-base article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub topic: String,
    /// Lowercase phrases that select this entry.
    pub keywords: Vec<String>,
    pub content: String,
}

/// Simple `PreambleBuilder` backed by in-memory rules.
pub struct BasicPreamble {
    knowledge: Vec<KnowledgeEntry>,
    max_history: usize,
}

impl BasicPreamble {
    pub fn new(knowledge: Vec<KnowledgeEntry>, max_history: usize) -> Self {
        Self {
            knowledge,
            max_history: max_history.max(1),
        }
    }

    /// Read a JSON array of `KnowledgeEntry` from disk.
    pub async fn load_knowledge(path: &Path) -> Result<Vec<KnowledgeEntry>, PipelineError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            PipelineError::Catalog(format!("reading {}: {e}", path.display()))
        })?;
        let entries: Vec<KnowledgeEntry> = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::Catalog(format!("parsing {}: {e}", path.display()))
        })?;
        info!(count = entries.len(), path = %path.display(), "Loaded knowledge base");
        Ok(entries)
    }

    /// Drop client-supplied system turns and blank turns, trim content, and
    /// keep the most recent `max_history` turns.
    fn normalize(&self, conversation: &[Message]) -> Vec<Message> {
        let cleaned: Vec<Message> = conversation
            .iter()
            .filter(|m| m.role != Role::System)
            .filter(|m| !m.content.trim().is_empty())
            .map(|m| Message {
                id: m.id.clone(),
                role: m.role,
                content: m.content.trim().to_string(),
            })
            .collect();

        let skip = cleaned.len().saturating_sub(self.max_history);
        cleaned.into_iter().skip(skip).collect()
    }

    fn lookup(&self, query: &str) -> Vec<&KnowledgeEntry> {
        let lower = query.to_lowercase();
        self.knowledge
            .iter()
            .filter(|entry| {
                entry
                    .keywords
                    .iter()
                    .any(|k| !k.trim().is_empty() && lower.contains(&k.trim().to_lowercase()))
            })
            .collect()
    }
}

fn is_off_topic(text: &str) -> bool {
    OFF_TOPIC.is_match(text) && !CAREER_TERMS.is_match(text)
}

#[async_trait]
impl PreambleBuilder for BasicPreamble {
    async fn build(
        &self,
        conversation: &[Message],
        location: Option<&str>,
    ) -> Result<PreambleResult, PipelineError> {
        let mut messages = self.normalize(conversation);
        let last_user_raw = last_user_text(&messages).to_string();
        let effective_location = location
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from);

        if effective_location.is_none() && NEARBY.is_match(&last_user_raw) {
            return Err(PipelineError::LocationRequired);
        }

        let domain_guarded = is_off_topic(&last_user_raw);

        let matched = if domain_guarded {
            Vec::new()
        } else {
            self.lookup(&last_user_raw)
        };
        let internal_rag = matched
            .iter()
            .map(|e| format!("## {}\n{}", e.topic, e.content.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");

        if !internal_rag.is_empty() {
            messages.insert(0, Message::system(format!("{REFERENCE_HEADER}\n\n{internal_rag}")));
        }

        debug!(
            turns = messages.len(),
            knowledge_hits = matched.len(),
            domain_guarded,
            "Preamble built"
        );

        Ok(PreambleResult {
            messages_for_llm: messages,
            last_user_raw,
            effective_location,
            internal_rag,
            domain_guarded,
        })
    }
}
