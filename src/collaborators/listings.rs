//! Featured listing search over a JSON catalog.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::pipeline::types::FeaturedListing;

use super::ListingMatcher;

/// Default number of listings surfaced per answer.
pub const DEFAULT_LISTING_LIMIT: usize = 3;

/// Words too common to say anything about a query.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "what", "does", "how", "who", "with", "are", "can", "you", "your",
    "about", "job", "jobs", "career", "careers", "want", "become", "into", "near", "there",
    "that", "this", "from", "have", "need", "like", "tell",
];

/// A catalog row: a listing plus the keywords it should match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub title: String,
    pub org: String,
    pub location: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl CatalogEntry {
    fn to_listing(&self) -> FeaturedListing {
        FeaturedListing {
            title: self.title.clone(),
            org: self.org.clone(),
            location: self.location.clone(),
        }
    }

    fn haystack(&self) -> String {
        format!("{} {}", self.title, self.keywords.join(" ")).to_lowercase()
    }

    /// Remote and online listings match any location.
    fn serves(&self, city: &str) -> bool {
        let location = self.location.to_lowercase();
        location.contains(city) || location.contains("remote") || location.contains("online")
    }
}

/// Keyword matcher over an in-memory catalog.
pub struct CatalogListingMatcher {
    entries: Vec<CatalogEntry>,
    limit: usize,
}

impl CatalogListingMatcher {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self {
            entries,
            limit: DEFAULT_LISTING_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Read a JSON array of `CatalogEntry` from disk.
    pub async fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            PipelineError::Catalog(format!("reading {}: {e}", path.display()))
        })?;
        let entries: Vec<CatalogEntry> = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::Catalog(format!("parsing {}: {e}", path.display()))
        })?;
        info!(count = entries.len(), path = %path.display(), "Loaded listing catalog");
        Ok(Self::new(entries))
    }
}

/// Meaningful lowercase words of a query.
fn query_terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// City part of a "City, ST" location.
fn city_of(location: &str) -> Option<String> {
    location
        .split(',')
        .next()
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
}

#[async_trait]
impl ListingMatcher for CatalogListingMatcher {
    async fn find_featured(
        &self,
        query: &str,
        location: Option<&str>,
    ) -> Result<Vec<FeaturedListing>, PipelineError> {
        let terms = query_terms(query);
        if terms.is_empty() || self.limit == 0 {
            return Ok(Vec::new());
        }
        let city = location.and_then(city_of);

        let mut scored: Vec<(usize, &CatalogEntry)> = self
            .entries
            .iter()
            .filter(|e| city.as_deref().is_none_or(|c| e.serves(c)))
            .map(|e| {
                let haystack = e.haystack();
                let score = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
                (score, e)
            })
            .filter(|(score, _)| *score > 0)
            .collect();

        // Stable sort keeps catalog order among equal scores.
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let listings: Vec<FeaturedListing> = scored
            .into_iter()
            .take(self.limit)
            .map(|(_, e)| e.to_listing())
            .collect();

        debug!(terms = terms.len(), matches = listings.len(), "Listing search done");
        Ok(listings)
    }
}
