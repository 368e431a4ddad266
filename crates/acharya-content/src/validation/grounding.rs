//! Citation grounding for generated content.
//!
//! Extracts `[Source: <label>]` markers and measures how many resolve to
//! a known source. Extraction sits behind the `CitationExtractor` trait so
//! the regex heuristic can later be replaced by a structured-output
//! contract from the completion service without touching the scoring.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{ScoreBand, SourceMeta};

static CITATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[Source:\s*([^\]]+)\]").expect("citation regex is valid"));

/// Score when content cites nothing but sources were available: neither
/// confirmed nor refuted.
const NO_CITATIONS_SCORE: f32 = 50.0;

/// Extracts citation labels from generated content.
pub trait CitationExtractor: Send + Sync {
    fn extract(&self, content: &str) -> Vec<String>;
}

/// Default extractor: bracketed `[Source: <label>]` markers.
pub struct PatternCitationExtractor;

impl CitationExtractor for PatternCitationExtractor {
    fn extract(&self, content: &str) -> Vec<String> {
        CITATION_RE
            .captures_iter(content)
            .filter_map(|cap| cap.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|label| !label.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingReport {
    pub total_citations: usize,
    pub resolved_citations: usize,
    /// Labels that matched no known source title or category.
    pub unresolved: Vec<String>,
    pub grounding_score: f32,
    pub band: ScoreBand,
}

pub struct GroundingChecker {
    extractor: Box<dyn CitationExtractor>,
}

impl GroundingChecker {
    pub fn new() -> Self {
        Self {
            extractor: Box::new(PatternCitationExtractor),
        }
    }

    pub fn with_extractor(extractor: Box<dyn CitationExtractor>) -> Self {
        Self { extractor }
    }

    /// Score how well content citations resolve against known sources.
    /// No known sources at all → 100 (nothing to ground against); sources
    /// available but nothing cited → 50 (ambiguous).
    pub fn check(&self, content: &str, known_sources: &[SourceMeta]) -> GroundingReport {
        if known_sources.is_empty() {
            return GroundingReport {
                total_citations: 0,
                resolved_citations: 0,
                unresolved: Vec::new(),
                grounding_score: 100.0,
                band: ScoreBand::Excellent,
            };
        }

        let citations = self.extractor.extract(content);
        if citations.is_empty() {
            tracing::debug!("content has no citations but sources were available");
            return GroundingReport {
                total_citations: 0,
                resolved_citations: 0,
                unresolved: Vec::new(),
                grounding_score: NO_CITATIONS_SCORE,
                band: ScoreBand::from_score(NO_CITATIONS_SCORE),
            };
        }

        let mut resolved = 0;
        let mut unresolved = Vec::new();
        for label in &citations {
            if resolves(label, known_sources) {
                resolved += 1;
            } else {
                unresolved.push(label.clone());
            }
        }

        let score = (resolved as f32 / citations.len() as f32 * 100.0).round();

        if !unresolved.is_empty() {
            tracing::debug!(
                resolved,
                total = citations.len(),
                "some citations did not resolve to known sources"
            );
        }

        GroundingReport {
            total_citations: citations.len(),
            resolved_citations: resolved,
            unresolved,
            grounding_score: score,
            band: ScoreBand::from_score(score),
        }
    }
}

impl Default for GroundingChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// A citation resolves when its label substring-matches a known source's
/// title or category, case-insensitively, in either direction.
fn resolves(label: &str, sources: &[SourceMeta]) -> bool {
    let needle = label.to_lowercase();
    sources.iter().any(|source| {
        let title = source.title.to_lowercase();
        let category = source.category.to_lowercase();
        title.contains(&needle)
            || needle.contains(&title)
            || category.contains(&needle)
            || needle.contains(&category)
    })
}
