use serde::{Deserialize, Serialize};

/// A bounded, overlapping slice of a source document. The atomic unit of
/// embedding and retrieval. Immutable once created; a source's chunk set
/// is replaced wholesale when the document is reprocessed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub source_id: String,
    /// 0-based, monotonic within a source.
    pub ordinal: usize,
    pub text: String,
    /// Byte offset of the chunk start within the source text.
    pub start_offset: usize,
}

/// A vector produced for one chunk or query string. Owned by the caller;
/// the embedding client retains nothing between calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub dimension: usize,
    /// Which provider produced the vector. Dimensionality differs by
    /// provider and must never be mixed within one index.
    pub provider: String,
}

/// One ranked hit from the retrieval façade, enriched with source
/// metadata. Constructed per query, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedMatch {
    pub chunk_text: String,
    pub source_id: String,
    pub source_title: String,
    pub source_category: String,
    /// Cosine similarity in [0, 1].
    pub similarity: f32,
}

/// Metadata-store row for a known source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMeta {
    pub id: String,
    pub title: String,
    pub category: String,
}

/// Partial-success summary for one bulk ingestion run. A failed chunk
/// never aborts the job; it is counted here instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSummary {
    pub source_id: String,
    pub chunks_total: usize,
    pub chunks_embedded: usize,
    pub chunks_failed: usize,
}

/// Qualitative band shared by grounding, quality, and overall scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreBand {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl ScoreBand {
    /// Band for a score on the 0-100 scale.
    pub fn from_score(score: f32) -> Self {
        if score >= 80.0 {
            Self::Excellent
        } else if score >= 60.0 {
            Self::Good
        } else if score >= 40.0 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

impl std::fmt::Display for ScoreBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        };
        write!(f, "{}", label)
    }
}
