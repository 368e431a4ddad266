//! Content engine for AI-assisted course material: deterministic
//! chunking, embedding generation with provider fallback, retrieval over
//! an external vector index, and a multi-stage validation pipeline for
//! generated content.

pub mod config;
pub mod embeddings;
pub mod error;
pub mod indexing;
pub mod llm;
pub mod processing;
pub mod retrieval;
pub mod session;
pub mod types;
pub mod validation;

// Re-export primary types for convenience
pub use config::ContentConfig;
pub use embeddings::{EmbeddingClient, EmbeddingProvider};
pub use error::ContentError;
pub use indexing::DocumentIndexer;
pub use llm::CompletionProvider;
pub use processing::TextChunker;
pub use retrieval::{MetadataStore, Retriever, VectorIndex};
pub use session::{SessionHandle, SessionStore};
pub use types::{Chunk, Embedding, IngestSummary, RetrievedMatch, ScoreBand, SourceMeta};
pub use validation::{
    ClaimVerifier, ContentValidator, GroundingAnalysis, GroundingChecker, QualityEvaluator,
    SyntaxValidator, ValidationReport,
};

// Re-export common types
pub use uuid::Uuid;
