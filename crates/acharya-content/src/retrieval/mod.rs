//! Retrieval façade over the external vector index.
//!
//! Embeds the query, forwards vector + threshold + k to the index, then
//! enriches raw hits with source metadata. An index with no content above
//! threshold is a normal "no results" state, not a failure; only a failing
//! index call surfaces as `IndexUnavailable`.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::embeddings::EmbeddingClient;
use crate::error::ContentError;
use crate::types::{RetrievedMatch, SourceMeta};

/// A chunk ready for the index: text plus its embedding vector.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub ordinal: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// One raw hit from the index, ranked descending by similarity.
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub source_id: String,
    pub text: String,
    pub similarity: f32,
}

/// External nearest-neighbor index. Out of scope for this crate; callers
/// supply an implementation backed by their store of choice.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, source_id: &str, chunks: Vec<IndexedChunk>) -> Result<()>;
    async fn delete(&self, source_id: &str) -> Result<()>;
    async fn search(&self, vector: &[f32], threshold: f32, k: usize) -> Result<Vec<IndexHit>>;
}

/// External source-metadata store.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get_sources_by_ids(&self, ids: &[String]) -> Result<Vec<SourceMeta>>;
}

pub struct Retriever {
    embedder: Arc<EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    metadata: Arc<dyn MetadataStore>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            embedder,
            index,
            metadata,
        }
    }

    /// Search the index for chunks matching `query`. Returns an empty vec
    /// (not an error) when nothing scores above `threshold`.
    pub async fn search(
        &self,
        query: &str,
        threshold: f32,
        k: usize,
    ) -> Result<Vec<RetrievedMatch>, ContentError> {
        if k == 0 {
            return Err(ContentError::InvalidArgument("k must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ContentError::InvalidArgument(
                "threshold must be in [0.0, 1.0]".into(),
            ));
        }

        let embedding = self.embedder.embed(query).await?;

        let hits = self
            .index
            .search(&embedding.vector, threshold, k)
            .await
            .map_err(|e| ContentError::IndexUnavailable(e.to_string()))?;

        if hits.is_empty() {
            tracing::debug!(query_len = query.len(), "no hits above threshold");
            return Ok(Vec::new());
        }

        // Batch-fetch metadata for the distinct sources in the hit list.
        let mut distinct: Vec<String> = Vec::new();
        for hit in &hits {
            if !distinct.contains(&hit.source_id) {
                distinct.push(hit.source_id.clone());
            }
        }

        let sources = self
            .metadata
            .get_sources_by_ids(&distinct)
            .await
            .map_err(|e| ContentError::IndexUnavailable(e.to_string()))?;
        let by_id: HashMap<&str, &SourceMeta> =
            sources.iter().map(|s| (s.id.as_str(), s)).collect();

        // Hits whose source cannot be resolved are dropped, not errored.
        let mut matches = Vec::with_capacity(hits.len());
        for hit in hits {
            match by_id.get(hit.source_id.as_str()) {
                Some(meta) => matches.push(RetrievedMatch {
                    chunk_text: hit.text,
                    source_id: hit.source_id,
                    source_title: meta.title.clone(),
                    source_category: meta.category.clone(),
                    similarity: hit.similarity.clamp(0.0, 1.0),
                }),
                None => {
                    tracing::warn!(source_id = %hit.source_id, "dropping hit with unresolved source");
                }
            }
        }

        Ok(matches)
    }
}
