//! Bulk document ingestion: chunk, embed, write to the vector index.
//!
//! Embedding calls run through a bounded-concurrency pool rather than a
//! serialized loop; completed chunks are buffered and flushed in ascending
//! ordinal order, so per-source write order is preserved without
//! serializing the network calls. A failed chunk never aborts the job;
//! the summary reports processed vs. failed counts.

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::embeddings::EmbeddingClient;
use crate::error::ContentError;
use crate::processing::TextChunker;
use crate::retrieval::{IndexedChunk, VectorIndex};
use crate::types::{Chunk, IngestSummary};

/// Chunks accumulated before an ordered write to the index.
const FLUSH_BATCH: usize = 16;

pub struct DocumentIndexer {
    chunker: TextChunker,
    embedder: Arc<EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    max_in_flight: usize,
}

impl DocumentIndexer {
    pub fn new(
        chunker: TextChunker,
        embedder: Arc<EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            chunker,
            embedder,
            index,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Reprocess one source document: invalidate its prior chunk set, then
    /// chunk, embed, and write the new set in ascending ordinal order.
    pub async fn ingest(&self, source_id: &str, text: &str) -> Result<IngestSummary, ContentError> {
        let chunks = self.chunker.chunk(source_id, text);
        let chunks_total = chunks.len();

        // At most one consistent chunk set per source: old chunks go first.
        self.index
            .delete(source_id)
            .await
            .map_err(|e| ContentError::IndexUnavailable(e.to_string()))?;

        if chunks_total == 0 {
            return Ok(IngestSummary {
                source_id: source_id.to_string(),
                chunks_total: 0,
                chunks_embedded: 0,
                chunks_failed: 0,
            });
        }

        let embedder = self.embedder.clone();
        // `buffered` keeps N calls in flight but yields results in input
        // order, which is exactly the ordinal order the index requires.
        let mut results = stream::iter(chunks.into_iter().map(move |chunk| {
            let embedder = embedder.clone();
            async move {
                let embedding = embedder.embed(&chunk.text).await;
                (chunk, embedding)
            }
        }))
        .buffered(self.max_in_flight)
        .boxed();

        let mut chunks_embedded = 0;
        let mut chunks_failed = 0;
        let mut index_provider: Option<String> = None;
        let mut buffer: Vec<IndexedChunk> = Vec::new();

        while let Some((chunk, result)) = results.next().await {
            match result {
                Ok(embedding) => {
                    // Vectors from different providers have different
                    // dimensionality and must not share an index.
                    let expected = index_provider.get_or_insert_with(|| embedding.provider.clone());
                    if *expected != embedding.provider {
                        tracing::warn!(
                            source_id,
                            ordinal = chunk.ordinal,
                            expected = %expected,
                            got = %embedding.provider,
                            "skipping chunk embedded by mismatched provider"
                        );
                        chunks_failed += 1;
                        continue;
                    }
                    buffer.push(to_indexed(chunk, embedding.vector));
                    chunks_embedded += 1;
                    if buffer.len() >= FLUSH_BATCH {
                        self.flush(source_id, &mut buffer).await?;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        source_id,
                        ordinal = chunk.ordinal,
                        error = %e,
                        "chunk embedding failed, continuing"
                    );
                    chunks_failed += 1;
                }
            }
        }

        if !buffer.is_empty() {
            self.flush(source_id, &mut buffer).await?;
        }

        tracing::debug!(
            source_id,
            chunks_total,
            chunks_embedded,
            chunks_failed,
            "ingestion complete"
        );

        Ok(IngestSummary {
            source_id: source_id.to_string(),
            chunks_total,
            chunks_embedded,
            chunks_failed,
        })
    }

    async fn flush(
        &self,
        source_id: &str,
        buffer: &mut Vec<IndexedChunk>,
    ) -> Result<(), ContentError> {
        let batch = std::mem::take(buffer);
        self.index
            .upsert(source_id, batch)
            .await
            .map_err(|e| ContentError::IndexUnavailable(e.to_string()))
    }
}

fn to_indexed(chunk: Chunk, embedding: Vec<f32>) -> IndexedChunk {
    IndexedChunk {
        ordinal: chunk.ordinal,
        text: chunk.text,
        embedding,
    }
}
