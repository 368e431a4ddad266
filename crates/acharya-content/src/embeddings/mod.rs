//! Embedding generation with a primary/fallback provider pair.
//!
//! The client cleans input, races the primary provider against a fixed
//! timeout, retries the primary exactly once after a rate limit, and falls
//! back to the secondary provider on any other failure. No state is
//! retained between calls.

pub mod gemini;
pub mod openai;

pub use gemini::GeminiEmbedder;
pub use openai::OpenAiEmbedder;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::EmbeddingConfig;
use crate::error::ContentError;
use crate::types::Embedding;

/// Failure modes a provider can report. Rate limits are recoverable and
/// drive the client's single-retry policy; everything else triggers the
/// secondary provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited")]
    RateLimited,
    #[error("{0}")]
    Unavailable(String),
}

/// One remote embedding provider.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Batch embed. Providers without a batch endpoint loop over `embed`.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Embedding vector dimension.
    fn dimension(&self) -> usize;

    /// Safe input length in characters; the client truncates beyond this.
    fn max_input_chars(&self) -> usize;

    fn name(&self) -> &'static str;
}

/// Embedding client wrapping a primary provider with a secondary fallback.
pub struct EmbeddingClient {
    primary: Arc<dyn EmbeddingProvider>,
    secondary: Arc<dyn EmbeddingProvider>,
    request_timeout: Duration,
    rate_limit_backoff: Duration,
    batch_fallback_delay: Duration,
}

impl EmbeddingClient {
    pub fn new(
        primary: Arc<dyn EmbeddingProvider>,
        secondary: Arc<dyn EmbeddingProvider>,
        config: &EmbeddingConfig,
    ) -> Self {
        Self {
            primary,
            secondary,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            rate_limit_backoff: Duration::from_millis(config.rate_limit_backoff_ms),
            batch_fallback_delay: Duration::from_millis(config.batch_fallback_delay_ms),
        }
    }

    /// Embed a single text. Primary first (one retry after a rate limit),
    /// secondary on any other primary failure, `EmbeddingUnavailable`
    /// carrying both messages when both legs fail.
    pub async fn embed(&self, text: &str) -> Result<Embedding, ContentError> {
        let cleaned = clean_text(text, self.primary.max_input_chars())
            .ok_or(ContentError::EmptyInput)?;

        let (primary_failure, primary_rate_limited) = match self.try_primary(&cleaned).await {
            Ok(vector) => return Ok(self.wrap(vector, self.primary.as_ref())),
            Err(failure) => failure,
        };

        tracing::warn!(
            provider = self.primary.name(),
            error = %primary_failure,
            "primary embedding provider failed, falling back"
        );

        // Secondary may accept a different input length.
        let for_secondary = truncate_chars(&cleaned, self.secondary.max_input_chars());
        match tokio::time::timeout(self.request_timeout, self.secondary.embed(&for_secondary))
            .await
        {
            Ok(Ok(vector)) => Ok(self.wrap(vector, self.secondary.as_ref())),
            // Both legs throttled: surface the rate limit itself.
            Ok(Err(ProviderError::RateLimited)) if primary_rate_limited => {
                Err(ContentError::RateLimited)
            }
            Ok(Err(e)) => Err(ContentError::EmbeddingUnavailable {
                primary: primary_failure,
                secondary: e.to_string(),
            }),
            Err(_) => Err(ContentError::EmbeddingUnavailable {
                primary: primary_failure,
                secondary: format!("timed out after {:?}", self.request_timeout),
            }),
        }
    }

    /// Batch embed. Per-item cleaning (an empty item fails alone, never the
    /// batch), one batched primary call, and on primary failure sequential
    /// secondary calls with a small inter-call delay to respect rate limits.
    pub async fn embed_batch(
        &self,
        texts: &[String],
    ) -> Vec<Result<Embedding, ContentError>> {
        let cleaned: Vec<Option<String>> = texts
            .iter()
            .map(|t| clean_text(t, self.primary.max_input_chars()))
            .collect();

        let usable: Vec<String> = cleaned.iter().flatten().cloned().collect();
        if usable.is_empty() {
            return cleaned
                .iter()
                .map(|_| Err(ContentError::EmptyInput))
                .collect();
        }

        match tokio::time::timeout(self.request_timeout, self.primary.embed_batch(&usable))
            .await
        {
            Ok(Ok(vectors)) if vectors.len() == usable.len() => {
                let mut iter = vectors.into_iter();
                return cleaned
                    .iter()
                    .map(|slot| match slot {
                        Some(_) => Ok(self.wrap(
                            iter.next().unwrap_or_default(),
                            self.primary.as_ref(),
                        )),
                        None => Err(ContentError::EmptyInput),
                    })
                    .collect();
            }
            Ok(Ok(vectors)) => {
                tracing::warn!(
                    provider = self.primary.name(),
                    expected = usable.len(),
                    got = vectors.len(),
                    "batched embedding returned wrong count, falling back"
                );
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    provider = self.primary.name(),
                    error = %e,
                    "batched embedding failed, falling back to sequential secondary"
                );
            }
            Err(_) => {
                tracing::warn!(
                    provider = self.primary.name(),
                    "batched embedding timed out, falling back to sequential secondary"
                );
            }
        }

        // Sequential secondary fallback, one text at a time.
        let mut results = Vec::with_capacity(cleaned.len());
        for (i, slot) in cleaned.iter().enumerate() {
            let Some(text) = slot else {
                results.push(Err(ContentError::EmptyInput));
                continue;
            };
            if i > 0 {
                tokio::time::sleep(self.batch_fallback_delay).await;
            }
            let for_secondary = truncate_chars(text, self.secondary.max_input_chars());
            let result = match tokio::time::timeout(
                self.request_timeout,
                self.secondary.embed(&for_secondary),
            )
            .await
            {
                Ok(Ok(vector)) => Ok(self.wrap(vector, self.secondary.as_ref())),
                Ok(Err(e)) => Err(ContentError::EmbeddingUnavailable {
                    primary: "batched call failed".into(),
                    secondary: e.to_string(),
                }),
                Err(_) => Err(ContentError::EmbeddingUnavailable {
                    primary: "batched call failed".into(),
                    secondary: format!("timed out after {:?}", self.request_timeout),
                }),
            };
            results.push(result);
        }
        results
    }

    /// One primary attempt plus exactly one retry after a rate limit.
    /// Returns the failure message plus whether the final failure was a
    /// rate limit, for the fallback path.
    async fn try_primary(&self, text: &str) -> Result<Vec<f32>, (String, bool)> {
        match tokio::time::timeout(self.request_timeout, self.primary.embed(text)).await {
            Ok(Ok(vector)) => Ok(vector),
            Ok(Err(ProviderError::RateLimited)) => {
                tracing::debug!(
                    provider = self.primary.name(),
                    backoff_ms = self.rate_limit_backoff.as_millis() as u64,
                    "rate limited, retrying once"
                );
                tokio::time::sleep(self.rate_limit_backoff).await;
                match tokio::time::timeout(self.request_timeout, self.primary.embed(text)).await
                {
                    Ok(Ok(vector)) => Ok(vector),
                    Ok(Err(e)) => Err((
                        format!("retry after rate limit failed: {}", e),
                        matches!(e, ProviderError::RateLimited),
                    )),
                    Err(_) => Err((
                        format!("retry timed out after {:?}", self.request_timeout),
                        false,
                    )),
                }
            }
            Ok(Err(e)) => Err((e.to_string(), false)),
            Err(_) => Err((format!("timed out after {:?}", self.request_timeout), false)),
        }
    }

    fn wrap(&self, vector: Vec<f32>, provider: &dyn EmbeddingProvider) -> Embedding {
        Embedding {
            dimension: vector.len(),
            vector,
            provider: provider.name().to_string(),
        }
    }
}

/// Collapse whitespace runs, trim, and truncate to `max_chars`. Returns
/// `None` when nothing remains.
pub(crate) fn clean_text(text: &str, max_chars: usize) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    Some(truncate_chars(&collapsed, max_chars))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scriptable provider: each call pops the next outcome.
    struct MockProvider {
        name: &'static str,
        dimension: usize,
        outcomes: std::sync::Mutex<Vec<Result<Vec<f32>, ProviderError>>>,
        calls: AtomicUsize,
    }

    impl MockProvider {
        fn new(
            name: &'static str,
            dimension: usize,
            outcomes: Vec<Result<Vec<f32>, ProviderError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                dimension,
                outcomes: std::sync::Mutex::new(outcomes),
                calls: AtomicUsize::new(0),
            })
        }

        fn always_ok(name: &'static str, dimension: usize) -> Arc<Self> {
            Self::new(name, dimension, vec![])
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockProvider {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.is_empty() {
                Ok(vec![0.5; self.dimension])
            } else {
                outcomes.remove(0)
            }
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn max_input_chars(&self) -> usize {
            8000
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    fn fast_config() -> EmbeddingConfig {
        EmbeddingConfig {
            request_timeout_secs: 5,
            rate_limit_backoff_ms: 1,
            batch_fallback_delay_ms: 1,
            max_in_flight: 4,
        }
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(
            clean_text("  a\n\nb\t c  ", 100).as_deref(),
            Some("a b c")
        );
        assert_eq!(clean_text("   \n\t ", 100), None);
        assert_eq!(clean_text("abcdef", 3).as_deref(), Some("abc"));
    }

    #[test]
    fn test_cleaning_is_stable() {
        let once = clean_text("  a\n b   c ", 100).unwrap();
        let twice = clean_text(&once, 100).unwrap();
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let client = EmbeddingClient::new(
            MockProvider::always_ok("primary", 1536),
            MockProvider::always_ok("secondary", 768),
            &fast_config(),
        );
        assert!(matches!(
            client.embed("   ").await,
            Err(ContentError::EmptyInput)
        ));
    }

    #[tokio::test]
    async fn test_primary_success_skips_secondary() {
        let primary = MockProvider::always_ok("primary", 1536);
        let secondary = MockProvider::always_ok("secondary", 768);
        let client =
            EmbeddingClient::new(primary.clone(), secondary.clone(), &fast_config());

        let embedding = client.embed("hello world").await.unwrap();
        assert_eq!(embedding.dimension, 1536);
        assert_eq!(embedding.provider, "primary");
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_retries_primary_once() {
        let primary = MockProvider::new(
            "primary",
            1536,
            vec![Err(ProviderError::RateLimited), Ok(vec![0.1; 1536])],
        );
        let secondary = MockProvider::always_ok("secondary", 768);
        let client =
            EmbeddingClient::new(primary.clone(), secondary.clone(), &fast_config());

        let embedding = client.embed("hello").await.unwrap();
        assert_eq!(embedding.provider, "primary");
        assert_eq!(primary.calls(), 2);
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_falls_back_to_secondary() {
        let primary = MockProvider::new(
            "primary",
            1536,
            vec![Err(ProviderError::Unavailable("boom".into()))],
        );
        let secondary = MockProvider::always_ok("secondary", 768);
        let client = EmbeddingClient::new(primary, secondary, &fast_config());

        let embedding = client.embed("hello").await.unwrap();
        assert_eq!(embedding.provider, "secondary");
        assert_eq!(embedding.dimension, 768);
    }

    #[tokio::test]
    async fn test_both_failing_reports_both_messages() {
        let primary = MockProvider::new(
            "primary",
            1536,
            vec![Err(ProviderError::Unavailable("primary down".into()))],
        );
        let secondary = MockProvider::new(
            "secondary",
            768,
            vec![Err(ProviderError::Unavailable("secondary down".into()))],
        );
        let client = EmbeddingClient::new(primary, secondary, &fast_config());

        match client.embed("hello").await {
            Err(ContentError::EmbeddingUnavailable { primary, secondary }) => {
                assert!(primary.contains("primary down"));
                assert!(secondary.contains("secondary down"));
            }
            other => panic!("expected EmbeddingUnavailable, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_throttled_everywhere_surfaces_rate_limit() {
        let primary = MockProvider::new(
            "primary",
            1536,
            vec![
                Err(ProviderError::RateLimited),
                Err(ProviderError::RateLimited),
            ],
        );
        let secondary = MockProvider::new("secondary", 768, vec![Err(ProviderError::RateLimited)]);
        let client = EmbeddingClient::new(primary, secondary, &fast_config());

        assert!(matches!(
            client.embed("hello").await,
            Err(ContentError::RateLimited)
        ));
    }

    #[tokio::test]
    async fn test_exhausted_retry_falls_back() {
        // Two rate limits in a row: retry fails, secondary takes over.
        let primary = MockProvider::new(
            "primary",
            1536,
            vec![
                Err(ProviderError::RateLimited),
                Err(ProviderError::RateLimited),
            ],
        );
        let secondary = MockProvider::always_ok("secondary", 768);
        let client =
            EmbeddingClient::new(primary.clone(), secondary, &fast_config());

        let embedding = client.embed("hello").await.unwrap();
        assert_eq!(embedding.provider, "secondary");
        assert_eq!(primary.calls(), 2);
    }

    #[tokio::test]
    async fn test_batch_empty_item_does_not_abort() {
        let primary = MockProvider::always_ok("primary", 1536);
        let secondary = MockProvider::always_ok("secondary", 768);
        let client = EmbeddingClient::new(primary, secondary, &fast_config());

        let texts = vec!["first".to_string(), "   ".to_string(), "third".to_string()];
        let results = client.embed_batch(&texts).await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(ContentError::EmptyInput)));
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn test_batch_falls_back_per_item() {
        let primary = MockProvider::new(
            "primary",
            1536,
            vec![Err(ProviderError::Unavailable("batch down".into()))],
        );
        let secondary = MockProvider::always_ok("secondary", 768);
        let client =
            EmbeddingClient::new(primary, secondary.clone(), &fast_config());

        let texts = vec!["a".to_string(), "b".to_string()];
        let results = client.embed_batch(&texts).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(secondary.calls(), 2);
        for result in results {
            assert_eq!(result.unwrap().provider, "secondary");
        }
    }
}
