use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    pub data_dir: PathBuf,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    pub max_chunk_chars: usize,
    /// Characters shared with the following chunk.
    pub overlap_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Per-request timeout for a provider call.
    pub request_timeout_secs: u64,
    /// Fixed backoff before the single rate-limit retry.
    pub rate_limit_backoff_ms: u64,
    /// Delay between sequential secondary calls in batch fallback.
    pub batch_fallback_delay_ms: u64,
    /// In-flight embedding calls during bulk ingestion.
    pub max_in_flight: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub default_k: usize,
    pub min_similarity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Overall score below this fails validation.
    pub pass_threshold: f32,
    /// High/medium-importance claims verified per analysis.
    pub max_verified_claims: usize,
    /// Timeout for one external syntax checker run.
    pub checker_timeout_secs: u64,
    /// Timeout for one completion-service call.
    pub llm_timeout_secs: u64,
}

impl ContentConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunking.max_chunk_chars < 50 {
            return Err("chunking.max_chunk_chars must be >= 50".into());
        }
        if self.chunking.overlap_chars >= self.chunking.max_chunk_chars {
            return Err("chunking.overlap_chars must be < max_chunk_chars".into());
        }
        if self.embedding.max_in_flight == 0 {
            return Err("embedding.max_in_flight must be > 0".into());
        }
        if self.retrieval.default_k == 0 {
            return Err("retrieval.default_k must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_similarity) {
            return Err("retrieval.min_similarity must be in [0.0, 1.0]".into());
        }
        if !(0.0..=100.0).contains(&self.validation.pass_threshold) {
            return Err("validation.pass_threshold must be in [0.0, 100.0]".into());
        }
        if self.validation.max_verified_claims == 0 {
            return Err("validation.max_verified_claims must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("acharya");

        Self {
            data_dir,
            chunking: ChunkingConfig {
                max_chunk_chars: 1000,
                overlap_chars: 100,
            },
            embedding: EmbeddingConfig {
                request_timeout_secs: 30,
                rate_limit_backoff_ms: 2000,
                batch_fallback_delay_ms: 200,
                max_in_flight: 4,
            },
            retrieval: RetrievalConfig {
                default_k: 8,
                min_similarity: 0.7,
            },
            validation: ValidationConfig {
                pass_threshold: 70.0,
                max_verified_claims: 10,
                checker_timeout_secs: 10,
                llm_timeout_secs: 45,
            },
        }
    }
}
