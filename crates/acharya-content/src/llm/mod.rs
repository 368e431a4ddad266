//! Completion-service seam used by quality evaluation and claim analysis.
//!
//! Structured tasks expect parseable JSON back from the model; the
//! extraction helpers here tolerate code fences and surrounding prose,
//! and callers treat a still-unparseable payload as a recoverable
//! failure, never a crash.

pub mod external;

pub use external::{CompletionApi, ExternalCompletionClient};

use anyhow::Result;
use async_trait::async_trait;

/// One language-model completion call.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<String>;
}

/// Pull the first JSON object out of a model response.
///
/// Three-tier strategy:
/// 1. Direct parse of the trimmed output
/// 2. Parse after stripping markdown code fences
/// 3. Parse the first `{` .. last `}` slice
pub(crate) fn extract_json_object(raw: &str) -> Option<serde_json::Value> {
    let trimmed = strip_fences(raw);

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

/// Pull the first JSON array out of a model response. Same strategy as
/// `extract_json_object` with `[` / `]` delimiters.
pub(crate) fn extract_json_array(raw: &str) -> Option<serde_json::Value> {
    let trimmed = strip_fences(raw);

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if value.is_array() {
            return Some(value);
        }
    }

    let start = trimmed.find('[')?;
    let end = trimmed.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

fn strip_fences(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}
