//! Claim-level grounding analysis.
//!
//! Two-phase pipeline against the completion service: extract discrete,
//! independently verifiable factual claims from generated content, then
//! verify each one against retrieved source text. The verifier only
//! annotates and reports; it never modifies the content.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::llm::{extract_json_array, extract_json_object, CompletionProvider};
use crate::types::{RetrievedMatch, ScoreBand};

const EXTRACTION_SYSTEM_PROMPT: &str = "You extract discrete, independently verifiable factual claims from \
     educational content. You always respond with a JSON array and nothing else.";

const VERIFICATION_SYSTEM_PROMPT: &str = "You verify whether a factual claim is supported by source excerpts. \
     You always respond with a single JSON object and nothing else.";

const EXTRACTION_MAX_TOKENS: usize = 1024;
const VERIFICATION_MAX_TOKENS: usize = 512;
const ANALYSIS_TEMPERATURE: f32 = 0.1;

/// Source excerpts included per verification call.
const MAX_CONTEXT_EXCERPTS: usize = 6;
const MAX_EXCERPT_CHARS: usize = 600;

/// Aggregate-score contribution per verification status.
const VERIFIED_CREDIT: f32 = 100.0;
const PARTIAL_CREDIT: f32 = 60.0;
const NOT_FOUND_CREDIT: f32 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimImportance {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    Definition,
    TechnicalFact,
    AlgorithmDescription,
    Other,
}

/// A factual statement extracted from generated content. Ephemeral:
/// exists only for the duration of one analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: String,
    pub text: String,
    pub claim_type: ClaimType,
    pub importance: ClaimImportance,
    /// Approximate location in the content ("section 2", "code example").
    pub location: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    PartiallyVerified,
    NotFound,
    Contradicted,
    NoSources,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimVerification {
    pub claim_id: String,
    pub claim_text: String,
    pub status: VerificationStatus,
    /// 0-100.
    pub confidence: f32,
    /// Supporting or contradicting quotation, when one was located.
    pub matched_fact: Option<String>,
    pub source_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingAnalysis {
    pub total_claims: usize,
    /// Claims actually sent through verification (high/medium, capped).
    pub claims_processed: usize,
    pub verified: usize,
    pub partially_verified: usize,
    pub not_found: usize,
    pub contradicted: usize,
    pub no_sources: usize,
    pub overall_grounding_score: f32,
    pub band: ScoreBand,
    pub verifications: Vec<ClaimVerification>,
    pub recommendations: Vec<String>,
    /// False when claim extraction itself failed and the analysis fell
    /// back to the trivial report.
    pub success: bool,
}

impl GroundingAnalysis {
    /// Report for content with nothing to verify.
    fn trivial(success: bool) -> Self {
        Self {
            total_claims: 0,
            claims_processed: 0,
            verified: 0,
            partially_verified: 0,
            not_found: 0,
            contradicted: 0,
            no_sources: 0,
            overall_grounding_score: 100.0,
            band: ScoreBand::Excellent,
            verifications: Vec::new(),
            recommendations: Vec::new(),
            success,
        }
    }
}

pub struct ClaimVerifier {
    llm: Arc<dyn CompletionProvider>,
    max_claims: usize,
    call_timeout: Duration,
}

impl ClaimVerifier {
    pub fn new(llm: Arc<dyn CompletionProvider>, max_claims: usize, call_timeout: Duration) -> Self {
        Self {
            llm,
            max_claims,
            call_timeout,
        }
    }

    /// Extract claims from `content` and verify each against `sources`.
    pub async fn analyze(&self, content: &str, sources: &[RetrievedMatch]) -> GroundingAnalysis {
        let claims = match self.extract_claims(content).await {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!(error = %e, "claim extraction failed, reporting trivial analysis");
                return GroundingAnalysis::trivial(false);
            }
        };

        if claims.is_empty() {
            tracing::debug!("content has no verifiable claims");
            return GroundingAnalysis::trivial(true);
        }
        let total_claims = claims.len();

        // Highest importance first, low-importance claims not verified,
        // capped for cost control.
        let mut selected: Vec<&Claim> = claims
            .iter()
            .filter(|c| c.importance != ClaimImportance::Low)
            .collect();
        selected.sort_by(|a, b| b.importance.cmp(&a.importance));
        selected.truncate(self.max_claims);

        if selected.is_empty() {
            return GroundingAnalysis {
                total_claims,
                ..GroundingAnalysis::trivial(true)
            };
        }

        let context = build_source_context(sources);
        let mut verifications = Vec::with_capacity(selected.len());
        for claim in selected {
            verifications.push(self.verify_claim(claim, context.as_deref()).await);
        }

        aggregate(total_claims, verifications)
    }

    async fn extract_claims(&self, content: &str) -> anyhow::Result<Vec<Claim>> {
        let prompt = format!(
            "Extract the discrete factual claims from the content below: definitions, \
             technical facts, and algorithm descriptions that could each be checked \
             against a reference text on their own. Ignore opinions, examples, and \
             exercise instructions.\n\n\
             Respond with ONLY a JSON array, one object per claim:\n\
             [{{\"text\": \"...\", \"type\": \"definition|technical_fact|algorithm_description|other\", \
             \"importance\": \"high|medium|low\", \"location\": \"...\"}}]\n\
             Return [] if the content contains no verifiable claims.\n\n\
             CONTENT:\n{}",
            content
        );

        let raw = tokio::time::timeout(
            self.call_timeout,
            self.llm.complete(
                EXTRACTION_SYSTEM_PROMPT,
                &prompt,
                EXTRACTION_MAX_TOKENS,
                ANALYSIS_TEMPERATURE,
            ),
        )
        .await
        .map_err(|_| anyhow::anyhow!("claim extraction timed out"))??;

        let value = extract_json_array(&raw)
            .ok_or_else(|| anyhow::anyhow!("no JSON array in extraction output"))?;

        let payloads: Vec<ClaimPayload> = serde_json::from_value(value)?;
        Ok(payloads
            .into_iter()
            .enumerate()
            .filter(|(_, p)| !p.text.trim().is_empty())
            .map(|(i, p)| Claim {
                id: format!("claim-{}", i + 1),
                text: p.text.trim().to_string(),
                claim_type: p.claim_type,
                importance: p.importance,
                location: p.location,
            })
            .collect())
    }

    async fn verify_claim(&self, claim: &Claim, context: Option<&str>) -> ClaimVerification {
        // Missing or unusable source context short-circuits the claim.
        let Some(context) = context else {
            return ClaimVerification {
                claim_id: claim.id.clone(),
                claim_text: claim.text.clone(),
                status: VerificationStatus::NoSources,
                confidence: 0.0,
                matched_fact: None,
                source_label: None,
            };
        };

        let prompt = format!(
            "CLAIM: {}\n\nSOURCE EXCERPTS:\n{}\n\n\
             Does the source material support the claim? Quote the most relevant \
             passage. Respond with ONLY this JSON object:\n\
             {{\"status\": \"verified|partially_verified|not_found|contradicted\", \
             \"confidence\": 0, \"matched_fact\": \"...\", \"source\": \"...\"}}\n\
             Use \"verified\" only when an excerpt states the claim outright, \
             \"partially_verified\" when an excerpt supports part of it, \
             \"not_found\" when the excerpts are silent, and \"contradicted\" \
             when an excerpt states the opposite. Confidence is 0-100.",
            claim.text, context
        );

        let raw = match tokio::time::timeout(
            self.call_timeout,
            self.llm.complete(
                VERIFICATION_SYSTEM_PROMPT,
                &prompt,
                VERIFICATION_MAX_TOKENS,
                ANALYSIS_TEMPERATURE,
            ),
        )
        .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                tracing::warn!(claim_id = %claim.id, error = %e, "claim verification call failed");
                return not_found_fallback(claim);
            }
            Err(_) => {
                tracing::warn!(claim_id = %claim.id, "claim verification timed out");
                return not_found_fallback(claim);
            }
        };

        match parse_verification(&raw) {
            Some(payload) => ClaimVerification {
                claim_id: claim.id.clone(),
                claim_text: claim.text.clone(),
                status: payload.status,
                confidence: payload.confidence.clamp(0.0, 100.0),
                matched_fact: payload.matched_fact.filter(|f| !f.trim().is_empty()),
                source_label: payload.source.filter(|s| !s.trim().is_empty()),
            },
            None => {
                tracing::warn!(
                    claim_id = %claim.id,
                    output = %raw.chars().take(200).collect::<String>(),
                    "could not parse claim verification output"
                );
                not_found_fallback(claim)
            }
        }
    }
}

/// An unusable verification leg counts as "not found" with zero
/// confidence rather than aborting the analysis.
fn not_found_fallback(claim: &Claim) -> ClaimVerification {
    ClaimVerification {
        claim_id: claim.id.clone(),
        claim_text: claim.text.clone(),
        status: VerificationStatus::NotFound,
        confidence: 0.0,
        matched_fact: None,
        source_label: None,
    }
}

fn build_source_context(sources: &[RetrievedMatch]) -> Option<String> {
    let excerpts: Vec<String> = sources
        .iter()
        .filter(|s| !s.chunk_text.trim().is_empty())
        .take(MAX_CONTEXT_EXCERPTS)
        .map(|s| {
            let snippet: String = s.chunk_text.chars().take(MAX_EXCERPT_CHARS).collect();
            format!("[{}] {}", s.source_title, snippet)
        })
        .collect();

    if excerpts.is_empty() {
        None
    } else {
        Some(excerpts.join("\n---\n"))
    }
}

fn aggregate(total_claims: usize, verifications: Vec<ClaimVerification>) -> GroundingAnalysis {
    let count =
        |status: VerificationStatus| verifications.iter().filter(|v| v.status == status).count();

    let verified = count(VerificationStatus::Verified);
    let partially_verified = count(VerificationStatus::PartiallyVerified);
    let not_found = count(VerificationStatus::NotFound);
    let contradicted = count(VerificationStatus::Contradicted);
    let no_sources = count(VerificationStatus::NoSources);
    let claims_processed = verifications.len();

    // Contradicted and sourceless claims contribute nothing positive.
    let score = if claims_processed == 0 {
        100.0
    } else {
        ((verified as f32 * VERIFIED_CREDIT
            + partially_verified as f32 * PARTIAL_CREDIT
            + not_found as f32 * NOT_FOUND_CREDIT)
            / (claims_processed as f32 * 100.0)
            * 100.0)
            .round()
    };

    let mut recommendations = Vec::new();
    for verification in &verifications {
        if verification.status == VerificationStatus::Contradicted {
            let against = verification
                .source_label
                .as_deref()
                .unwrap_or("the source material");
            recommendations.push(format!(
                "Contradicted claim, revise or remove: \"{}\" (against {})",
                verification.claim_text, against
            ));
        }
    }
    if no_sources == claims_processed && claims_processed > 0 {
        recommendations.push(
            "No source material was available; regenerate after ingesting relevant documents"
                .to_string(),
        );
    } else if score < 60.0 {
        recommendations.push(
            "Several claims lack support in the source material; consider adding citations or regenerating with more context"
                .to_string(),
        );
    }

    GroundingAnalysis {
        total_claims,
        claims_processed,
        verified,
        partially_verified,
        not_found,
        contradicted,
        no_sources,
        overall_grounding_score: score,
        band: ScoreBand::from_score(score),
        verifications,
        recommendations,
        success: true,
    }
}

#[derive(Deserialize)]
struct ClaimPayload {
    text: String,
    #[serde(rename = "type", default = "default_claim_type")]
    claim_type: ClaimType,
    #[serde(default = "default_importance")]
    importance: ClaimImportance,
    #[serde(default)]
    location: String,
}

fn default_claim_type() -> ClaimType {
    ClaimType::Other
}

fn default_importance() -> ClaimImportance {
    ClaimImportance::Medium
}

#[derive(Deserialize)]
struct VerificationPayload {
    status: VerificationStatus,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    matched_fact: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

fn parse_verification(raw: &str) -> Option<VerificationPayload> {
    let value = extract_json_object(raw)?;
    serde_json::from_value(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// LLM mock: first response answers extraction, the rest answer
    /// verification calls in order.
    struct ScriptedLlm {
        responses: Mutex<Vec<Result<String, String>>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<Result<String, String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
            })
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedLlm {
        async fn complete(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _max_tokens: usize,
            _temperature: f32,
        ) -> Result<String> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                anyhow::bail!("no scripted response left");
            }
            match responses.remove(0) {
                Ok(text) => Ok(text),
                Err(message) => anyhow::bail!("{}", message),
            }
        }
    }

    fn make_verifier(responses: Vec<Result<String, String>>) -> ClaimVerifier {
        ClaimVerifier::new(ScriptedLlm::new(responses), 10, Duration::from_secs(5))
    }

    fn make_match(title: &str, text: &str) -> RetrievedMatch {
        RetrievedMatch {
            chunk_text: text.to_string(),
            source_id: "s1".to_string(),
            source_title: title.to_string(),
            source_category: "textbook".to_string(),
            similarity: 0.9,
        }
    }

    fn extraction(claims: &str) -> Result<String, String> {
        Ok(claims.to_string())
    }

    fn verification(status: &str, confidence: u32) -> Result<String, String> {
        Ok(format!(
            r#"{{"status": "{}", "confidence": {}, "matched_fact": "quote", "source": "Textbook"}}"#,
            status, confidence
        ))
    }

    #[tokio::test]
    async fn test_no_claims_short_circuits_to_trivial_report() {
        let verifier = make_verifier(vec![extraction("[]")]);
        let analysis = verifier.analyze("Welcome to the course!", &[]).await;

        assert!(analysis.success);
        assert_eq!(analysis.total_claims, 0);
        assert_eq!(analysis.overall_grounding_score, 100.0);
    }

    #[tokio::test]
    async fn test_extraction_failure_degrades_to_trivial_report() {
        let verifier = make_verifier(vec![Err("llm offline".to_string())]);
        let analysis = verifier.analyze("Some content.", &[]).await;

        assert!(!analysis.success);
        assert_eq!(analysis.total_claims, 0);
        assert_eq!(analysis.overall_grounding_score, 100.0);
    }

    #[tokio::test]
    async fn test_all_verified_scores_100() {
        let claims = r#"[
            {"text": "A stack is LIFO", "type": "definition", "importance": "high", "location": "intro"},
            {"text": "Binary search is O(log n)", "type": "technical_fact", "importance": "high", "location": "body"}
        ]"#;
        let verifier = make_verifier(vec![
            extraction(claims),
            verification("verified", 95),
            verification("verified", 90),
        ]);
        let sources = vec![make_match("Textbook", "A stack is last-in first-out...")];

        let analysis = verifier.analyze("content", &sources).await;
        assert_eq!(analysis.total_claims, 2);
        assert_eq!(analysis.claims_processed, 2);
        assert_eq!(analysis.verified, 2);
        assert_eq!(analysis.overall_grounding_score, 100.0);
        assert_eq!(analysis.band, ScoreBand::Excellent);
        assert!(analysis.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_mixed_statuses_follow_weighted_formula() {
        let claims = r#"[
            {"text": "c1", "type": "definition", "importance": "high", "location": "a"},
            {"text": "c2", "type": "technical_fact", "importance": "high", "location": "b"},
            {"text": "c3", "type": "technical_fact", "importance": "medium", "location": "c"}
        ]"#;
        let verifier = make_verifier(vec![
            extraction(claims),
            verification("verified", 95),
            verification("partially_verified", 60),
            verification("not_found", 20),
        ]);
        let sources = vec![make_match("Textbook", "reference text")];

        let analysis = verifier.analyze("content", &sources).await;
        // (100 + 60 + 30) / 300 * 100 = 63.33 → 63
        assert_eq!(analysis.overall_grounding_score, 63.0);
        assert_eq!(analysis.band, ScoreBand::Good);
    }

    #[tokio::test]
    async fn test_contradicted_claim_surfaces_recommendation() {
        let claims = r#"[
            {"text": "Bubble sort is O(log n)", "type": "technical_fact", "importance": "high", "location": "body"}
        ]"#;
        let verifier = make_verifier(vec![
            extraction(claims),
            verification("contradicted", 90),
        ]);
        let sources = vec![make_match("Textbook", "Bubble sort runs in O(n^2) time.")];

        let analysis = verifier.analyze("content", &sources).await;
        assert_eq!(analysis.contradicted, 1);
        assert_eq!(analysis.overall_grounding_score, 0.0);
        assert!(analysis.recommendations[0].contains("Contradicted claim"));
    }

    #[tokio::test]
    async fn test_no_source_context_short_circuits_claims() {
        let claims = r#"[
            {"text": "A queue is FIFO", "type": "definition", "importance": "high", "location": "intro"}
        ]"#;
        // Only the extraction response: verification must not hit the LLM.
        let verifier = make_verifier(vec![extraction(claims)]);

        let analysis = verifier.analyze("content", &[]).await;
        assert_eq!(analysis.no_sources, 1);
        assert_eq!(analysis.overall_grounding_score, 0.0);
        assert_eq!(analysis.verifications[0].confidence, 0.0);
        assert!(analysis
            .recommendations
            .iter()
            .any(|r| r.contains("No source material")));
    }

    #[tokio::test]
    async fn test_low_importance_claims_are_not_verified() {
        let claims = r#"[
            {"text": "minor aside", "type": "other", "importance": "low", "location": "footer"}
        ]"#;
        let verifier = make_verifier(vec![extraction(claims)]);

        let analysis = verifier.analyze("content", &[]).await;
        assert_eq!(analysis.total_claims, 1);
        assert_eq!(analysis.claims_processed, 0);
        assert_eq!(analysis.overall_grounding_score, 100.0);
    }

    #[tokio::test]
    async fn test_verification_cap_prefers_high_importance() {
        let mut claim_objects = Vec::new();
        for i in 0..8 {
            claim_objects.push(format!(
                r#"{{"text": "medium {}", "type": "technical_fact", "importance": "medium", "location": "x"}}"#,
                i
            ));
        }
        for i in 0..8 {
            claim_objects.push(format!(
                r#"{{"text": "high {}", "type": "technical_fact", "importance": "high", "location": "x"}}"#,
                i
            ));
        }
        let claims = format!("[{}]", claim_objects.join(","));

        let mut responses = vec![extraction(&claims)];
        for _ in 0..10 {
            responses.push(verification("verified", 90));
        }
        let verifier = ClaimVerifier::new(
            ScriptedLlm::new(responses),
            10,
            Duration::from_secs(5),
        );
        let sources = vec![make_match("Textbook", "reference text")];

        let analysis = verifier.analyze("content", &sources).await;
        assert_eq!(analysis.total_claims, 16);
        assert_eq!(analysis.claims_processed, 10);
        // All 8 high-importance claims made the cut.
        let high_count = analysis
            .verifications
            .iter()
            .filter(|v| v.claim_text.starts_with("high"))
            .count();
        assert_eq!(high_count, 8);
    }

    #[tokio::test]
    async fn test_unparseable_verification_counts_as_not_found() {
        let claims = r#"[
            {"text": "c1", "type": "definition", "importance": "high", "location": "a"}
        ]"#;
        let verifier = make_verifier(vec![
            extraction(claims),
            Ok("sorry, I can't say".to_string()),
        ]);
        let sources = vec![make_match("Textbook", "reference text")];

        let analysis = verifier.analyze("content", &sources).await;
        assert_eq!(analysis.not_found, 1);
        assert_eq!(analysis.verifications[0].confidence, 0.0);
        // 30/100 → 30
        assert_eq!(analysis.overall_grounding_score, 30.0);
    }
}
