//! Validation pipeline: syntax + grounding + quality, combined into one
//! weighted overall score and a pass/fail verdict.
//!
//! The overall score is a deterministic function of its three inputs.
//! A reported critical issue is an automatic block regardless of score.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ValidationConfig;
use crate::llm::CompletionProvider;
use crate::types::{ScoreBand, SourceMeta};

use super::grounding::{GroundingChecker, GroundingReport};
use super::quality::{QualityEvaluator, QualityReport};
use super::syntax::{SyntaxReport, SyntaxValidator};

const SYNTAX_WEIGHT: f32 = 0.25;
const GROUNDING_WEIGHT: f32 = 0.25;
const QUALITY_WEIGHT: f32 = 0.5;

/// Quality contribution when the evaluator was unusable.
const NEUTRAL_QUALITY_SCORE: f32 = 50.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub syntax_score: f32,
    pub grounding_score: f32,
    pub quality_score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverallVerdict {
    /// Weighted combination, 0-100.
    pub score: u32,
    pub band: ScoreBand,
    pub passes: bool,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub topic: String,
    pub content_type: String,
    pub syntax: SyntaxReport,
    pub grounding: GroundingReport,
    pub quality: QualityReport,
    pub overall: OverallVerdict,
    pub validated_at: DateTime<Utc>,
}

pub struct ContentValidator {
    syntax: SyntaxValidator,
    grounding: GroundingChecker,
    quality: QualityEvaluator,
    pass_threshold: f32,
}

impl ContentValidator {
    pub fn new(llm: Arc<dyn CompletionProvider>, config: &ValidationConfig) -> Self {
        Self {
            syntax: SyntaxValidator::new(Duration::from_secs(config.checker_timeout_secs)),
            grounding: GroundingChecker::new(),
            quality: QualityEvaluator::new(llm, Duration::from_secs(config.llm_timeout_secs)),
            pass_threshold: config.pass_threshold,
        }
    }

    /// Validate one piece of generated content. Re-running with identical
    /// inputs and identical external responses yields an identical report.
    pub async fn validate(
        &self,
        content: &str,
        topic: &str,
        content_type: &str,
        known_sources: &[SourceMeta],
    ) -> ValidationReport {
        let syntax = self.syntax.validate_code(content).await;
        let grounding = self.grounding.check(content, known_sources);
        let quality = self
            .quality
            .evaluate(content, topic, content_type, &syntax, &grounding)
            .await;

        let overall = self.combine(&syntax, &grounding, &quality);

        tracing::debug!(
            topic,
            score = overall.score,
            passes = overall.passes,
            "validation complete"
        );

        ValidationReport {
            topic: topic.to_string(),
            content_type: content_type.to_string(),
            syntax,
            grounding,
            quality,
            overall,
            validated_at: Utc::now(),
        }
    }

    fn combine(
        &self,
        syntax: &SyntaxReport,
        grounding: &GroundingReport,
        quality: &QualityReport,
    ) -> OverallVerdict {
        let syntax_score = if syntax.blocks_checked == 0 {
            100.0
        } else {
            syntax.valid_blocks as f32 / syntax.blocks_checked as f32 * 100.0
        };

        let quality_score = if quality.success {
            quality.overall_score / 10.0 * 100.0
        } else {
            NEUTRAL_QUALITY_SCORE
        };

        let score = (syntax_score * SYNTAX_WEIGHT
            + grounding.grounding_score * GROUNDING_WEIGHT
            + quality_score * QUALITY_WEIGHT)
            .round() as u32;

        // Any critical issue blocks acceptance outright, as does invalid
        // code, no matter how high the weighted score lands.
        let passes = score as f32 >= self.pass_threshold
            && syntax.all_valid
            && quality.critical_issues.is_empty();

        OverallVerdict {
            score,
            band: ScoreBand::from_score(score as f32),
            passes,
            breakdown: ScoreBreakdown {
                syntax_score,
                grounding_score: grounding.grounding_score,
                quality_score,
            },
        }
    }
}

/// Format a validation report as a human-readable summary.
pub fn format_report(report: &ValidationReport) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "=== Validation Report: {} ({}) ===\n\n",
        report.topic, report.content_type
    ));
    out.push_str(&format!(
        "Overall: {}/100 ({}) - {}\n\n",
        report.overall.score,
        report.overall.band,
        if report.overall.passes { "PASS" } else { "FAIL" }
    ));

    out.push_str("| Signal    | Score  |\n");
    out.push_str("|-----------|--------|\n");
    out.push_str(&format!(
        "| Syntax    | {:>6.1} |\n",
        report.overall.breakdown.syntax_score
    ));
    out.push_str(&format!(
        "| Grounding | {:>6.1} |\n",
        report.overall.breakdown.grounding_score
    ));
    out.push_str(&format!(
        "| Quality   | {:>6.1} |\n",
        report.overall.breakdown.quality_score
    ));

    if report.syntax.has_code {
        out.push_str(&format!(
            "\nCode blocks: {} valid, {} invalid, {} skipped\n",
            report.syntax.valid_blocks, report.syntax.invalid_blocks, report.syntax.skipped_blocks
        ));
    }
    if report.grounding.total_citations > 0 {
        out.push_str(&format!(
            "Citations: {}/{} resolved\n",
            report.grounding.resolved_citations, report.grounding.total_citations
        ));
    }
    if !report.quality.critical_issues.is_empty() {
        out.push_str("\n--- Critical issues ---\n");
        for issue in &report.quality.critical_issues {
            out.push_str(&format!("  - {}\n", issue));
        }
    }
    if !report.quality.recommendations.is_empty() {
        out.push_str("\n--- Recommendations ---\n");
        for recommendation in &report.quality.recommendations {
            out.push_str(&format!("  - {}\n", recommendation));
        }
    }

    out
}
