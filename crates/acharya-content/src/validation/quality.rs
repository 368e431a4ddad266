//! Rubric-based quality scoring via the completion service.
//!
//! The evaluator sends the content plus the syntax and grounding reports
//! as context and asks for a fixed JSON rubric. Any parse failure falls
//! back to a neutral midpoint score with `success: false`; a flaky
//! evaluator must never abort the validation run.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::llm::{extract_json_object, CompletionProvider};

use super::grounding::GroundingReport;
use super::syntax::SyntaxReport;

const EVALUATOR_SYSTEM_PROMPT: &str = "You are a strict reviewer of educational course content. \
     You always respond with a single JSON object and nothing else.";

const EVALUATION_MAX_TOKENS: usize = 1024;
const EVALUATION_TEMPERATURE: f32 = 0.2;

/// Midpoint fallback on the 0-10 scale when the evaluator is unusable.
const NEUTRAL_SCORE: f32 = 5.0;

/// Six rubric dimensions, each 0-10.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityRubric {
    pub accuracy: f32,
    pub clarity: f32,
    pub completeness: f32,
    pub structure: f32,
    pub engagement: f32,
    pub difficulty_calibration: f32,
}

impl QualityRubric {
    pub fn mean(&self) -> f32 {
        (self.accuracy
            + self.clarity
            + self.completeness
            + self.structure
            + self.engagement
            + self.difficulty_calibration)
            / 6.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    /// False when the evaluator failed or returned an unparseable payload.
    pub success: bool,
    /// 0-10; mean of the rubric when the evaluator succeeded.
    pub overall_score: f32,
    pub rubric: Option<QualityRubric>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<String>,
    /// Non-empty critical issues block acceptance regardless of score.
    pub critical_issues: Vec<String>,
}

impl QualityReport {
    pub fn neutral() -> Self {
        Self {
            success: false,
            overall_score: NEUTRAL_SCORE,
            rubric: None,
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            recommendations: Vec::new(),
            critical_issues: Vec::new(),
        }
    }
}

pub struct QualityEvaluator {
    llm: Arc<dyn CompletionProvider>,
    call_timeout: Duration,
}

impl QualityEvaluator {
    pub fn new(llm: Arc<dyn CompletionProvider>, call_timeout: Duration) -> Self {
        Self { llm, call_timeout }
    }

    /// Score `content` against the rubric. Never fails: evaluator errors
    /// degrade to the neutral report.
    pub async fn evaluate(
        &self,
        content: &str,
        topic: &str,
        content_type: &str,
        syntax: &SyntaxReport,
        grounding: &GroundingReport,
    ) -> QualityReport {
        let prompt = build_prompt(content, topic, content_type, syntax, grounding);

        let raw = match tokio::time::timeout(
            self.call_timeout,
            self.llm.complete(
                EVALUATOR_SYSTEM_PROMPT,
                &prompt,
                EVALUATION_MAX_TOKENS,
                EVALUATION_TEMPERATURE,
            ),
        )
        .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "quality evaluation call failed, using neutral score");
                return QualityReport::neutral();
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.call_timeout.as_secs(),
                    "quality evaluation timed out, using neutral score"
                );
                return QualityReport::neutral();
            }
        };

        match parse_evaluation(&raw) {
            Some(report) => report,
            None => {
                tracing::warn!(
                    output = %raw.chars().take(200).collect::<String>(),
                    "could not parse quality evaluation, using neutral score"
                );
                QualityReport::neutral()
            }
        }
    }
}

fn build_prompt(
    content: &str,
    topic: &str,
    content_type: &str,
    syntax: &SyntaxReport,
    grounding: &GroundingReport,
) -> String {
    format!(
        "Evaluate the following {content_type} on the topic \"{topic}\".\n\n\
         Automated checks already ran:\n\
         - Code blocks: {checked} checked, {invalid} invalid, {skipped} skipped\n\
         - Citations: {resolved}/{citations} resolved against known sources \
         (grounding score {grounding_score})\n\n\
         Score each dimension 0-10 and list observations. Respond with ONLY this JSON object:\n\
         {{\n\
           \"accuracy\": 0,\n\
           \"clarity\": 0,\n\
           \"completeness\": 0,\n\
           \"structure\": 0,\n\
           \"engagement\": 0,\n\
           \"difficulty_calibration\": 0,\n\
           \"strengths\": [],\n\
           \"weaknesses\": [],\n\
           \"recommendations\": [],\n\
           \"critical_issues\": []\n\
         }}\n\
         List a critical issue ONLY for problems that make the content unusable \
         (factually wrong explanations, broken code presented as working, dangerous advice).\n\n\
         CONTENT:\n{content}",
        content_type = content_type,
        topic = topic,
        checked = syntax.blocks_checked,
        invalid = syntax.invalid_blocks,
        skipped = syntax.skipped_blocks,
        resolved = grounding.resolved_citations,
        citations = grounding.total_citations,
        grounding_score = grounding.grounding_score,
        content = content,
    )
}

#[derive(Deserialize)]
struct EvaluationPayload {
    accuracy: f32,
    clarity: f32,
    completeness: f32,
    structure: f32,
    engagement: f32,
    difficulty_calibration: f32,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
    #[serde(default)]
    recommendations: Vec<String>,
    #[serde(default)]
    critical_issues: Vec<String>,
}

fn parse_evaluation(raw: &str) -> Option<QualityReport> {
    let value = extract_json_object(raw)?;
    let payload: EvaluationPayload = serde_json::from_value(value).ok()?;

    let rubric = QualityRubric {
        accuracy: clamp_score(payload.accuracy),
        clarity: clamp_score(payload.clarity),
        completeness: clamp_score(payload.completeness),
        structure: clamp_score(payload.structure),
        engagement: clamp_score(payload.engagement),
        difficulty_calibration: clamp_score(payload.difficulty_calibration),
    };

    Some(QualityReport {
        success: true,
        overall_score: rubric.mean(),
        rubric: Some(rubric),
        strengths: payload.strengths,
        weaknesses: payload.weaknesses,
        recommendations: payload.recommendations,
        critical_issues: payload
            .critical_issues
            .into_iter()
            .filter(|issue| !issue.trim().is_empty())
            .collect(),
    })
}

fn clamp_score(score: f32) -> f32 {
    if score.is_finite() {
        score.clamp(0.0, 10.0)
    } else {
        0.0
    }
}
