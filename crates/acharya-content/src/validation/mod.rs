//! Multi-stage validation for generated course content: syntax checking,
//! citation grounding, rubric-based quality scoring, and claim-level
//! fact verification.

pub mod claims;
pub mod grounding;
pub mod orchestrator;
pub mod quality;
pub mod syntax;

pub use claims::{
    Claim, ClaimImportance, ClaimType, ClaimVerification, ClaimVerifier, GroundingAnalysis,
    VerificationStatus,
};
pub use grounding::{
    CitationExtractor, GroundingChecker, GroundingReport, PatternCitationExtractor,
};
pub use orchestrator::{
    format_report, ContentValidator, OverallVerdict, ScoreBreakdown, ValidationReport,
};
pub use quality::{QualityEvaluator, QualityReport, QualityRubric};
pub use syntax::{extract_code_blocks, BlockResult, BlockStatus, SyntaxReport, SyntaxValidator};
