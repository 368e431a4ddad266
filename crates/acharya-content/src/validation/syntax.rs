//! Syntax checking for fenced code blocks in generated content.
//!
//! Each block is written to an isolated scratch directory and handed to a
//! language-specific checker invoked in "check only" mode. A block is
//! valid only when the checker exits cleanly; its diagnostics are kept
//! verbatim otherwise. Languages without a known checker are skipped, not
//! failed, and so is a checker binary that is not installed: absence of
//! tooling is not a syntax verdict.

use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```([A-Za-z0-9_+#.-]*)[ \t]*\r?\n(.*?)```").expect("fence regex is valid")
});

/// Combined stdout+stderr kept per block; checkers can be chatty.
const MAX_DIAGNOSTIC_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: String,
    pub code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockStatus {
    Valid,
    Invalid,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockResult {
    pub language: String,
    pub status: BlockStatus,
    /// Checker output, verbatim (truncated), for invalid blocks.
    pub diagnostics: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntaxReport {
    pub has_code: bool,
    /// Blocks dispatched to a checker (valid + invalid). Skipped blocks
    /// are tallied separately and never drag the syntax score down.
    pub blocks_checked: usize,
    pub valid_blocks: usize,
    pub invalid_blocks: usize,
    pub skipped_blocks: usize,
    pub all_valid: bool,
    pub blocks: Vec<BlockResult>,
}

impl SyntaxReport {
    fn empty() -> Self {
        Self {
            has_code: false,
            blocks_checked: 0,
            valid_blocks: 0,
            invalid_blocks: 0,
            skipped_blocks: 0,
            all_valid: true,
            blocks: Vec::new(),
        }
    }
}

pub struct SyntaxValidator {
    checker_timeout: Duration,
}

impl SyntaxValidator {
    pub fn new(checker_timeout: Duration) -> Self {
        Self { checker_timeout }
    }

    /// Extract fenced blocks and run every known-language one through its
    /// external checker. Content without code is vacuously valid.
    pub async fn validate_code(&self, markdown: &str) -> SyntaxReport {
        let blocks = extract_code_blocks(markdown);
        if blocks.is_empty() {
            return SyntaxReport::empty();
        }

        // Isolated scratch directory per validation run.
        let scratch_dir =
            std::env::temp_dir().join(format!("acharya_syntax_{}", uuid::Uuid::new_v4()));
        if let Err(e) = std::fs::create_dir_all(&scratch_dir) {
            tracing::warn!(error = %e, "could not create scratch dir, skipping syntax checks");
            let skipped: Vec<BlockResult> = blocks
                .iter()
                .map(|b| BlockResult {
                    language: b.language.clone(),
                    status: BlockStatus::Skipped,
                    diagnostics: None,
                })
                .collect();
            return summarize(skipped);
        }

        let mut results = Vec::with_capacity(blocks.len());
        for (i, block) in blocks.iter().enumerate() {
            results.push(self.check_block(block, i, &scratch_dir).await);
        }

        let _ = std::fs::remove_dir_all(&scratch_dir);

        summarize(results)
    }

    async fn check_block(&self, block: &CodeBlock, index: usize, scratch_dir: &Path) -> BlockResult {
        let Some(checker) = checker_for(&block.language) else {
            tracing::debug!(language = %block.language, "no checker for language, skipping");
            return BlockResult {
                language: block.language.clone(),
                status: BlockStatus::Skipped,
                diagnostics: None,
            };
        };

        let file_path = scratch_dir.join(format!("block_{}.{}", index, checker.extension));
        if let Err(e) = std::fs::write(&file_path, &block.code) {
            tracing::warn!(error = %e, "could not write block to scratch dir, skipping");
            return BlockResult {
                language: block.language.clone(),
                status: BlockStatus::Skipped,
                diagnostics: None,
            };
        }

        let mut command = Command::new(checker.program);
        command
            .args(checker.args)
            .arg(&file_path)
            .current_dir(scratch_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.checker_timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                // Checker binary missing or unspawnable.
                tracing::warn!(
                    program = checker.program,
                    error = %e,
                    "syntax checker unavailable, skipping block"
                );
                return BlockResult {
                    language: block.language.clone(),
                    status: BlockStatus::Skipped,
                    diagnostics: Some(format!("checker unavailable: {}", e)),
                };
            }
            Err(_) => {
                tracing::warn!(
                    program = checker.program,
                    timeout_secs = self.checker_timeout.as_secs(),
                    "syntax checker timed out, skipping block"
                );
                return BlockResult {
                    language: block.language.clone(),
                    status: BlockStatus::Skipped,
                    diagnostics: Some(format!(
                        "checker timed out after {}s",
                        self.checker_timeout.as_secs()
                    )),
                };
            }
        };

        if output.status.success() {
            BlockResult {
                language: block.language.clone(),
                status: BlockStatus::Valid,
                diagnostics: None,
            }
        } else {
            let mut diagnostics = String::from_utf8_lossy(&output.stderr).to_string();
            if diagnostics.trim().is_empty() {
                diagnostics = String::from_utf8_lossy(&output.stdout).to_string();
            }
            diagnostics.truncate(
                diagnostics
                    .char_indices()
                    .nth(MAX_DIAGNOSTIC_CHARS)
                    .map(|(i, _)| i)
                    .unwrap_or(diagnostics.len()),
            );
            tracing::debug!(language = %block.language, "block failed syntax check");
            BlockResult {
                language: block.language.clone(),
                status: BlockStatus::Invalid,
                diagnostics: Some(diagnostics),
            }
        }
    }
}

/// Extract all triple-backtick fenced blocks with their language tags.
pub fn extract_code_blocks(markdown: &str) -> Vec<CodeBlock> {
    FENCE_RE
        .captures_iter(markdown)
        .map(|cap| CodeBlock {
            language: cap
                .get(1)
                .map(|m| m.as_str().to_lowercase())
                .unwrap_or_default(),
            code: cap.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
        })
        .collect()
}

struct Checker {
    program: &'static str,
    args: &'static [&'static str],
    extension: &'static str,
}

/// Check-only invocations for the known language set.
fn checker_for(language: &str) -> Option<Checker> {
    match language {
        "python" | "py" | "python3" => Some(Checker {
            program: "python3",
            args: &["-m", "py_compile"],
            extension: "py",
        }),
        "javascript" | "js" | "node" => Some(Checker {
            program: "node",
            args: &["--check"],
            extension: "js",
        }),
        "typescript" | "ts" => Some(Checker {
            program: "deno",
            args: &["check", "--quiet"],
            extension: "ts",
        }),
        "ruby" | "rb" => Some(Checker {
            program: "ruby",
            args: &["-c"],
            extension: "rb",
        }),
        "bash" | "sh" | "shell" => Some(Checker {
            program: "bash",
            args: &["-n"],
            extension: "sh",
        }),
        "rust" | "rs" => Some(Checker {
            program: "rustc",
            args: &["--edition=2021", "--crate-type", "lib", "--emit=metadata", "--out-dir", "."],
            extension: "rs",
        }),
        _ => None,
    }
}

fn summarize(blocks: Vec<BlockResult>) -> SyntaxReport {
    let valid_blocks = blocks
        .iter()
        .filter(|b| b.status == BlockStatus::Valid)
        .count();
    let invalid_blocks = blocks
        .iter()
        .filter(|b| b.status == BlockStatus::Invalid)
        .count();
    let skipped_blocks = blocks
        .iter()
        .filter(|b| b.status == BlockStatus::Skipped)
        .count();

    SyntaxReport {
        has_code: true,
        blocks_checked: valid_blocks + invalid_blocks,
        valid_blocks,
        invalid_blocks,
        skipped_blocks,
        all_valid: invalid_blocks == 0,
        blocks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_validator() -> SyntaxValidator {
        SyntaxValidator::new(Duration::from_secs(10))
    }

    #[test]
    fn test_extract_blocks_with_language_tags() {
        let markdown = "Intro.\n```python\nprint('hi')\n```\nMiddle.\n```js\nconsole.log(1)\n```\n";
        let blocks = extract_code_blocks(markdown);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].language, "python");
        assert_eq!(blocks[0].code, "print('hi')\n");
        assert_eq!(blocks[1].language, "js");
    }

    #[test]
    fn test_extract_block_without_language_tag() {
        let markdown = "```\nplain text\n```";
        let blocks = extract_code_blocks(markdown);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language, "");
    }

    #[test]
    fn test_extract_ignores_inline_backticks() {
        let markdown = "Use `print()` to write output.";
        assert!(extract_code_blocks(markdown).is_empty());
    }

    #[tokio::test]
    async fn test_no_code_is_vacuously_valid() {
        let report = make_validator()
            .validate_code("Just prose about algorithms, no code at all.")
            .await;
        assert!(!report.has_code);
        assert!(report.all_valid);
        assert_eq!(report.blocks_checked, 0);
    }

    #[tokio::test]
    async fn test_unknown_language_is_skipped_not_invalid() {
        let markdown = "```brainfuck\n+++---\n```";
        let report = make_validator().validate_code(markdown).await;
        assert!(report.has_code);
        assert_eq!(report.skipped_blocks, 1);
        assert_eq!(report.invalid_blocks, 0);
        assert!(report.all_valid);
    }

    #[tokio::test]
    async fn test_valid_python_block_passes() {
        let markdown = "```python\ndef add(a, b):\n    return a + b\n```";
        let report = make_validator().validate_code(markdown).await;
        assert!(report.has_code);
        // Either python3 ran and validated, or it is not installed and the
        // block was skipped. Never invalid.
        assert_eq!(report.invalid_blocks, 0);
        assert!(report.all_valid);
    }

    #[tokio::test]
    async fn test_invalid_python_block_fails_with_diagnostics() {
        // Unmatched parenthesis.
        let markdown = "```python\ndef broken(:\n    return (1\n```";
        let report = make_validator().validate_code(markdown).await;
        assert!(report.has_code);

        if report.skipped_blocks == 1 {
            // Checker not installed in this environment; nothing to assert.
            return;
        }
        assert_eq!(report.blocks_checked, 1);
        assert_eq!(report.invalid_blocks, 1);
        assert!(!report.all_valid);
        let diagnostics = report.blocks[0].diagnostics.as_deref().unwrap_or("");
        assert!(!diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_mixed_blocks_are_counted_independently() {
        let markdown = concat!(
            "```python\nx = 1\n```\n",
            "```brainfuck\n+++\n```\n",
            "```bash\necho ok\n```\n",
        );
        let report = make_validator().validate_code(markdown).await;
        assert!(report.has_code);
        assert_eq!(report.blocks.len(), 3);
        assert_eq!(
            report.blocks_checked + report.skipped_blocks,
            report.blocks.len()
        );
        // The unknown language is always among the skipped.
        assert!(report.skipped_blocks >= 1);
    }
}
