//! Executor error types.

use std::path::PathBuf;

use thiserror::Error;

use super::dirstack::DirectoryScopeError;
use super::template::TemplateError;

/// A run that could not start or could not be unwound.
///
/// A failing step is not an `ExecuteError`; it is reported as
/// [`RunState::Failed`](super::RunState::Failed) in the execution report.
#[derive(Error, Debug)]
pub enum ExecuteError {
    #[error("step {index}: {source}")]
    Template {
        index: usize,
        source: TemplateError,
    },

    #[error("step {index}: no installer registered for language '{language}' (known: {known})")]
    UnknownDelegate {
        index: usize,
        language: String,
        known: String,
    },

    #[error(transparent)]
    DirectoryScope(#[from] DirectoryScopeError),
}

/// The first step that did not exit as expected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("step {index} failed: {command} (in {}): {reason}{}", cwd.display(), stderr_tail(.stderr))]
pub struct StepFailure {
    pub index: usize,
    pub command: String,
    pub cwd: PathBuf,
    pub exit_code: Option<i32>,
    /// Exit status or launch error in words.
    pub reason: String,
    pub stderr: String,
}

/// Last few lines of stderr, indented, for error messages.
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return String::new();
    }
    let start = lines.len().saturating_sub(10);
    let mut out = String::from("\n");
    for line in &lines[start..] {
        out.push_str("    ");
        out.push_str(line);
        out.push('\n');
    }
    out.truncate(out.trim_end().len());
    out
}
