//! Explicit working-directory stack.
//!
//! The executor never calls `set_current_dir`; scoped `cd` blocks push here
//! and every command gets the top of the stack as its `cwd`.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryScopeError {
    #[error("directory stack underflow: leaving a scope that was never entered")]
    Underflow,
    #[error("directory stack left at depth {depth} after the run (expected {expected})")]
    Unbalanced { depth: usize, expected: usize },
}

#[derive(Debug, Clone)]
pub struct DirStack {
    root: PathBuf,
    stack: Vec<PathBuf>,
}

impl DirStack {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stack: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn current(&self) -> &Path {
        self.stack.last().unwrap_or(&self.root)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Enter `path`, relative to the current directory unless absolute.
    pub fn push(&mut self, path: &str) -> &Path {
        let next = self.current().join(path);
        self.stack.push(next);
        self.current()
    }

    pub fn pop(&mut self) -> Result<PathBuf, DirectoryScopeError> {
        self.stack.pop().ok_or(DirectoryScopeError::Underflow)
    }

    /// Drop scopes until `depth` remain.
    pub fn unwind(&mut self, depth: usize) {
        self.stack.truncate(depth);
    }

    /// Fail unless exactly `expected` scopes are open.
    pub fn ensure_depth(&self, expected: usize) -> Result<(), DirectoryScopeError> {
        if self.stack.len() == expected {
            Ok(())
        } else {
            Err(DirectoryScopeError::Unbalanced {
                depth: self.stack.len(),
                expected,
            })
        }
    }
}
