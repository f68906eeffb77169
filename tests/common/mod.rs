//! Common test utilities for install integration tests.

#![allow(dead_code)]

mod fixtures;

pub use fixtures::*;

use std::path::{Path, PathBuf};

use formula::{CommandOutput, Runner, RunnerError};

/// Records every invocation; fails the Nth one (1-based) if asked to.
#[derive(Debug, Default)]
pub struct SpyRunner {
    pub calls: Vec<(Vec<String>, PathBuf)>,
    fail_at: Option<usize>,
}

impl SpyRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(n: usize) -> Self {
        Self {
            calls: Vec::new(),
            fail_at: Some(n),
        }
    }

    pub fn programs(&self) -> Vec<&str> {
        self.calls.iter().map(|(argv, _)| argv[0].as_str()).collect()
    }

    pub fn cwds(&self) -> Vec<&Path> {
        self.calls.iter().map(|(_, cwd)| cwd.as_path()).collect()
    }
}

impl Runner for SpyRunner {
    fn run(&mut self, argv: &[String], cwd: &Path) -> Result<CommandOutput, RunnerError> {
        self.calls.push((argv.to_vec(), cwd.to_path_buf()));
        if self.fail_at == Some(self.calls.len()) {
            return Ok(CommandOutput {
                exit_code: 2,
                stdout: Vec::new(),
                stderr: b"make: *** [all] Error 2\n".to_vec(),
            });
        }
        Ok(CommandOutput::exit(0))
    }
}

/// Temp workspace with `build/`, `src/` and `prefix/` paths.
pub struct TestEnv {
    pub dir: tempfile::TempDir,
    pub build_dir: PathBuf,
    pub source_dir: PathBuf,
    pub prefix: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        let build_dir = dir.path().join("build");
        let source_dir = dir.path().join("src");
        let prefix = dir.path().join("prefix");
        std::fs::create_dir_all(&source_dir).unwrap();
        Self {
            dir,
            build_dir,
            source_dir,
            prefix,
        }
    }

    /// Context that builds in the prepared `src/` tree.
    pub fn context(&self) -> formula::Context {
        self.fetching_context().source_dir(&self.source_dir)
    }

    /// Context that fetches into `build/<name>/src`.
    pub fn fetching_context(&self) -> formula::Context {
        formula::Context::with_prefix(&self.prefix).build_dir(&self.build_dir)
    }
}
