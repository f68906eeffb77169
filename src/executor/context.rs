//! Execution context: where things go and how commands are run.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Execution context for one install.
#[derive(Debug, Clone)]
pub struct Context {
    /// Where the formula installs to; `$PREFIX` in steps.
    pub prefix: PathBuf,
    /// Shared scratch directory; each formula works in `<build_dir>/<name>`
    /// and locks `<build_dir>/<name>.lock`
    pub build_dir: PathBuf,
    /// Existing source tree to build in instead of `<build_dir>/<name>/src`
    pub source_dir: Option<PathBuf>,
    /// `$ARCH`, the host architecture unless overridden.
    pub arch: String,
    /// `$NPROC`
    pub nproc: usize,
    /// If true, record commands without executing them
    pub dry_run: bool,
    /// If true, echo command output as it is captured
    pub verbose: bool,
    /// Per-command timeout for the process runner
    pub timeout: Option<Duration>,
    /// Extra template variables from `--define KEY=VALUE`
    pub defines: BTreeMap<String, String>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            prefix: PathBuf::from("/usr/local"),
            build_dir: std::env::temp_dir().join("formula-build"),
            source_dir: None,
            arch: std::env::consts::ARCH.to_string(),
            nproc: num_cpus::get(),
            dry_run: false,
            verbose: false,
            timeout: None,
            defines: BTreeMap::new(),
        }
    }
}

impl Context {
    pub fn with_prefix(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    pub fn build_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.build_dir = dir.into();
        self
    }

    /// Use an existing source tree.
    pub fn source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(dir.into());
        self
    }

    /// Per-formula directory for downloads and the fetched tree.
    pub fn work_dir(&self, name: &str) -> PathBuf {
        self.build_dir.join(name)
    }

    /// Where the steps of formula `name` start.
    pub fn source_dir_for(&self, name: &str) -> PathBuf {
        self.source_dir
            .clone()
            .unwrap_or_else(|| self.work_dir(name).join("src"))
    }

    pub fn arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    /// Record commands instead of running them. Also skips locking, source
    /// removal and checksum verification.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn define(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.insert(key.into(), value.into());
        self
    }
}
