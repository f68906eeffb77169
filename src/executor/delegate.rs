//! Delegated installs: handing a directory to a language package installer.
//!
//! The formula only knows a language name and a prefix; the argv comes from
//! the [`PrefixArgsBuilder`] registered for that language.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Produce the argv that installs the current directory into `prefix`.
pub trait PrefixArgsBuilder: Send + Sync {
    fn build_args(&self, prefix: &str) -> Vec<String>;
}

/// `python3 -m pip install --prefix=<p> ... .`
#[derive(Debug, Clone)]
pub struct PipInstall {
    program: String,
}

impl PipInstall {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for PipInstall {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl PrefixArgsBuilder for PipInstall {
    fn build_args(&self, prefix: &str) -> Vec<String> {
        vec![
            self.program.clone(),
            "-m".into(),
            "pip".into(),
            "install".into(),
            format!("--prefix={}", prefix),
            "--no-deps".into(),
            "--no-build-isolation".into(),
            "--ignore-installed".into(),
            ".".into(),
        ]
    }
}

/// `npm install --global --prefix <p> .`
#[derive(Debug, Clone)]
pub struct NpmInstall {
    program: String,
}

impl NpmInstall {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for NpmInstall {
    fn default() -> Self {
        Self::new("npm")
    }
}

impl PrefixArgsBuilder for NpmInstall {
    fn build_args(&self, prefix: &str) -> Vec<String> {
        vec![
            self.program.clone(),
            "install".into(),
            "--global".into(),
            "--prefix".into(),
            prefix.to_string(),
            ".".into(),
        ]
    }
}

/// Built-in installer for `language` running `program`, if there is one.
pub fn builtin(language: &str, program: &str) -> Option<Arc<dyn PrefixArgsBuilder>> {
    match language {
        "python" => Some(Arc::new(PipInstall::new(program))),
        "node" => Some(Arc::new(NpmInstall::new(program))),
        _ => None,
    }
}

/// Language name to installer.
#[derive(Clone)]
pub struct DelegateRegistry {
    builders: BTreeMap<String, Arc<dyn PrefixArgsBuilder>>,
}

impl Default for DelegateRegistry {
    /// Registry with the `python` and `node` installers.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("python", PipInstall::default());
        registry.register("node", NpmInstall::default());
        registry
    }
}

impl fmt::Debug for DelegateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.builders.keys()).finish()
    }
}

impl DelegateRegistry {
    pub fn empty() -> Self {
        Self {
            builders: BTreeMap::new(),
        }
    }

    /// Register (or replace) the installer for a language.
    pub fn register(
        &mut self,
        language: impl Into<String>,
        builder: impl PrefixArgsBuilder + 'static,
    ) {
        self.builders.insert(language.into(), Arc::new(builder));
    }

    pub fn register_shared(
        &mut self,
        language: impl Into<String>,
        builder: Arc<dyn PrefixArgsBuilder>,
    ) {
        self.builders.insert(language.into(), builder);
    }

    pub fn get(&self, language: &str) -> Option<&dyn PrefixArgsBuilder> {
        self.builders.get(language).map(|b| b.as_ref())
    }

    pub fn languages(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }
}
