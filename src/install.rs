//! Install orchestration.
//!
//! validate -> dependency gate -> lock -> fetch -> execute -> run-time check.
//! Each stage either passes or ends the install with its own error; nothing
//! is retried.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::{lock, output};
use crate::error::{Error, Result};
use crate::executor::{
    Context, DelegateRegistry, ExecutionReport, ExecutionResult, Executor, RunState, Runner,
    TemplateVars,
};
use crate::fetch;
use crate::gate::{self, EnvironmentProbe, GateReport};
use crate::recipe::{ChecksumPolicy, Recipe, ValidationWarning};

/// Everything a successful install produced.
#[derive(Debug)]
pub struct InstallOutcome {
    pub warnings: Vec<ValidationWarning>,
    pub gate: GateReport,
    pub source_dir: PathBuf,
    pub report: ExecutionReport,
}

#[derive(Serialize)]
struct RunLog<'a> {
    formula: &'a str,
    state: RunState,
    steps: &'a [ExecutionResult],
}

pub struct Installer {
    ctx: Context,
    policy: ChecksumPolicy,
    probe: Box<dyn EnvironmentProbe>,
    delegates: DelegateRegistry,
    fetch_source: bool,
    log: Option<PathBuf>,
    progress: bool,
}

impl Installer {
    pub fn new(ctx: Context, probe: impl EnvironmentProbe + 'static) -> Self {
        Self {
            ctx,
            policy: ChecksumPolicy::Strict,
            probe: Box::new(probe),
            delegates: DelegateRegistry::default(),
            fetch_source: true,
            log: None,
            progress: false,
        }
    }

    pub fn checksum_policy(mut self, policy: ChecksumPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn delegates(mut self, delegates: DelegateRegistry) -> Self {
        self.delegates = delegates;
        self
    }

    /// Build from the context's source directory as it is instead of fetching.
    pub fn use_existing_source(mut self) -> Self {
        self.fetch_source = false;
        self
    }

    /// Write per-step results as JSON to `path` after the steps run.
    pub fn log_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.log = Some(path.into());
        self
    }

    /// Print phases and steps as they happen.
    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    fn phase(&self, name: &str) {
        if self.progress {
            output::phase(name);
        }
    }

    pub fn install(&self, recipe: &Recipe, runner: &mut dyn Runner) -> Result<InstallOutcome> {
        let ctx = &self.ctx;
        tracing::info!(
            formula = %recipe.name,
            prefix = %ctx.prefix.display(),
            dry_run = ctx.dry_run,
            "install"
        );

        let warnings = recipe.validate(self.policy)?;
        for warning in &warnings {
            tracing::warn!(formula = %recipe.name, "{}", warning);
            if self.progress {
                output::warning(&warning.to_string());
            }
        }

        self.phase("dependencies");
        let gate = gate::check_dependencies(recipe, self.probe.as_ref())?;

        let _lock = if ctx.dry_run {
            None
        } else {
            std::fs::create_dir_all(&ctx.build_dir).map_err(|e| {
                Error::io(format!("creating build directory {}", ctx.build_dir.display()), e)
            })?;
            Some(lock::acquire_build_lock(&ctx.build_dir, &recipe.name)?)
        };

        let source_dir = if self.fetch_source {
            self.phase("fetch");
            let dir = fetch::fetch(&recipe.name, &recipe.source, ctx, runner)?;
            if self.progress
                && !ctx.dry_run
                && let Some(checksum) = &recipe.source.checksum
            {
                output::detail(&format!("{} verified", checksum.algorithm));
            }
            dir
        } else {
            let dir = ctx.source_dir_for(&recipe.name);
            if !ctx.dry_run && !dir.is_dir() {
                return Err(Error::io(
                    format!("source directory {}", dir.display()),
                    std::io::Error::from(std::io::ErrorKind::NotFound),
                ));
            }
            dir
        };

        self.phase("install");
        let vars = TemplateVars::for_recipe(recipe, ctx);
        let mut executor = Executor::new(&source_dir, vars)
            .with_delegates(self.delegates.clone())
            .keep_results(self.log.is_some())
            .progress(self.progress);
        let report = executor.execute(&recipe.install, runner)?;

        if let Some(path) = &self.log {
            write_log(path, recipe, &report)?;
        }
        let report = report.into_result()?;

        if ctx.dry_run {
            tracing::debug!("dry run: run-time dependencies not checked");
        } else {
            self.phase("verify");
            gate::assert_runtime(&gate, self.probe.as_ref()).map_err(Error::PostInstall)?;
        }

        Ok(InstallOutcome {
            warnings,
            gate,
            source_dir,
            report,
        })
    }
}

fn write_log(path: &Path, recipe: &Recipe, report: &ExecutionReport) -> Result<()> {
    let log = RunLog {
        formula: &recipe.name,
        state: report.state,
        steps: &report.results,
    };
    let json = serde_json::to_string_pretty(&log)
        .map_err(|e| Error::io(format!("serializing {}", path.display()), e.into()))?;
    std::fs::write(path, json).map_err(|e| Error::io(format!("writing {}", path.display()), e))?;
    tracing::debug!(path = %path.display(), "wrote run log");
    Ok(())
}
