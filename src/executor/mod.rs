//! Step executor - runs a recipe's install steps through a [`Runner`].
//!
//! Execution is two-phase. First every step is materialized: templates are
//! expanded, delegate installers are resolved and the nested `cd` blocks are
//! flattened into a plan with explicit enter/leave markers. Nothing runs if
//! that fails. Then the plan is walked once, in order, stopping at the first
//! step whose exit code differs from the expected one.

pub mod context;
pub mod delegate;
pub mod dirstack;
mod error;
pub mod runner;
pub mod template;

pub use context::Context;
pub use delegate::{DelegateRegistry, PrefixArgsBuilder};
pub use dirstack::{DirStack, DirectoryScopeError};
pub use error::{ExecuteError, StepFailure};
pub use runner::{CommandOutput, DryRunRunner, ProcessRunner, Runner, RunnerError};
pub use template::{TemplateError, TemplateVars};

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::output;
use crate::recipe::Step;
use runner::display_command;

/// Where a run is. Step indices are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Pending,
    Running(usize),
    Succeeded,
    Failed(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Ok,
    Failed,
}

/// Captured outcome of one step.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub index: usize,
    pub status: StepStatus,
    pub command: Vec<String>,
    pub cwd: PathBuf,
    /// None when the process never produced an exit code.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub state: RunState,
    /// Numbered steps in the plan.
    pub total: usize,
    /// Per-step results, only collected when the executor keeps them.
    pub results: Vec<ExecutionResult>,
    pub failure: Option<StepFailure>,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Succeeded
    }

    /// Turn a failed run into its [`StepFailure`].
    pub fn into_result(self) -> Result<Self, StepFailure> {
        match self.failure {
            Some(failure) => Err(failure),
            None => Ok(self),
        }
    }
}

/// A materialized operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Planned {
    Command {
        index: usize,
        argv: Vec<String>,
        expect: i32,
    },
    Enter(String),
    Leave,
}

/// Runs install steps; owns the working-directory stack for the run.
#[derive(Debug)]
pub struct Executor {
    vars: TemplateVars,
    delegates: DelegateRegistry,
    dirs: DirStack,
    state: RunState,
    keep_results: bool,
    progress: bool,
}

impl Executor {
    /// Executor whose steps start in `root`.
    pub fn new(root: impl Into<PathBuf>, vars: TemplateVars) -> Self {
        Self {
            vars,
            delegates: DelegateRegistry::default(),
            dirs: DirStack::new(root),
            state: RunState::Pending,
            keep_results: false,
            progress: false,
        }
    }

    pub fn with_delegates(mut self, delegates: DelegateRegistry) -> Self {
        self.delegates = delegates;
        self
    }

    /// Keep per-step results in the report.
    pub fn keep_results(mut self, keep: bool) -> Self {
        self.keep_results = keep;
        self
    }

    /// Print each step as it starts.
    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn current_dir(&self) -> &Path {
        self.dirs.current()
    }

    /// Expand every step into concrete commands without running anything.
    pub fn materialize(&self, steps: &[Step]) -> Result<Vec<Planned>, ExecuteError> {
        let mut plan = Vec::new();
        let mut index = 0;
        self.materialize_into(steps, &mut index, &mut plan)?;
        Ok(plan)
    }

    fn materialize_into(
        &self,
        steps: &[Step],
        index: &mut usize,
        plan: &mut Vec<Planned>,
    ) -> Result<(), ExecuteError> {
        for step in steps {
            let expand = |s: &str, at: usize| {
                self.vars
                    .expand(s)
                    .map_err(|source| ExecuteError::Template { index: at, source })
            };

            match step {
                Step::ChangeDir { path, steps } => {
                    plan.push(Planned::Enter(expand(path, *index + 1)?));
                    self.materialize_into(steps, index, plan)?;
                    plan.push(Planned::Leave);
                }
                Step::CreateDir(path) => {
                    *index += 1;
                    let path = expand(path, *index)?;
                    plan.push(Planned::Command {
                        index: *index,
                        argv: vec!["mkdir".into(), "-p".into(), path],
                        expect: 0,
                    });
                }
                Step::Run { argv, expect } => {
                    *index += 1;
                    let argv = self
                        .vars
                        .expand_argv(argv)
                        .map_err(|source| ExecuteError::Template {
                            index: *index,
                            source,
                        })?;
                    plan.push(Planned::Command {
                        index: *index,
                        argv,
                        expect: *expect,
                    });
                }
                Step::DelegateInstall { language, prefix } => {
                    *index += 1;
                    let builder =
                        self.delegates
                            .get(language)
                            .ok_or_else(|| ExecuteError::UnknownDelegate {
                                index: *index,
                                language: language.clone(),
                                known: self.delegates.languages().join(", "),
                            })?;
                    let prefix = expand(prefix.as_deref().unwrap_or("$PREFIX"), *index)?;
                    plan.push(Planned::Command {
                        index: *index,
                        argv: builder.build_args(&prefix),
                        expect: 0,
                    });
                }
            }
        }
        Ok(())
    }

    /// Run `steps` in order, stopping at the first failure.
    ///
    /// A failing step yields `Ok` with [`RunState::Failed`]; `Err` means the
    /// run never started (materialization) or its directory scopes could not
    /// be restored. Either way the directory stack is back where it started.
    pub fn execute(
        &mut self,
        steps: &[Step],
        runner: &mut dyn Runner,
    ) -> Result<ExecutionReport, ExecuteError> {
        self.state = RunState::Pending;
        let plan = self.materialize(steps)?;
        let total = Step::count(steps);
        let base = self.dirs.depth();

        let mut report = ExecutionReport {
            state: RunState::Pending,
            total,
            results: Vec::new(),
            failure: None,
        };

        for op in &plan {
            match op {
                Planned::Enter(path) => {
                    let dir = self.dirs.push(path);
                    tracing::debug!(dir = %dir.display(), "enter");
                }
                Planned::Leave => {
                    if self.dirs.depth() <= base {
                        self.dirs.unwind(base);
                        return Err(DirectoryScopeError::Underflow.into());
                    }
                    self.dirs.pop()?;
                }
                Planned::Command {
                    index,
                    argv,
                    expect,
                } => {
                    self.state = RunState::Running(*index);
                    if let Some(failure) =
                        self.run_one(*index, total, argv, *expect, runner, &mut report)
                    {
                        self.state = RunState::Failed(*index);
                        report.failure = Some(failure);
                        break;
                    }
                }
            }
        }

        if report.failure.is_some() {
            self.dirs.unwind(base);
        } else {
            self.dirs.ensure_depth(base)?;
            self.state = RunState::Succeeded;
        }

        report.state = self.state;
        Ok(report)
    }

    fn run_one(
        &self,
        index: usize,
        total: usize,
        argv: &[String],
        expect: i32,
        runner: &mut dyn Runner,
        report: &mut ExecutionReport,
    ) -> Option<StepFailure> {
        let cwd = self.dirs.current().to_path_buf();
        let command = display_command(argv);
        if self.progress {
            output::step(index, total, &command);
        }
        tracing::debug!(index, command = %command, cwd = %cwd.display(), "running step");

        let (exit_code, stdout, stderr, reason) = match runner.run(argv, &cwd) {
            Ok(out) => {
                let reason = (out.exit_code != expect).then(|| {
                    if expect == 0 {
                        format!("exit code {}", out.exit_code)
                    } else {
                        format!("exit code {} (expected {})", out.exit_code, expect)
                    }
                });
                (Some(out.exit_code), out.stdout_lossy(), out.stderr_lossy(), reason)
            }
            Err(e) => (None, String::new(), String::new(), Some(e.to_string())),
        };

        if self.keep_results {
            report.results.push(ExecutionResult {
                index,
                status: if reason.is_none() {
                    StepStatus::Ok
                } else {
                    StepStatus::Failed
                },
                command: argv.to_vec(),
                cwd: cwd.clone(),
                exit_code,
                stdout,
                stderr: stderr.clone(),
            });
        }

        let reason = reason?;
        tracing::debug!(index, %reason, "step failed");
        Some(StepFailure {
            index,
            command,
            cwd,
            exit_code,
            reason,
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted runner: pops exit codes, defaults to 0.
    #[derive(Default)]
    struct Scripted {
        codes: VecDeque<Result<i32, ()>>,
        calls: Vec<(Vec<String>, PathBuf)>,
    }

    impl Runner for Scripted {
        fn run(&mut self, argv: &[String], cwd: &Path) -> Result<CommandOutput, RunnerError> {
            self.calls.push((argv.to_vec(), cwd.to_path_buf()));
            match self.codes.pop_front() {
                Some(Ok(code)) => Ok(CommandOutput {
                    exit_code: code,
                    stdout: b"out".to_vec(),
                    stderr: b"err".to_vec(),
                }),
                Some(Err(())) => Err(RunnerError::TimedOut {
                    program: argv[0].clone(),
                    after: std::time::Duration::from_secs(1),
                }),
                None => Ok(CommandOutput::success()),
            }
        }
    }

    fn vars() -> TemplateVars {
        let mut vars = TemplateVars::new();
        vars.set("PREFIX", "/opt/p");
        vars.set_list("CONFIGURE_ARGS", vec!["-DA=1".into(), "-DB=2".into()]);
        vars
    }

    fn steps() -> Vec<Step> {
        vec![
            Step::mkdir("build"),
            Step::cd(
                "build",
                vec![
                    Step::run(["cmake", "$@CONFIGURE_ARGS", ".."]),
                    Step::run(["cmake", "--build", "."]),
                    Step::run(["cmake", "--install", "."]),
                    Step::cd("src/python", vec![Step::delegate("python")]),
                ],
            ),
        ]
    }

    // ==================== Materialization ====================

    #[test]
    fn test_materialize_plan() {
        let exec = Executor::new("/src", vars());
        let plan = exec.materialize(&steps()).unwrap();

        assert_eq!(plan.len(), 9);
        assert_eq!(
            plan[0],
            Planned::Command {
                index: 1,
                argv: vec!["mkdir".into(), "-p".into(), "build".into()],
                expect: 0
            }
        );
        assert_eq!(plan[1], Planned::Enter("build".into()));
        assert_eq!(
            plan[2],
            Planned::Command {
                index: 2,
                argv: vec!["cmake".into(), "-DA=1".into(), "-DB=2".into(), "..".into()],
                expect: 0
            }
        );
        match &plan[6] {
            Planned::Command { index, argv, .. } => {
                assert_eq!(*index, 5);
                assert_eq!(argv[4], "--prefix=/opt/p");
            }
            other => panic!("expected delegate command, got {:?}", other),
        }
        assert_eq!(plan[7], Planned::Leave);
        assert_eq!(plan[8], Planned::Leave);
    }

    #[test]
    fn test_template_error_runs_nothing() {
        let mut exec = Executor::new("/src", vars());
        let mut runner = Scripted::default();
        let steps = vec![Step::run(["true"]), Step::run(["echo", "$UNDEFINED"])];

        let err = exec.execute(&steps, &mut runner).unwrap_err();
        assert!(matches!(err, ExecuteError::Template { index: 2, .. }));
        assert!(runner.calls.is_empty());
        assert_eq!(exec.state(), RunState::Pending);
    }

    #[test]
    fn test_unknown_delegate_language() {
        let exec = Executor::new("/src", vars());
        let err = exec.materialize(&[Step::delegate("cobol")]).unwrap_err();
        assert!(matches!(err, ExecuteError::UnknownDelegate { index: 1, .. }));
    }

    // ==================== Execution ====================

    #[test]
    fn test_execute_success_cwds() {
        let mut exec = Executor::new("/src", vars()).keep_results(true);
        let mut runner = Scripted::default();

        let report = exec.execute(&steps(), &mut runner).unwrap();

        assert_eq!(report.state, RunState::Succeeded);
        assert_eq!(report.total, 5);
        assert_eq!(report.results.len(), 5);
        let cwds: Vec<_> = runner.calls.iter().map(|(_, c)| c.clone()).collect();
        assert_eq!(
            cwds,
            [
                PathBuf::from("/src"),
                PathBuf::from("/src/build"),
                PathBuf::from("/src/build"),
                PathBuf::from("/src/build"),
                PathBuf::from("/src/build/src/python"),
            ]
        );
        assert_eq!(exec.current_dir(), Path::new("/src"));
    }

    #[test]
    fn test_first_failure_stops_run() {
        let mut exec = Executor::new("/src", vars());
        let mut runner = Scripted {
            codes: VecDeque::from([Ok(0), Ok(0), Ok(2)]),
            ..Default::default()
        };

        let report = exec.execute(&steps(), &mut runner).unwrap();

        assert_eq!(report.state, RunState::Failed(3));
        assert_eq!(exec.state(), RunState::Failed(3));
        assert_eq!(runner.calls.len(), 3);
        assert!(report.results.is_empty());
        let failure = report.failure.unwrap();
        assert_eq!(failure.exit_code, Some(2));
        assert_eq!(failure.cwd, PathBuf::from("/src/build"));
        assert_eq!(failure.stderr, "err");
        assert_eq!(exec.current_dir(), Path::new("/src"));
    }

    #[test]
    fn test_expected_nonzero_exit() {
        let mut exec = Executor::new("/src", vars());
        let mut runner = Scripted {
            codes: VecDeque::from([Ok(1), Ok(0)]),
            ..Default::default()
        };
        let steps = vec![
            Step::Run {
                argv: vec!["grep".into(), "-q".into(), "x".into()],
                expect: 1,
            },
            Step::Run {
                argv: vec!["false".into()],
                expect: 1,
            },
        ];

        let report = exec.execute(&steps, &mut runner).unwrap();
        assert_eq!(report.state, RunState::Failed(2));
        assert_eq!(report.failure.unwrap().reason, "exit code 0 (expected 1)");
    }

    #[test]
    fn test_runner_error_is_step_failure() {
        let mut exec = Executor::new("/src", vars()).keep_results(true);
        let mut runner = Scripted {
            codes: VecDeque::from([Ok(0), Err(())]),
            ..Default::default()
        };

        let report = exec.execute(&steps(), &mut runner).unwrap();
        assert_eq!(report.state, RunState::Failed(2));
        let last = report.results.last().unwrap();
        assert_eq!(last.status, StepStatus::Failed);
        assert_eq!(last.exit_code, None);
        assert!(report.failure.unwrap().reason.contains("timed out"));
    }

    #[test]
    fn test_executor_reusable_after_failure() {
        let mut exec = Executor::new("/src", vars());
        let mut failing = Scripted {
            codes: VecDeque::from([Ok(0), Ok(1)]),
            ..Default::default()
        };
        exec.execute(&steps(), &mut failing).unwrap();

        let mut ok = Scripted::default();
        let report = exec.execute(&steps(), &mut ok).unwrap();
        assert!(report.succeeded());
        assert_eq!(ok.calls[1].1, PathBuf::from("/src/build"));
    }

    #[test]
    fn test_report_into_result() {
        let mut exec = Executor::new("/src", vars());
        let mut runner = Scripted {
            codes: VecDeque::from([Ok(7)]),
            ..Default::default()
        };
        let report = exec.execute(&steps(), &mut runner).unwrap();
        let failure = report.into_result().unwrap_err();
        assert_eq!(failure.index, 1);
        assert_eq!(failure.command, "mkdir -p build");
    }
}
