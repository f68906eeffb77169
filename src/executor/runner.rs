//! Process execution capability.
//!
//! Every side effect of an install goes through a [`Runner`]: the executor
//! passes an argv and a working directory, the runner reports what happened.
//! Tests substitute their own runner to observe or script results.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;

use crate::core::output;
use crate::executor::Context;

/// Result of one finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Exit 0 with no output.
    pub fn success() -> Self {
        Self::default()
    }

    pub fn exit(code: i32) -> Self {
        Self {
            exit_code: code,
            ..Self::default()
        }
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// The command could not run to completion.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("empty command")]
    EmptyCommand,
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} timed out after {}s", after.as_secs())]
    TimedOut { program: String, after: Duration },
    #[error("{program} was terminated by a signal")]
    Signaled { program: String },
    #[error("process runtime: {0}")]
    Runtime(std::io::Error),
}

pub trait Runner {
    fn run(&mut self, argv: &[String], cwd: &Path) -> Result<CommandOutput, RunnerError>;
}

/// Shell-quote a value for display.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars().all(|c| {
            c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '=' | ':' | '+' | ',')
        })
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\"'\"'"))
    }
}

/// Render an argv the way a user would type it.
pub fn display_command(argv: &[String]) -> String {
    argv.iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs real processes, one at a time, with an optional timeout.
pub struct ProcessRunner {
    timeout: Option<Duration>,
    env: Vec<(String, String)>,
    spinner: bool,
    verbose: bool,
    runtime: Option<tokio::runtime::Runtime>,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            timeout: None,
            env: Vec::new(),
            spinner: false,
            verbose: false,
            runtime: None,
        }
    }

    /// Runner configured from an execution context: timeout, verbosity and
    /// `PREFIX`/`BUILD_DIR` exported to child processes.
    pub fn from_context(ctx: &Context) -> Self {
        Self::new()
            .timeout(ctx.timeout)
            .verbose(ctx.verbose)
            .env("PREFIX", ctx.prefix.display().to_string())
            .env("BUILD_DIR", ctx.build_dir.display().to_string())
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Show a spinner while each command runs.
    pub fn spinner(mut self, spinner: bool) -> Self {
        self.spinner = spinner;
        self
    }

    /// Echo captured output after each command.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn runtime(&mut self) -> Result<&tokio::runtime::Runtime, RunnerError> {
        if self.runtime.is_none() {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(RunnerError::Runtime)?;
            self.runtime = Some(rt);
        }
        self.runtime
            .as_ref()
            .ok_or_else(|| RunnerError::Runtime(std::io::Error::other("runtime unavailable")))
    }
}

impl Runner for ProcessRunner {
    fn run(&mut self, argv: &[String], cwd: &Path) -> Result<CommandOutput, RunnerError> {
        let (program, args) = argv.split_first().ok_or(RunnerError::EmptyCommand)?;

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .current_dir(cwd)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let timeout = self.timeout;
        let pb = self.spinner.then(|| output::command_spinner(argv));
        tracing::debug!(command = %display_command(argv), cwd = %cwd.display(), "spawning");

        let result = self.runtime()?.block_on(async {
            let child = cmd.output();
            match timeout {
                Some(after) => match tokio::time::timeout(after, child).await {
                    Ok(result) => result.map_err(|source| RunnerError::Spawn {
                        program: program.clone(),
                        source,
                    }),
                    Err(_) => Err(RunnerError::TimedOut {
                        program: program.clone(),
                        after,
                    }),
                },
                None => child.await.map_err(|source| RunnerError::Spawn {
                    program: program.clone(),
                    source,
                }),
            }
        });

        let out = match result {
            Ok(out) => out,
            Err(e) => {
                if let Some(pb) = pb {
                    output::spinner_failed(pb, &e.to_string());
                }
                return Err(e);
            }
        };
        if let Some(pb) = pb {
            output::spinner_done(pb);
        }

        let exit_code = out.status.code().ok_or_else(|| RunnerError::Signaled {
            program: program.clone(),
        })?;
        let output = CommandOutput {
            exit_code,
            stdout: out.stdout,
            stderr: out.stderr,
        };

        if self.verbose {
            for line in output.stdout_lossy().lines() {
                output::detail(line);
            }
            for line in output.stderr_lossy().lines() {
                output::detail(line);
            }
        }
        Ok(output)
    }
}

/// Records commands and reports success without running anything.
#[derive(Debug, Default)]
pub struct DryRunRunner {
    pub calls: Vec<(Vec<String>, PathBuf)>,
    echo: bool,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print each command as it would have run.
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }
}

impl Runner for DryRunRunner {
    fn run(&mut self, argv: &[String], cwd: &Path) -> Result<CommandOutput, RunnerError> {
        if argv.is_empty() {
            return Err(RunnerError::EmptyCommand);
        }
        if self.echo {
            output::detail(&format!(
                "[dry-run] {}  (in {})",
                display_command(argv),
                cwd.display()
            ));
        }
        self.calls.push((argv.to_vec(), cwd.to_path_buf()));
        Ok(CommandOutput::success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("cmake"), "cmake");
        assert_eq!(shell_quote("-DCMAKE_INSTALL_PREFIX=/opt/x"), "-DCMAKE_INSTALL_PREFIX=/opt/x");
        assert_eq!(shell_quote("has space"), "'has space'");
        assert_eq!(shell_quote("it's"), "'it'\"'\"'s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_dry_run_records() {
        let mut runner = DryRunRunner::new();
        let out = runner.run(&argv(&["make", "install"]), Path::new("/src")).unwrap();
        assert_eq!(out.exit_code, 0);
        assert_eq!(runner.calls.len(), 1);
        assert_eq!(runner.calls[0].1, PathBuf::from("/src"));
        assert!(matches!(
            runner.run(&[], Path::new("/")),
            Err(RunnerError::EmptyCommand)
        ));
    }

    #[test]
    fn test_process_runner_captures_output() {
        let dir = TempDir::new().unwrap();
        let mut runner = ProcessRunner::new().env("GREETING", "hi");
        let out = runner
            .run(&argv(&["sh", "-c", "echo $GREETING; pwd; echo oops >&2; exit 3"]), dir.path())
            .unwrap();

        assert_eq!(out.exit_code, 3);
        let stdout = out.stdout_lossy();
        let mut lines = stdout.lines();
        assert_eq!(lines.next(), Some("hi"));
        let cwd = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(lines.next().map(PathBuf::from), Some(cwd));
        assert_eq!(out.stderr_lossy().trim(), "oops");
    }

    #[test]
    fn test_process_runner_missing_program() {
        let mut runner = ProcessRunner::new();
        let err = runner
            .run(&argv(&["definitely-not-a-real-program-xyz"]), Path::new("/"))
            .unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { .. }));
    }

    #[test]
    fn test_process_runner_timeout() {
        let mut runner = ProcessRunner::new().timeout(Some(Duration::from_millis(200)));
        let err = runner
            .run(&argv(&["sleep", "5"]), Path::new("/"))
            .unwrap_err();
        assert!(matches!(err, RunnerError::TimedOut { .. }));
    }
}
