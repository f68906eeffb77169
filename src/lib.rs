//! Declarative build-recipe interpreter.
//!
//! A recipe (a `.recipe` S-expression file) names a package, where its
//! source lives, which tools it needs, how its build system is configured
//! and the steps that build and install it:
//!
//! ```lisp
//! (formula "magnum-bindings"
//!   (description "Bindings for the Magnum C++11/C++14 graphics engine")
//!   (homepage "https://magnum.graphics")
//!   (source head "https://github.com/mosra/magnum-bindings.git")
//!   (depends-on "magnum")
//!   (depends-on "pybind11" build)
//!   (configure cmake (with python))
//!   (install
//!     (mkdir "build")
//!     (cd "build"
//!       (run "cmake" "$@CONFIGURE_ARGS" "..")
//!       (run "cmake" "--build" ".")
//!       (run "cmake" "--build" "." "--target" "install")
//!       (cd "src/python"
//!         (delegate-install python)))))
//! ```
//!
//! Installing goes through [`Installer`]: the recipe is validated, build-time
//! dependencies are checked against an [`EnvironmentProbe`], the source is
//! fetched, and the steps run one by one through a [`Runner`]. Run-time
//! dependencies are checked once the steps have finished.
//!
//! # Templates
//!
//! Step arguments may use `$PREFIX`, `$BUILD_DIR`, `$SOURCE_DIR`,
//! `$BUILD_TYPE`, `$NPROC`, `$ARCH`, `$NAME`, `$VERSION` and any
//! `--define`d variable, as `$NAME` or `${NAME}`. `$@CONFIGURE_ARGS` as a
//! whole argument expands to the native flags of the `configure` form.
//!
//! # Example
//!
//! ```no_run
//! use formula::{Context, DryRunRunner, HostProbe, Installer, Recipe};
//!
//! let recipe = Recipe::load("magnum-bindings.recipe".as_ref())?;
//! let ctx = Context::with_prefix("/opt/magnum").dry_run(true);
//! let outcome = Installer::new(ctx, HostProbe::new()).install(&recipe, &mut DryRunRunner::new())?;
//! assert!(outcome.report.succeeded());
//! # Ok::<(), formula::Error>(())
//! ```

pub mod ast;
pub mod build_options;
pub mod catalog;
pub mod config;
pub mod core;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod gate;
pub mod install;
pub mod parser;
pub mod probe;
pub mod recipe;

pub use crate::core::output;
pub use build_options::{BuildOption, BuildSystem, BuildType, Configuration};
pub use config::Config;
pub use error::{Error, Result};
pub use executor::{
    CommandOutput, Context, DelegateRegistry, DryRunRunner, ExecuteError, ExecutionReport,
    ExecutionResult, Executor, PrefixArgsBuilder, ProcessRunner, RunState, Runner, RunnerError,
    StepFailure, TemplateVars,
};
pub use gate::{EnvironmentProbe, GateReport, MissingDependencies, check_dependencies};
pub use install::{InstallOutcome, Installer};
pub use probe::{HostProbe, ProbeChain, StaticProbe};
pub use recipe::{ChecksumPolicy, DepKind, Dependency, Recipe, RecipeError, Source, Step};
