//! Integration tests for the install pipeline
//!
//! These run whole recipes through the gate, the executor and the installer
//! with a recording runner, so nothing outside a temp dir is touched.

mod common;

use common::{MAGNUM_BINDINGS, SpyRunner, TestEnv, magnum_host};
use formula::error::exit;
use formula::gate::{self, MissingReason};
use formula::{
    DryRunRunner, Error, Executor, Installer, Recipe, RunState, StaticProbe, TemplateVars,
    check_dependencies,
};

fn magnum() -> Recipe {
    Recipe::parse(MAGNUM_BINDINGS).unwrap()
}

// =============================================================================
// End-to-end install
// =============================================================================

#[test]
fn test_install_runs_steps_in_order() {
    let env = TestEnv::new();
    let installer = Installer::new(env.context(), magnum_host()).use_existing_source();
    let mut runner = SpyRunner::new();

    let outcome = installer.install(&magnum(), &mut runner).unwrap();

    assert_eq!(outcome.report.state, RunState::Succeeded);
    assert_eq!(outcome.report.total, 5);
    assert_eq!(runner.calls.len(), 5);
    assert_eq!(runner.programs(), ["mkdir", "cmake", "cmake", "cmake", "python3"]);

    let build = env.source_dir.join("build");
    assert_eq!(
        runner.cwds(),
        [
            env.source_dir.as_path(),
            build.as_path(),
            build.as_path(),
            build.as_path(),
            build.join("src/python").as_path(),
        ]
    );
}

#[test]
fn test_configure_args_are_spliced() {
    let env = TestEnv::new();
    let installer = Installer::new(env.context(), magnum_host()).use_existing_source();
    let mut runner = SpyRunner::new();
    installer.install(&magnum(), &mut runner).unwrap();

    let configure = &runner.calls[1].0;
    assert_eq!(configure.first().map(String::as_str), Some("cmake"));
    assert_eq!(configure.last().map(String::as_str), Some(".."));
    assert!(configure.contains(&"-DCMAKE_BUILD_TYPE=Release".to_string()));
    assert!(configure.contains(&format!("-DCMAKE_INSTALL_PREFIX={}", env.prefix.display())));
    assert!(configure.contains(&"-DWITH_PYTHON=ON".to_string()));
    assert!(!configure.iter().any(|a| a.contains('$')));

    let delegate = &runner.calls[4].0;
    assert!(delegate.contains(&format!("--prefix={}", env.prefix.display())));
    assert_eq!(delegate.last().map(String::as_str), Some("."));
}

#[test]
fn test_install_fetches_head_into_work_dir() {
    let env = TestEnv::new();
    let installer = Installer::new(env.fetching_context(), magnum_host());
    let mut runner = SpyRunner::new();

    let outcome = installer.install(&magnum(), &mut runner).unwrap();

    let work = env.build_dir.join("magnum-bindings");
    assert_eq!(outcome.source_dir, work.join("src"));
    assert_eq!(runner.calls.len(), 6);
    let (clone, cwd) = &runner.calls[0];
    assert_eq!(&clone[..2], ["git", "clone"]);
    assert!(clone.contains(&"git://github.com/mosra/magnum-bindings.git".to_string()));
    assert_eq!(clone.last(), Some(&work.join("src").display().to_string()));
    assert_eq!(cwd, &work);
    assert_eq!(runner.calls[1].1, work.join("src"));
}

#[test]
fn test_formulas_sharing_build_dir_keep_their_trees() {
    let env = TestEnv::new();
    std::fs::create_dir_all(&env.build_dir).unwrap();
    // another formula is mid-install in the same build dir
    let _alpha = formula::core::lock::acquire_build_lock(&env.build_dir, "alpha").unwrap();
    let alpha_work = env.build_dir.join("alpha/src/WORK");
    // and the build dir already has an unrelated src/ of its own
    let unrelated = env.build_dir.join("src/keep.c");
    for file in [&alpha_work, &unrelated] {
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(file, "").unwrap();
    }

    let installer = Installer::new(env.fetching_context(), magnum_host());
    installer.install(&magnum(), &mut SpyRunner::new()).unwrap();

    assert!(alpha_work.exists());
    assert!(unrelated.exists());
    assert!(env.build_dir.join("alpha.lock").exists());
}

#[test]
fn test_lock_released_after_install() {
    let env = TestEnv::new();
    let installer = Installer::new(env.context(), magnum_host()).use_existing_source();
    installer.install(&magnum(), &mut SpyRunner::new()).unwrap();

    assert!(env.build_dir.is_dir());
    assert!(!env.build_dir.join("magnum-bindings.lock").exists());
}

#[test]
fn test_held_lock_blocks_install() {
    let env = TestEnv::new();
    std::fs::create_dir_all(&env.build_dir).unwrap();
    let _held = formula::core::lock::acquire_build_lock(&env.build_dir, "magnum-bindings").unwrap();

    let installer = Installer::new(env.context(), magnum_host()).use_existing_source();
    let mut runner = SpyRunner::new();
    let err = installer.install(&magnum(), &mut runner).unwrap_err();

    assert_eq!(err.exit_code(), exit::LOCKED);
    assert!(runner.calls.is_empty());
}

#[test]
fn test_dry_run_touches_nothing() {
    let env = TestEnv::new();
    let ctx = env.context().dry_run(true);
    let installer = Installer::new(ctx, magnum_host());
    let mut runner = DryRunRunner::new();

    let outcome = installer.install(&magnum(), &mut runner).unwrap();

    assert_eq!(outcome.report.state, RunState::Succeeded);
    assert_eq!(runner.calls.len(), 6);
    assert!(!env.build_dir.exists());
    // the existing source tree is left alone
    assert!(env.source_dir.is_dir());
}

#[test]
fn test_run_log_written() {
    let env = TestEnv::new();
    let log = env.dir.path().join("run.json");
    let installer = Installer::new(env.context(), magnum_host())
        .use_existing_source()
        .log_to(&log);
    installer.install(&magnum(), &mut SpyRunner::new()).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&log).unwrap()).unwrap();
    assert_eq!(json["formula"], "magnum-bindings");
    assert_eq!(json["steps"].as_array().unwrap().len(), 5);
    assert_eq!(json["steps"][4]["index"], 5);
}

// =============================================================================
// Step failure
// =============================================================================

#[test]
fn test_failure_at_third_step() {
    let env = TestEnv::new();
    let installer = Installer::new(env.context(), magnum_host()).use_existing_source();
    let mut runner = SpyRunner::failing_at(3);

    let err = installer.install(&magnum(), &mut runner).unwrap_err();

    assert_eq!(err.exit_code(), exit::STEP_FAILED);
    match &err {
        Error::Step(failure) => {
            assert_eq!(failure.index, 3);
            assert_eq!(failure.exit_code, Some(2));
            assert_eq!(failure.command, "cmake --build .");
            assert!(failure.stderr.contains("Error 2"));
        }
        other => panic!("expected step failure, got {:?}", other),
    }
    // the delegate never ran
    assert_eq!(runner.calls.len(), 3);
    assert!(!runner.programs().contains(&"python3"));
}

#[test]
fn test_failed_state_reported() {
    let env = TestEnv::new();
    let recipe = magnum();
    let ctx = env.context();
    let mut executor = Executor::new(&env.source_dir, TemplateVars::for_recipe(&recipe, &ctx));
    let mut runner = SpyRunner::failing_at(3);

    let report = executor.execute(&recipe.install, &mut runner).unwrap();

    assert_eq!(report.state, RunState::Failed(3));
    assert_eq!(executor.state(), RunState::Failed(3));
    assert!(!report.succeeded());
    assert_eq!(report.into_result().unwrap_err().index, 3);
}

#[test]
fn test_failed_install_still_writes_log() {
    let env = TestEnv::new();
    let log = env.dir.path().join("run.json");
    let installer = Installer::new(env.context(), magnum_host())
        .use_existing_source()
        .log_to(&log);
    installer
        .install(&magnum(), &mut SpyRunner::failing_at(2))
        .unwrap_err();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&log).unwrap()).unwrap();
    let steps = json["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[1]["status"], "failed");
}

// =============================================================================
// Working directory
// =============================================================================

#[test]
fn test_process_cwd_never_changes() {
    let before = std::env::current_dir().unwrap();
    let env = TestEnv::new();
    let recipe = magnum();
    let ctx = env.context();
    let mut executor = Executor::new(&env.source_dir, TemplateVars::for_recipe(&recipe, &ctx));

    executor.execute(&recipe.install, &mut SpyRunner::new()).unwrap();
    assert_eq!(std::env::current_dir().unwrap(), before);
    assert_eq!(executor.current_dir(), env.source_dir);

    // a failure inside two nested scopes still unwinds to the root
    executor
        .execute(&recipe.install, &mut SpyRunner::failing_at(5))
        .unwrap();
    assert_eq!(std::env::current_dir().unwrap(), before);
    assert_eq!(executor.current_dir(), env.source_dir);
}

// =============================================================================
// Dependency gate
// =============================================================================

#[test]
fn test_no_dependencies_always_pass() {
    let recipe = Recipe::parse(common::UNCHECKED_ARCHIVE).unwrap();
    let report = check_dependencies(&recipe, &StaticProbe::new()).unwrap();
    assert!(report.satisfied.is_empty());
    assert!(report.deferred.is_empty());
}

#[test]
fn test_missing_build_dependency_blocks_install() {
    let env = TestEnv::new();
    let probe = StaticProbe::new()
        .with("cmake", None)
        .with("python", None)
        .with("magnum", None);
    let installer = Installer::new(env.context(), probe).use_existing_source();
    let mut runner = SpyRunner::new();

    let err = installer.install(&magnum(), &mut runner).unwrap_err();

    assert_eq!(err.exit_code(), exit::MISSING_DEPENDENCY);
    match &err {
        Error::MissingDependencies(m) => assert_eq!(m.names(), ["pybind11"]),
        other => panic!("expected missing dependencies, got {:?}", other),
    }
    assert!(runner.calls.is_empty());
}

#[test]
fn test_missing_runtime_dependency_after_install() {
    let env = TestEnv::new();
    let probe = StaticProbe::new().with("pybind11", None).with("cmake", None);
    let installer = Installer::new(env.context(), probe).use_existing_source();
    let mut runner = SpyRunner::new();

    let err = installer.install(&magnum(), &mut runner).unwrap_err();

    // steps ran; the run-time check failed afterwards
    assert_eq!(runner.calls.len(), 5);
    assert_eq!(err.exit_code(), exit::POST_INSTALL);
    match &err {
        Error::PostInstall(m) => assert_eq!(m.names(), ["python", "magnum"]),
        other => panic!("expected post-install failure, got {:?}", other),
    }
}

#[test]
fn test_version_requirement_checked() {
    let recipe = Recipe::parse(common::VERIFIED_ARCHIVE).unwrap();

    let old = StaticProbe::new().with("make", Some("3.81"));
    let err = check_dependencies(&recipe, &old).unwrap_err();
    assert!(matches!(
        err.missing[0].reason,
        MissingReason::VersionMismatch { .. }
    ));

    let current = StaticProbe::new().with("make", Some("4.4.1"));
    assert!(check_dependencies(&recipe, &current).is_ok());

    let survey = gate::survey(&recipe, &current);
    assert_eq!(survey.len(), 1);
    assert!(survey[0].1.is_none());
}

// =============================================================================
// Checksum policy
// =============================================================================

#[test]
fn test_unchecked_archive_rejected_by_default() {
    let env = TestEnv::new();
    let recipe = Recipe::parse(common::UNCHECKED_ARCHIVE).unwrap();
    let installer = Installer::new(env.context(), StaticProbe::new());
    let mut runner = SpyRunner::new();

    let err = installer.install(&recipe, &mut runner).unwrap_err();
    assert_eq!(err.exit_code(), exit::INVALID);
    assert!(runner.calls.is_empty());
}

#[test]
fn test_unchecked_archive_warns_when_allowed() {
    let env = TestEnv::new();
    let recipe = Recipe::parse(common::UNCHECKED_ARCHIVE).unwrap();
    let installer = Installer::new(env.context().dry_run(true), StaticProbe::new())
        .checksum_policy(formula::ChecksumPolicy::Warn);

    let outcome = installer.install(&recipe, &mut DryRunRunner::new()).unwrap();
    assert_eq!(outcome.warnings.len(), 1);
}
