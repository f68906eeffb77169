//! Dependency gate: checks declared dependencies before anything runs.
//!
//! Build-time dependencies block the install and are reported all at once.
//! Run-time dependencies are only recorded; [`assert_runtime`] checks them
//! after the install steps have finished.

use std::fmt;

use semver::VersionReq;
use thiserror::Error;

use crate::recipe::{DepKind, Dependency, Recipe};

/// What the host has installed.
pub trait EnvironmentProbe {
    fn has(&self, name: &str) -> bool;

    /// Installed version, if the probe can tell.
    fn version_of(&self, name: &str) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingReason {
    Absent,
    /// Present, but the probe cannot report a version to check.
    VersionUnknown { required: VersionReq },
    /// Present in a version outside the requirement.
    VersionMismatch { found: String, required: VersionReq },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
    pub name: String,
    pub kind: DepKind,
    pub reason: MissingReason,
}

impl fmt::Display for MissingDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            MissingReason::Absent => write!(f, "{} ({})", self.name, self.kind),
            MissingReason::VersionUnknown { required } => {
                write!(f, "{} {} ({}, version unknown)", self.name, required, self.kind)
            }
            MissingReason::VersionMismatch { found, required } => {
                write!(f, "{} {} ({}, found {})", self.name, required, self.kind, found)
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("missing dependencies: {}", join(.missing))]
pub struct MissingDependencies {
    pub missing: Vec<MissingDependency>,
}

impl MissingDependencies {
    pub fn names(&self) -> Vec<&str> {
        self.missing.iter().map(|m| m.name.as_str()).collect()
    }
}

fn join(missing: &[MissingDependency]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Outcome of a passing gate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateReport {
    /// Build-time dependencies that were found.
    pub satisfied: Vec<Dependency>,
    /// Run-time dependencies, checked after the install.
    pub deferred: Vec<Dependency>,
}

fn check_one(dep: &Dependency, probe: &dyn EnvironmentProbe) -> Option<MissingDependency> {
    let missing = |reason| {
        Some(MissingDependency {
            name: dep.name.clone(),
            kind: dep.kind,
            reason,
        })
    };

    if !probe.has(&dep.name) {
        return missing(MissingReason::Absent);
    }
    let Some(required) = &dep.requirement else {
        return None;
    };
    match probe.version_of(&dep.name) {
        None => missing(MissingReason::VersionUnknown {
            required: required.clone(),
        }),
        Some(found) if !dep.satisfied_by(&found) => missing(MissingReason::VersionMismatch {
            found,
            required: required.clone(),
        }),
        Some(_) => None,
    }
}

/// Check every declared dependency against `probe`.
pub fn check_dependencies(
    recipe: &Recipe,
    probe: &dyn EnvironmentProbe,
) -> Result<GateReport, MissingDependencies> {
    let mut report = GateReport::default();
    let mut missing = Vec::new();

    for dep in &recipe.dependencies {
        match dep.kind {
            DepKind::Build => match check_one(dep, probe) {
                Some(m) => missing.push(m),
                None => report.satisfied.push(dep.clone()),
            },
            DepKind::Run => report.deferred.push(dep.clone()),
        }
    }

    tracing::debug!(
        satisfied = report.satisfied.len(),
        deferred = report.deferred.len(),
        missing = missing.len(),
        "dependency gate"
    );

    if missing.is_empty() {
        Ok(report)
    } else {
        Err(MissingDependencies { missing })
    }
}

/// Check the run-time dependencies deferred by the gate.
pub fn assert_runtime(
    report: &GateReport,
    probe: &dyn EnvironmentProbe,
) -> Result<(), MissingDependencies> {
    let missing: Vec<_> = report
        .deferred
        .iter()
        .filter_map(|dep| check_one(dep, probe))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(MissingDependencies { missing })
    }
}

/// Every dependency with its current status, for `formula deps`.
pub fn survey<'a>(
    recipe: &'a Recipe,
    probe: &dyn EnvironmentProbe,
) -> Vec<(&'a Dependency, Option<MissingReason>)> {
    recipe
        .dependencies
        .iter()
        .map(|dep| (dep, check_one(dep, probe).map(|m| m.reason)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::StaticProbe;
    use crate::recipe::{Source, Step};

    fn recipe(deps: Vec<Dependency>) -> Recipe {
        Recipe {
            name: "magnum-bindings".into(),
            version: None,
            description: "bindings".into(),
            homepage: "https://magnum.graphics".into(),
            source: Source::head("https://github.com/mosra/magnum-bindings.git"),
            dependencies: deps,
            configuration: None,
            install: vec![Step::run(["true"])],
        }
    }

    #[test]
    fn test_empty_dependencies_always_pass() {
        let report = check_dependencies(&recipe(vec![]), &StaticProbe::new()).unwrap();
        assert_eq!(report, GateReport::default());
    }

    #[test]
    fn test_all_missing_build_deps_reported() {
        let r = recipe(vec![
            Dependency::build("cmake"),
            Dependency::build("pybind11"),
            Dependency::build("ninja"),
            Dependency::run("magnum"),
        ]);
        let probe = StaticProbe::new().with("ninja", None);

        let err = check_dependencies(&r, &probe).unwrap_err();
        assert_eq!(err.names(), ["cmake", "pybind11"]);
        assert!(err.to_string().contains("cmake (build)"));
    }

    #[test]
    fn test_runtime_deps_deferred() {
        let r = recipe(vec![Dependency::build("cmake"), Dependency::run("python")]);
        let probe = StaticProbe::new().with("cmake", Some("3.27.1"));

        let report = check_dependencies(&r, &probe).unwrap();
        assert_eq!(report.satisfied, [Dependency::build("cmake")]);
        assert_eq!(report.deferred, [Dependency::run("python")]);

        let err = assert_runtime(&report, &probe).unwrap_err();
        assert_eq!(err.names(), ["python"]);
        assert_eq!(err.missing[0].kind, DepKind::Run);

        let probe = probe.with("python", Some("3.12"));
        assert!(assert_runtime(&report, &probe).is_ok());
    }

    #[test]
    fn test_version_requirements() {
        let req = VersionReq::parse(">=3.4").unwrap();
        let r = recipe(vec![Dependency::build("cmake").requiring(req.clone())]);

        let old = StaticProbe::new().with("cmake", Some("3.2.0"));
        let err = check_dependencies(&r, &old).unwrap_err();
        assert_eq!(
            err.missing[0].reason,
            MissingReason::VersionMismatch {
                found: "3.2.0".into(),
                required: req.clone()
            }
        );

        let unknown = StaticProbe::new().with("cmake", None);
        let err = check_dependencies(&r, &unknown).unwrap_err();
        assert!(matches!(err.missing[0].reason, MissingReason::VersionUnknown { .. }));

        let new = StaticProbe::new().with("cmake", Some("3.27"));
        assert!(check_dependencies(&r, &new).is_ok());
    }

    #[test]
    fn test_survey_lists_everything() {
        let r = recipe(vec![Dependency::build("cmake"), Dependency::run("python")]);
        let probe = StaticProbe::new().with("python", None);

        let rows = survey(&r, &probe);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1, Some(MissingReason::Absent));
        assert_eq!(rows[1].1, None);
    }
}
