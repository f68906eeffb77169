//! Recipe model: converts parsed S-expressions into structured data and back.
//!
//! A recipe file holds one `(formula ...)` form:
//!
//! ```lisp
//! (formula "magnum-bindings"
//!   (description "Bindings for the Magnum C++11/C++14 graphics engine")
//!   (homepage "https://magnum.graphics")
//!   (source head "https://github.com/mosra/magnum-bindings.git")
//!   (depends-on "magnum")
//!   (depends-on "pybind11" build)
//!   (configure cmake (build-type release) (with python))
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
//! Parsing checks structure and types only. The checksum policy is applied
//! separately by [`Recipe::validate`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::Expr;
use crate::build_options::{BuildOption, BuildSystem, Configuration, OptionError};
use crate::parser::{self, ParseError};

#[derive(Error, Debug)]
pub enum RecipeError {
    #[error("cannot read recipe {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("syntax error: {0}")]
    Syntax(#[from] ParseError),
    #[error("expected (formula ...), got: {0}")]
    NotAFormula(String),
    #[error("missing formula name")]
    MissingName,
    #[error("invalid formula name '{0}': use letters, digits, '-', '_', '+' or '.'")]
    InvalidName(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("field declared more than once: {0}")]
    DuplicateField(String),
    #[error("unknown form in {context}: {form}")]
    UnknownForm { context: &'static str, form: String },
    #[error("invalid {context}: {reason}")]
    InvalidForm {
        context: &'static str,
        reason: String,
    },
    #[error("homepage must be an http(s) URL, got '{0}'")]
    InvalidHomepage(String),
    #[error("invalid {algorithm} checksum: {reason}")]
    InvalidChecksum {
        algorithm: HashAlgorithm,
        reason: String,
    },
    #[error("invalid version requirement for '{name}': {reason}")]
    InvalidRequirement { name: String, reason: String },
    #[error(
        "archive source {0} has no checksum (mark it `unverified` or relax the checksum policy)"
    )]
    MissingChecksum(String),
    #[error("configuration: {0}")]
    Options(#[from] OptionError),
}

fn invalid(context: &'static str, reason: impl Into<String>) -> RecipeError {
    RecipeError::InvalidForm {
        context,
        reason: reason.into(),
    }
}

/// What to do with an archive source that carries no checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumPolicy {
    /// Missing checksum is a validation error.
    #[default]
    Strict,
    /// Missing checksum is reported as a warning.
    Warn,
}

impl FromStr for ChecksumPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(Self::Strict),
            "warn" => Ok(Self::Warn),
            other => Err(format!("unknown checksum policy '{}' (strict or warn)", other)),
        }
    }
}

/// Non-fatal findings from [`Recipe::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    MissingChecksum { location: String },
    Unverified { location: String },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingChecksum { location } => {
                write!(f, "archive {} has no checksum; download will not be verified", location)
            }
            Self::Unverified { location } => {
                write!(f, "archive {} is marked unverified", location)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Length of the hex digest.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest.
    pub digest: String,
}

impl Checksum {
    pub fn new(algorithm: HashAlgorithm, digest: &str) -> Result<Self, RecipeError> {
        let digest = digest.trim().to_ascii_lowercase();
        if digest.len() != algorithm.hex_len() {
            return Err(RecipeError::InvalidChecksum {
                algorithm,
                reason: format!(
                    "expected {} hex characters, got {}",
                    algorithm.hex_len(),
                    digest.len()
                ),
            });
        }
        if !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RecipeError::InvalidChecksum {
                algorithm,
                reason: "digest is not hexadecimal".to_string(),
            });
        }
        Ok(Self { algorithm, digest })
    }

    pub fn sha256(digest: &str) -> Result<Self, RecipeError> {
        Self::new(HashAlgorithm::Sha256, digest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Release archive downloaded from a URL.
    Archive,
    /// Version-control checkout of the default branch (or a named one).
    Head,
}

impl SourceKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Archive => "archive",
            Self::Head => "head",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub kind: SourceKind,
    pub location: String,
    pub checksum: Option<Checksum>,
    /// Archive explicitly accepted without a checksum.
    pub unverified: bool,
    /// Branch to check out (head sources only).
    pub branch: Option<String>,
}

impl Source {
    pub fn archive(location: impl Into<String>, checksum: Checksum) -> Self {
        Self {
            kind: SourceKind::Archive,
            location: location.into(),
            checksum: Some(checksum),
            unverified: false,
            branch: None,
        }
    }

    pub fn head(location: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Head,
            location: location.into(),
            checksum: None,
            unverified: false,
            branch: None,
        }
    }

    fn check(&self) -> Result<(), RecipeError> {
        if self.location.trim().is_empty() {
            return Err(invalid("source", "location is empty"));
        }
        match self.kind {
            SourceKind::Archive => {
                if self.branch.is_some() {
                    return Err(invalid("source", "archive sources cannot name a branch"));
                }
                if self.unverified && self.checksum.is_some() {
                    return Err(invalid("source", "archive is both checksummed and unverified"));
                }
            }
            SourceKind::Head => {
                if self.checksum.is_some() || self.unverified {
                    return Err(invalid("source", "head sources cannot carry a checksum"));
                }
            }
        }
        Ok(())
    }
}

/// When a dependency has to be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DepKind {
    /// Needed only while building.
    Build,
    /// Needed by the installed artifact.
    Run,
}

impl DepKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Run => "run",
        }
    }
}

impl fmt::Display for DepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A declared dependency with optional version requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub kind: DepKind,
    pub requirement: Option<VersionReq>,
}

impl Dependency {
    pub fn build(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DepKind::Build,
            requirement: None,
        }
    }

    pub fn run(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DepKind::Run,
            requirement: None,
        }
    }

    pub fn requiring(mut self, requirement: VersionReq) -> Self {
        self.requirement = Some(requirement);
        self
    }

    /// Check a reported version against the requirement.
    ///
    /// Partial versions ("3", "3.4") are padded to three components;
    /// versions that still do not parse never satisfy a requirement.
    pub fn satisfied_by(&self, version: &str) -> bool {
        let Some(req) = &self.requirement else {
            return true;
        };
        Version::parse(version)
            .or_else(|_| Version::parse(&pad_version(version)))
            .map(|v| req.matches(&v))
            .unwrap_or(false)
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.requirement {
            Some(req) => write!(f, "{} {}", self.name, req),
            None => write!(f, "{}", self.name),
        }
    }
}

fn pad_version(version: &str) -> String {
    let parts: Vec<&str> = version.trim().split('.').collect();
    match parts.len() {
        1 => format!("{}.0.0", parts[0]),
        2 => format!("{}.{}.0", parts[0], parts[1]),
        _ => version.trim().to_string(),
    }
}

/// One operation of the install sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Create a directory (and parents) relative to the current directory.
    CreateDir(String),
    /// Run the nested steps inside `path`; the previous directory is
    /// restored afterwards, whether the steps succeed or not.
    ChangeDir { path: String, steps: Vec<Step> },
    /// Run an external command; the step fails if it exits with anything
    /// other than `expect`.
    Run { argv: Vec<String>, expect: i32 },
    /// Hand the current directory to a language package installer.
    DelegateInstall {
        language: String,
        prefix: Option<String>,
    },
}

impl Step {
    pub fn mkdir(path: impl Into<String>) -> Self {
        Step::CreateDir(path.into())
    }

    pub fn cd(path: impl Into<String>, steps: Vec<Step>) -> Self {
        Step::ChangeDir {
            path: path.into(),
            steps,
        }
    }

    pub fn run<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Step::Run {
            argv: argv.into_iter().map(Into::into).collect(),
            expect: 0,
        }
    }

    pub fn delegate(language: impl Into<String>) -> Self {
        Step::DelegateInstall {
            language: language.into(),
            prefix: None,
        }
    }

    /// Number of numbered (non-scope) steps, nested bodies included.
    pub fn count(steps: &[Step]) -> usize {
        steps
            .iter()
            .map(|s| match s {
                Step::ChangeDir { steps, .. } => Step::count(steps),
                _ => 1,
            })
            .sum()
    }
}

/// A parsed build recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub name: String,
    pub version: Option<String>,
    pub description: String,
    pub homepage: String,
    pub source: Source,
    pub dependencies: Vec<Dependency>,
    pub configuration: Option<Configuration>,
    pub install: Vec<Step>,
}

impl Recipe {
    /// Read and parse a recipe file.
    pub fn load(path: &Path) -> Result<Self, RecipeError> {
        let text = std::fs::read_to_string(path).map_err(|source| RecipeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse recipe text.
    pub fn parse(input: &str) -> Result<Self, RecipeError> {
        let expr = parser::parse(input)?;
        Self::from_expr(&expr)
    }

    /// Build a recipe from a parsed `(formula ...)` expression.
    pub fn from_expr(expr: &Expr) -> Result<Self, RecipeError> {
        let list = expr
            .as_list()
            .ok_or_else(|| RecipeError::NotAFormula(expr.to_string()))?;

        if list.first().and_then(|e| e.as_atom()) != Some("formula") {
            return Err(RecipeError::NotAFormula(truncate(&expr.to_string())));
        }

        let name = list
            .get(1)
            .and_then(|e| e.as_atom())
            .ok_or(RecipeError::MissingName)?
            .to_string();

        let mut fields = Fields::default();
        for form in list.iter().skip(2) {
            fields.parse_form(form)?;
        }

        let recipe = Recipe {
            name,
            version: fields.version,
            description: fields.description.ok_or(RecipeError::MissingField("description"))?,
            homepage: fields.homepage.ok_or(RecipeError::MissingField("homepage"))?,
            source: fields.source.ok_or(RecipeError::MissingField("source"))?,
            dependencies: fields.dependencies,
            configuration: fields.configuration,
            install: fields.install.ok_or(RecipeError::MissingField("install"))?,
        };
        recipe.check_invariants()?;
        Ok(recipe)
    }

    /// Structural invariants shared by parsing and validation.
    fn check_invariants(&self) -> Result<(), RecipeError> {
        if self.name.is_empty() {
            return Err(RecipeError::MissingName);
        }
        if !valid_name(&self.name) {
            return Err(RecipeError::InvalidName(self.name.clone()));
        }
        if !(self.homepage.starts_with("https://") || self.homepage.starts_with("http://")) {
            return Err(RecipeError::InvalidHomepage(self.homepage.clone()));
        }
        self.source.check()?;
        for dep in &self.dependencies {
            if dep.name.trim().is_empty() {
                return Err(invalid("depends-on", "dependency name is empty"));
            }
        }
        if let Some(config) = &self.configuration {
            config.validate()?;
        }
        if self.install.is_empty() {
            return Err(invalid("install", "no steps"));
        }
        check_steps(&self.install)
    }

    /// Apply the checksum policy on top of the structural checks.
    pub fn validate(&self, policy: ChecksumPolicy) -> Result<Vec<ValidationWarning>, RecipeError> {
        self.check_invariants()?;

        let mut warnings = Vec::new();
        if self.source.kind == SourceKind::Archive && self.source.checksum.is_none() {
            let location = self.source.location.clone();
            if self.source.unverified {
                warnings.push(ValidationWarning::Unverified { location });
            } else {
                match policy {
                    ChecksumPolicy::Strict => return Err(RecipeError::MissingChecksum(location)),
                    ChecksumPolicy::Warn => {
                        warnings.push(ValidationWarning::MissingChecksum { location })
                    }
                }
            }
        }
        Ok(warnings)
    }

    pub fn build_deps(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().filter(|d| d.kind == DepKind::Build)
    }

    pub fn runtime_deps(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().filter(|d| d.kind == DepKind::Run)
    }

    /// Serialize back to the canonical `(formula ...)` expression.
    pub fn to_expr(&self) -> Expr {
        let mut items = vec![Expr::atom("formula"), Expr::atom(&self.name)];

        if let Some(version) = &self.version {
            items.push(form("version", [Expr::atom(version)]));
        }
        items.push(form("description", [Expr::atom(&self.description)]));
        items.push(form("homepage", [Expr::atom(&self.homepage)]));
        items.push(source_expr(&self.source));

        for dep in &self.dependencies {
            let mut args = vec![Expr::atom(&dep.name), Expr::atom(dep.kind.keyword())];
            if let Some(req) = &dep.requirement {
                args.push(form("version", [Expr::atom(req.to_string())]));
            }
            items.push(form("depends-on", args));
        }

        if let Some(config) = &self.configuration {
            let mut args = vec![Expr::atom(config.system.as_str())];
            for option in &config.options {
                args.push(form(
                    option.keyword(),
                    option.args().into_iter().map(Expr::Atom),
                ));
            }
            items.push(form("configure", args));
        }

        items.push(form("install", self.install.iter().map(step_expr)));
        Expr::List(items)
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.to_expr().pretty())
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() > 60 {
        let head: String = s.chars().take(57).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'))
}

fn check_steps(steps: &[Step]) -> Result<(), RecipeError> {
    for step in steps {
        match step {
            Step::CreateDir(path) if path.trim().is_empty() => {
                return Err(invalid("mkdir", "path is empty"));
            }
            Step::ChangeDir { path, steps } => {
                if path.trim().is_empty() {
                    return Err(invalid("cd", "path is empty"));
                }
                if steps.is_empty() {
                    return Err(invalid("cd", format!("'{}' has no steps", path)));
                }
                check_steps(steps)?;
            }
            Step::Run { argv, .. } if argv.is_empty() => {
                return Err(invalid("run", "command is empty"));
            }
            Step::DelegateInstall { language, .. } if language.trim().is_empty() => {
                return Err(invalid("delegate-install", "language is empty"));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Field slots filled while walking the formula's forms.
#[derive(Default)]
struct Fields {
    version: Option<String>,
    description: Option<String>,
    homepage: Option<String>,
    source: Option<Source>,
    dependencies: Vec<Dependency>,
    configuration: Option<Configuration>,
    install: Option<Vec<Step>>,
}

impl Fields {
    fn parse_form(&mut self, expr: &Expr) -> Result<(), RecipeError> {
        let head = expr
            .head()
            .ok_or_else(|| invalid("formula", format!("expected a form, got {}", expr)))?;
        let tail = expr.tail().unwrap_or_default();

        match head {
            "version" => set_once(&mut self.version, "version", single_atom(tail, "version")?),
            "description" => set_once(
                &mut self.description,
                "description",
                single_atom(tail, "description")?,
            ),
            "homepage" => set_once(&mut self.homepage, "homepage", single_atom(tail, "homepage")?),
            "source" => set_once(&mut self.source, "source", parse_source(tail)?),
            "depends-on" => {
                self.dependencies.push(parse_dependency(tail)?);
                Ok(())
            }
            "configure" => set_once(
                &mut self.configuration,
                "configure",
                parse_configuration(tail)?,
            ),
            "install" => set_once(&mut self.install, "install", parse_steps(tail)?),
            other => Err(RecipeError::UnknownForm {
                context: "formula",
                form: other.to_string(),
            }),
        }
    }
}

fn set_once<T>(slot: &mut Option<T>, field: &str, value: T) -> Result<(), RecipeError> {
    if slot.is_some() {
        return Err(RecipeError::DuplicateField(field.to_string()));
    }
    *slot = Some(value);
    Ok(())
}

fn single_atom(tail: &[Expr], context: &'static str) -> Result<String, RecipeError> {
    match tail {
        [Expr::Atom(s)] => Ok(s.clone()),
        _ => Err(invalid(context, "expected exactly one string")),
    }
}

fn atoms<'a>(tail: &'a [Expr], context: &'static str) -> Result<Vec<&'a str>, RecipeError> {
    tail.iter()
        .map(|e| {
            e.as_atom()
                .ok_or_else(|| invalid(context, format!("unexpected list {}", e)))
        })
        .collect()
}

fn parse_source(tail: &[Expr]) -> Result<Source, RecipeError> {
    let (kind, location, extras) = match tail {
        [Expr::Atom(kind), Expr::Atom(location), extras @ ..] => (kind, location, extras),
        _ => return Err(invalid("source", "expected (source <archive|head> \"<location>\" ...)")),
    };

    let kind = match kind.as_str() {
        "archive" => SourceKind::Archive,
        "head" => SourceKind::Head,
        other => {
            return Err(RecipeError::UnknownForm {
                context: "source",
                form: other.to_string(),
            });
        }
    };

    let mut source = Source {
        kind,
        location: location.clone(),
        checksum: None,
        unverified: false,
        branch: None,
    };

    for extra in extras {
        if extra.is_atom("unverified") {
            if source.unverified {
                return Err(RecipeError::DuplicateField("unverified".to_string()));
            }
            source.unverified = true;
            continue;
        }
        let head = extra
            .head()
            .ok_or_else(|| invalid("source", format!("unexpected {}", extra)))?;
        let value = single_atom(extra.tail().unwrap_or_default(), "source")?;
        match head {
            "sha256" => set_once(
                &mut source.checksum,
                "checksum",
                Checksum::new(HashAlgorithm::Sha256, &value)?,
            )?,
            "sha512" => set_once(
                &mut source.checksum,
                "checksum",
                Checksum::new(HashAlgorithm::Sha512, &value)?,
            )?,
            "branch" => set_once(&mut source.branch, "branch", value)?,
            other => {
                return Err(RecipeError::UnknownForm {
                    context: "source",
                    form: other.to_string(),
                });
            }
        }
    }

    source.check()?;
    Ok(source)
}

fn parse_dependency(tail: &[Expr]) -> Result<Dependency, RecipeError> {
    let (name, rest) = match tail {
        [Expr::Atom(name), rest @ ..] => (name, rest),
        _ => return Err(invalid("depends-on", "expected a dependency name")),
    };

    let mut dep = Dependency::run(name.as_str());
    let mut kind_seen = false;

    for item in rest {
        match item {
            Expr::Atom(kind) if !kind_seen && (kind == "build" || kind == "run") => {
                dep.kind = if kind == "build" {
                    DepKind::Build
                } else {
                    DepKind::Run
                };
                kind_seen = true;
            }
            list if list.head() == Some("version") && dep.requirement.is_none() => {
                let raw = single_atom(list.tail().unwrap_or_default(), "depends-on")?;
                let req = VersionReq::parse(&raw).map_err(|e| RecipeError::InvalidRequirement {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
                dep.requirement = Some(req);
            }
            other => {
                return Err(invalid(
                    "depends-on",
                    format!("unexpected {} for '{}'", other, name),
                ));
            }
        }
    }

    Ok(dep)
}

fn parse_configuration(tail: &[Expr]) -> Result<Configuration, RecipeError> {
    let (system, options) = match tail {
        [Expr::Atom(system), options @ ..] => (system, options),
        _ => return Err(invalid("configure", "expected a build system name")),
    };

    let mut config = Configuration::new(system.parse::<BuildSystem>()?);
    for option in options {
        let keyword = option.head().ok_or_else(|| {
            invalid("configure", format!("expected an option form, got {}", option))
        })?;
        let args = atoms(option.tail().unwrap_or_default(), "configure")?;
        config.options.push(BuildOption::from_parts(keyword, &args)?);
    }
    config.validate()?;
    Ok(config)
}

fn parse_steps(tail: &[Expr]) -> Result<Vec<Step>, RecipeError> {
    tail.iter().map(parse_step).collect()
}

fn parse_step(expr: &Expr) -> Result<Step, RecipeError> {
    let head = expr
        .head()
        .ok_or_else(|| invalid("install", format!("expected a step, got {}", expr)))?;
    let tail = expr.tail().unwrap_or_default();

    match head {
        "mkdir" => Ok(Step::CreateDir(single_atom(tail, "mkdir")?)),
        "cd" => match tail {
            [Expr::Atom(path), body @ ..] => Ok(Step::ChangeDir {
                path: path.clone(),
                steps: parse_steps(body)?,
            }),
            _ => Err(invalid("cd", "expected (cd \"<dir>\" <step>...)")),
        },
        "run" => {
            let (args, expect) = match tail {
                [args @ .., last] if last.head() == Some("expect") => {
                    let code = single_atom(last.tail().unwrap_or_default(), "run")?;
                    let code = code.parse::<i32>().map_err(|_| {
                        invalid("run", format!("expected exit code, got '{}'", code))
                    })?;
                    (args, code)
                }
                args => (args, 0),
            };
            let argv = atoms(args, "run")?
                .into_iter()
                .map(str::to_string)
                .collect();
            Ok(Step::Run { argv, expect })
        }
        "delegate-install" => match atoms(tail, "delegate-install")?.as_slice() {
            [language] => Ok(Step::DelegateInstall {
                language: language.to_string(),
                prefix: None,
            }),
            [language, prefix] => Ok(Step::DelegateInstall {
                language: language.to_string(),
                prefix: Some(prefix.to_string()),
            }),
            _ => Err(invalid(
                "delegate-install",
                "expected (delegate-install <language> [\"<prefix>\"])",
            )),
        },
        other => Err(RecipeError::UnknownForm {
            context: "install",
            form: other.to_string(),
        }),
    }
}

fn form(head: &str, args: impl IntoIterator<Item = Expr>) -> Expr {
    let mut items = vec![Expr::atom(head)];
    items.extend(args);
    Expr::List(items)
}

fn source_expr(source: &Source) -> Expr {
    let mut args = vec![
        Expr::atom(source.kind.keyword()),
        Expr::atom(&source.location),
    ];
    if let Some(checksum) = &source.checksum {
        args.push(form(
            checksum.algorithm.keyword(),
            [Expr::atom(&checksum.digest)],
        ));
    }
    if source.unverified {
        args.push(Expr::atom("unverified"));
    }
    if let Some(branch) = &source.branch {
        args.push(form("branch", [Expr::atom(branch)]));
    }
    form("source", args)
}

fn step_expr(step: &Step) -> Expr {
    match step {
        Step::CreateDir(path) => form("mkdir", [Expr::atom(path)]),
        Step::ChangeDir { path, steps } => {
            let mut args = vec![Expr::atom(path)];
            args.extend(steps.iter().map(step_expr));
            form("cd", args)
        }
        Step::Run { argv, expect } => {
            let mut args: Vec<Expr> = argv.iter().map(Expr::atom).collect();
            if *expect != 0 {
                args.push(form("expect", [Expr::atom(expect.to_string())]));
            }
            form("run", args)
        }
        Step::DelegateInstall { language, prefix } => {
            let mut args = vec![Expr::atom(language)];
            if let Some(prefix) = prefix {
                args.push(Expr::atom(prefix));
            }
            form("delegate-install", args)
        }
    }
}
