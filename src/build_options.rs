//! Typed build-system configuration.
//!
//! A recipe may declare which build-system generator it drives and a small,
//! closed set of options for it:
//!
//! ```lisp
//! (configure cmake (build-type release) (shared-libs on) (with python))
//! ```
//!
//! Each option is validated against the system it is declared for, and the
//! whole configuration renders to that system's native command-line flags,
//! which recipes splice into a command with `$@CONFIGURE_ARGS`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionError {
    #[error("unknown build system: {0} (expected cmake, meson or autotools)")]
    UnknownSystem(String),
    #[error("unknown build option: {0}")]
    UnknownOption(String),
    #[error("option '{option}' is not supported by {system}")]
    Unsupported { option: String, system: BuildSystem },
    #[error("invalid value '{value}' for option '{option}'")]
    InvalidValue { option: String, value: String },
    #[error("option '{0}' is declared more than once")]
    Duplicate(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildSystem {
    Cmake,
    Meson,
    Autotools,
}

impl BuildSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cmake => "cmake",
            Self::Meson => "meson",
            Self::Autotools => "autotools",
        }
    }
}

impl fmt::Display for BuildSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildSystem {
    type Err = OptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cmake" => Ok(Self::Cmake),
            "meson" => Ok(Self::Meson),
            "autotools" => Ok(Self::Autotools),
            other => Err(OptionError::UnknownSystem(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildType {
    #[default]
    Release,
    Debug,
    RelWithDebInfo,
    MinSizeRel,
}

impl BuildType {
    /// Keyword used in recipe files.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Debug => "debug",
            Self::RelWithDebInfo => "relwithdebinfo",
            Self::MinSizeRel => "minsizerel",
        }
    }

    /// CMake spelling, also exported to templates as `$BUILD_TYPE`.
    pub fn cmake_name(&self) -> &'static str {
        match self {
            Self::Release => "Release",
            Self::Debug => "Debug",
            Self::RelWithDebInfo => "RelWithDebInfo",
            Self::MinSizeRel => "MinSizeRel",
        }
    }

    /// Meson `--buildtype` spelling.
    pub fn meson_name(&self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Debug => "debug",
            Self::RelWithDebInfo => "debugoptimized",
            Self::MinSizeRel => "minsize",
        }
    }
}

impl FromStr for BuildType {
    type Err = OptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "release" => Ok(Self::Release),
            "debug" => Ok(Self::Debug),
            "relwithdebinfo" => Ok(Self::RelWithDebInfo),
            "minsizerel" => Ok(Self::MinSizeRel),
            _ => Err(OptionError::InvalidValue {
                option: "build-type".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOption {
    BuildType(BuildType),
    SharedLibs(bool),
    Generator(String),
    Feature { name: String, enabled: bool },
}

impl BuildOption {
    /// Keyword of the option's form in recipe files.
    pub fn keyword(&self) -> &str {
        match self {
            Self::BuildType(_) => "build-type",
            Self::SharedLibs(_) => "shared-libs",
            Self::Generator(_) => "generator",
            Self::Feature { enabled: true, .. } => "with",
            Self::Feature { enabled: false, .. } => "without",
        }
    }

    /// Parse one option form given its keyword and arguments.
    pub fn from_parts(keyword: &str, args: &[&str]) -> Result<Self, OptionError> {
        match keyword {
            "build-type" => Ok(Self::BuildType(single(keyword, args)?.parse()?)),
            "shared-libs" => {
                let value = single(keyword, args)?;
                let on = parse_switch(value).ok_or_else(|| OptionError::InvalidValue {
                    option: keyword.to_string(),
                    value: value.to_string(),
                })?;
                Ok(Self::SharedLibs(on))
            }
            "generator" => Ok(Self::Generator(single(keyword, args)?.to_string())),
            "with" | "without" => {
                let name = single(keyword, args)?;
                if name.is_empty()
                    || !name
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
                {
                    return Err(OptionError::InvalidValue {
                        option: keyword.to_string(),
                        value: name.to_string(),
                    });
                }
                Ok(Self::Feature {
                    name: name.to_string(),
                    enabled: keyword == "with",
                })
            }
            other => Err(OptionError::UnknownOption(other.to_string())),
        }
    }

    /// Arguments of the option form, as written back to recipe files.
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::BuildType(t) => vec![t.keyword().to_string()],
            Self::SharedLibs(on) => vec![if *on { "on" } else { "off" }.to_string()],
            Self::Generator(g) => vec![g.clone()],
            Self::Feature { name, .. } => vec![name.clone()],
        }
    }

    fn supported_by(&self, system: BuildSystem) -> bool {
        match self {
            Self::BuildType(_) => system != BuildSystem::Autotools,
            Self::Generator(_) => system == BuildSystem::Cmake,
            Self::SharedLibs(_) | Self::Feature { .. } => true,
        }
    }

    /// Identity used for duplicate detection: features are keyed by name.
    fn slot(&self) -> String {
        match self {
            Self::Feature { name, .. } => format!("feature:{}", name),
            other => other.keyword().to_string(),
        }
    }
}

fn single<'a>(option: &str, args: &[&'a str]) -> Result<&'a str, OptionError> {
    match args {
        [value] => Ok(*value),
        _ => Err(OptionError::InvalidValue {
            option: option.to_string(),
            value: args.join(" "),
        }),
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value {
        "on" | "yes" | "true" => Some(true),
        "off" | "no" | "false" => Some(false),
        _ => None,
    }
}

/// Build-system configuration declared by a recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub system: BuildSystem,
    pub options: Vec<BuildOption>,
}

impl Configuration {
    pub fn new(system: BuildSystem) -> Self {
        Self {
            system,
            options: Vec::new(),
        }
    }

    pub fn with(mut self, option: BuildOption) -> Self {
        self.options.push(option);
        self
    }

    /// Reject options the system does not understand and repeated options.
    pub fn validate(&self) -> Result<(), OptionError> {
        let mut seen = std::collections::HashSet::new();
        for option in &self.options {
            if !option.supported_by(self.system) {
                return Err(OptionError::Unsupported {
                    option: option.keyword().to_string(),
                    system: self.system,
                });
            }
            if !seen.insert(option.slot()) {
                return Err(OptionError::Duplicate(option.keyword().to_string()));
            }
        }
        Ok(())
    }

    /// Declared build type, or the release default.
    pub fn build_type(&self) -> BuildType {
        self.options
            .iter()
            .find_map(|o| match o {
                BuildOption::BuildType(t) => Some(*t),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Render the native configure flags for an install prefix.
    pub fn configure_args(&self, prefix: &str) -> Vec<String> {
        match self.system {
            BuildSystem::Cmake => self.cmake_args(prefix),
            BuildSystem::Meson => self.meson_args(prefix),
            BuildSystem::Autotools => self.autotools_args(prefix),
        }
    }

    fn cmake_args(&self, prefix: &str) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(generator) = self.options.iter().find_map(|o| match o {
            BuildOption::Generator(g) => Some(g),
            _ => None,
        }) {
            args.push("-G".to_string());
            args.push(generator.clone());
        }
        args.push(format!("-DCMAKE_BUILD_TYPE={}", self.build_type().cmake_name()));
        args.push(format!("-DCMAKE_INSTALL_PREFIX={}", prefix));
        for option in &self.options {
            match option {
                BuildOption::SharedLibs(on) => {
                    args.push(format!("-DBUILD_SHARED_LIBS={}", on_off(*on)));
                }
                BuildOption::Feature { name, enabled } => {
                    args.push(format!("-DWITH_{}={}", cmake_ident(name), on_off(*enabled)));
                }
                BuildOption::BuildType(_) | BuildOption::Generator(_) => {}
            }
        }
        args
    }

    fn meson_args(&self, prefix: &str) -> Vec<String> {
        let mut args = vec![
            format!("--prefix={}", prefix),
            format!("--buildtype={}", self.build_type().meson_name()),
        ];
        for option in &self.options {
            match option {
                BuildOption::SharedLibs(on) => {
                    let kind = if *on { "shared" } else { "static" };
                    args.push(format!("-Ddefault_library={}", kind));
                }
                BuildOption::Feature { name, enabled } => {
                    let state = if *enabled { "enabled" } else { "disabled" };
                    args.push(format!("-D{}={}", name, state));
                }
                BuildOption::BuildType(_) | BuildOption::Generator(_) => {}
            }
        }
        args
    }

    fn autotools_args(&self, prefix: &str) -> Vec<String> {
        let mut args = vec![format!("--prefix={}", prefix)];
        for option in &self.options {
            match option {
                BuildOption::SharedLibs(true) => args.push("--enable-shared".to_string()),
                BuildOption::SharedLibs(false) => args.push("--disable-shared".to_string()),
                BuildOption::Feature { name, enabled: true } => {
                    args.push(format!("--with-{}", name));
                }
                BuildOption::Feature { name, enabled: false } => {
                    args.push(format!("--without-{}", name));
                }
                BuildOption::BuildType(_) | BuildOption::Generator(_) => {}
            }
        }
        args
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "ON" } else { "OFF" }
}

fn cmake_ident(name: &str) -> String {
    name.to_ascii_uppercase().replace('-', "_")
}
