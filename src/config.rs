//! Host configuration: `formula/config.toml`.
//!
//! Files are read from every `$XDG_CONFIG_DIRS` entry, then
//! `$XDG_CONFIG_HOME`, later files overriding earlier ones key by key. An
//! explicit `--config` file replaces the search. Command-line flags override
//! whatever the files say.
//!
//! ```toml
//! prefix = "/opt/formula"
//! build_dir = "/var/tmp/formula"
//! recipes_path = "/usr/share/formula/recipes"
//! checksum_policy = "strict"
//! timeout_secs = 3600
//!
//! [provides]
//! magnum = "2020.06"
//! pybind11 = true
//!
//! [delegates.python]
//! program = "python3.12"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::executor::delegate::{self, DelegateRegistry};
use crate::probe::StaticProbe;
use crate::recipe::ChecksumPolicy;

const DEFAULT_PREFIX: &str = "/usr/local";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid TOML in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("[delegates.{0}]: no built-in installer for this language (known: python, node)")]
    UnknownDelegate(String),
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    prefix: Option<PathBuf>,
    build_dir: Option<PathBuf>,
    recipes_path: Option<PathBuf>,
    checksum_policy: Option<ChecksumPolicy>,
    timeout_secs: Option<u64>,
    provides: Option<BTreeMap<String, Provided>>,
    delegates: Option<BTreeMap<String, DelegateToml>>,
}

/// `name = true` (present, version unknown) or `name = "1.2.3"`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
enum Provided {
    Present(bool),
    Version(String),
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DelegateToml {
    program: Option<String>,
}

impl ConfigToml {
    fn merge(&mut self, other: ConfigToml) {
        if other.prefix.is_some() {
            self.prefix = other.prefix;
        }
        if other.build_dir.is_some() {
            self.build_dir = other.build_dir;
        }
        if other.recipes_path.is_some() {
            self.recipes_path = other.recipes_path;
        }
        if other.checksum_policy.is_some() {
            self.checksum_policy = other.checksum_policy;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
        match (self.provides.as_mut(), other.provides) {
            (Some(dst), Some(src)) => dst.extend(src),
            (None, Some(src)) => self.provides = Some(src),
            _ => {}
        }
        match (self.delegates.as_mut(), other.delegates) {
            (Some(dst), Some(src)) => {
                for (lang, d) in src {
                    let entry = dst.entry(lang).or_default();
                    if d.program.is_some() {
                        entry.program = d.program;
                    }
                }
            }
            (None, Some(src)) => self.delegates = Some(src),
            _ => {}
        }
    }
}

/// Resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub prefix: PathBuf,
    /// None means a fresh temporary directory per install.
    pub build_dir: Option<PathBuf>,
    pub recipes_path: PathBuf,
    pub checksum_policy: ChecksumPolicy,
    pub timeout: Option<Duration>,
    /// Dependencies declared as present regardless of what the host probe finds.
    pub provides: StaticProbe,
    /// Language to installer program overrides.
    pub delegate_programs: BTreeMap<String, String>,
    /// Files that contributed, in load order.
    pub sources: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::resolve(ConfigToml::default(), Vec::new())
    }
}

/// Default recipes directory (XDG compliant)
pub fn default_recipes_path() -> PathBuf {
    let data_home = std::env::var("XDG_DATA_HOME")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .or_else(dirs::data_dir)
        .unwrap_or_else(|| PathBuf::from(".local/share"));
    data_home.join("formula").join("recipes")
}

fn split_xdg_config_dirs(raw: Option<String>) -> Vec<PathBuf> {
    raw.unwrap_or_else(|| "/etc/xdg".to_owned())
        .split(':')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

fn xdg_config_home(raw: Option<String>) -> PathBuf {
    if let Some(raw) = raw {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".").join(".config"))
}

/// Candidate config files, lowest priority first.
fn candidates(
    xdg_config_dirs: Option<String>,
    xdg_config_home_raw: Option<String>,
) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = split_xdg_config_dirs(xdg_config_dirs)
        .into_iter()
        .rev()
        .map(|dir| dir.join("formula").join("config.toml"))
        .collect();
    paths.push(xdg_config_home(xdg_config_home_raw).join("formula").join("config.toml"));
    paths
}

/// Candidate config files for the current environment.
pub fn find_config_files() -> Vec<PathBuf> {
    candidates(
        std::env::var("XDG_CONFIG_DIRS").ok(),
        std::env::var("XDG_CONFIG_HOME").ok(),
    )
}

fn read_toml(path: &Path) -> Result<ConfigToml, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_toml(&text, path)
}

fn parse_toml(text: &str, path: &Path) -> Result<ConfigToml, ConfigError> {
    toml::from_str::<ConfigToml>(text).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

impl Config {
    /// Load `explicit` alone, or merge every config file that exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Ok(Self::resolve(read_toml(path)?, vec![path.to_path_buf()])),
            None => Self::load_from(&find_config_files()),
        }
    }

    /// Merge the files in `paths` that exist, later ones winning.
    pub fn load_from(paths: &[PathBuf]) -> Result<Self, ConfigError> {
        let mut merged = ConfigToml::default();
        let mut sources = Vec::new();
        for path in paths {
            if !path.exists() {
                continue;
            }
            tracing::debug!(path = %path.display(), "loading config");
            merged.merge(read_toml(path)?);
            sources.push(path.clone());
        }
        Ok(Self::resolve(merged, sources))
    }

    /// Parse a single document (used for `--config` and in tests).
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        Ok(Self::resolve(parse_toml(text, origin)?, vec![origin.to_path_buf()]))
    }

    fn resolve(cfg: ConfigToml, sources: Vec<PathBuf>) -> Self {
        let mut provides = StaticProbe::new();
        for (name, provided) in cfg.provides.unwrap_or_default() {
            match provided {
                Provided::Present(true) => provides.insert(name, None),
                Provided::Present(false) => {}
                Provided::Version(v) => provides.insert(name, Some(v)),
            }
        }

        let delegate_programs = cfg
            .delegates
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(lang, d)| d.program.map(|p| (lang, p)))
            .collect();

        Self {
            prefix: cfg.prefix.unwrap_or_else(|| PathBuf::from(DEFAULT_PREFIX)),
            build_dir: cfg.build_dir,
            recipes_path: cfg.recipes_path.unwrap_or_else(default_recipes_path),
            checksum_policy: cfg.checksum_policy.unwrap_or_default(),
            timeout: cfg.timeout_secs.filter(|s| *s > 0).map(Duration::from_secs),
            provides,
            delegate_programs,
            sources,
        }
    }

    /// Built-in delegate installers with configured program overrides.
    pub fn delegate_registry(&self) -> Result<DelegateRegistry, ConfigError> {
        let mut registry = DelegateRegistry::default();
        for (lang, program) in &self.delegate_programs {
            let builder = delegate::builtin(lang, program)
                .ok_or_else(|| ConfigError::UnknownDelegate(lang.clone()))?;
            registry.register_shared(lang.clone(), builder);
        }
        Ok(registry)
    }
}
