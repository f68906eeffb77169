//! Environment probes: answering "is this installed, and which version?"

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::executor::{CommandOutput, ProcessRunner, Runner};
use crate::gate::EnvironmentProbe;

/// Upper bound for a single `pkg-config` or `--version` query.
const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Looks at the running host: executables on `PATH`, then `pkg-config`.
#[derive(Debug, Clone)]
pub struct HostProbe {
    path: Option<OsString>,
    pkg_config: bool,
    timeout: Duration,
}

impl Default for HostProbe {
    fn default() -> Self {
        Self {
            path: std::env::var_os("PATH"),
            pkg_config: true,
            timeout: QUERY_TIMEOUT,
        }
    }
}

impl HostProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search this `PATH` value instead of the process environment.
    pub fn with_path(mut self, path: impl Into<OsString>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn pkg_config(mut self, enabled: bool) -> Self {
        self.pkg_config = enabled;
        self
    }

    /// How long a query may run before it is killed and treated as no answer.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn query(&self, argv: Vec<String>) -> Option<CommandOutput> {
        let mut runner = ProcessRunner::new().timeout(Some(self.timeout));
        match runner.run(&argv, &std::env::temp_dir()) {
            Ok(out) => Some(out),
            Err(e) => {
                tracing::debug!(command = %argv.join(" "), error = %e, "host query failed");
                None
            }
        }
    }

    /// First executable called `name` on the search path.
    pub fn find_executable(&self, name: &str) -> Option<PathBuf> {
        if name.contains('/') {
            return None;
        }
        let path = self.path.as_ref()?;
        std::env::split_paths(path)
            .map(|dir| dir.join(name))
            .find(|candidate| is_executable(candidate))
    }

    fn pkg_config_query(&self, args: &[&str], name: &str) -> Option<String> {
        if !self.pkg_config {
            return None;
        }
        let mut argv: Vec<String> = vec!["pkg-config".into()];
        argv.extend(args.iter().map(|a| a.to_string()));
        argv.push(name.to_string());
        let out = self.query(argv)?;
        (out.exit_code == 0).then(|| out.stdout_lossy().trim().to_string())
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// First dotted numeric token in a `--version` banner, e.g. "3.27.1" from
/// "cmake version 3.27.1".
pub fn extract_version(banner: &str) -> Option<String> {
    banner
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | '(' | ')'))
        .map(|word| word.trim_start_matches('v'))
        .find(|word| {
            word.contains('.')
                && word.split('.').all(|p| !p.is_empty())
                && word.split('.').next().is_some_and(|p| p.chars().all(|c| c.is_ascii_digit()))
        })
        .map(|word| {
            word.chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect::<String>()
                .trim_end_matches('.')
                .to_string()
        })
}

impl EnvironmentProbe for HostProbe {
    fn has(&self, name: &str) -> bool {
        self.find_executable(name).is_some()
            || self.pkg_config_query(&["--exists"], name).is_some()
    }

    fn version_of(&self, name: &str) -> Option<String> {
        if let Some(version) = self.pkg_config_query(&["--modversion"], name)
            && !version.is_empty()
        {
            return Some(version);
        }
        let exe = self.find_executable(name)?;
        let out = self.query(vec![exe.display().to_string(), "--version".into()])?;
        extract_version(&format!("{}\n{}", out.stdout_lossy(), out.stderr_lossy()))
    }
}

/// Fixed name to version table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticProbe {
    entries: BTreeMap<String, Option<String>>,
}

impl StaticProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry; `None` means present with unknown version.
    pub fn with(mut self, name: impl Into<String>, version: Option<&str>) -> Self {
        self.insert(name, version.map(str::to_string));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, version: Option<String>) {
        self.entries.insert(name.into(), version);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl EnvironmentProbe for StaticProbe {
    fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    fn version_of(&self, name: &str) -> Option<String> {
        self.entries.get(name).cloned().flatten()
    }
}

/// Asks each probe in turn; the first that has the name answers.
#[derive(Default)]
pub struct ProbeChain {
    probes: Vec<Box<dyn EnvironmentProbe>>,
}

impl ProbeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, probe: impl EnvironmentProbe + 'static) -> Self {
        self.probes.push(Box::new(probe));
        self
    }
}

impl EnvironmentProbe for ProbeChain {
    fn has(&self, name: &str) -> bool {
        self.probes.iter().any(|p| p.has(name))
    }

    fn version_of(&self, name: &str) -> Option<String> {
        self.probes
            .iter()
            .find(|p| p.has(name))
            .and_then(|p| p.version_of(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn install_tool(dir: &Path, name: &str, script: &str) {
        let path = dir.join(name);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_extract_version() {
        assert_eq!(extract_version("cmake version 3.27.1\n\nCMake suite"), Some("3.27.1".into()));
        assert_eq!(extract_version("Python 3.12.0"), Some("3.12.0".into()));
        assert_eq!(extract_version("v20.11.0"), Some("20.11.0".into()));
        assert_eq!(extract_version("git version 2.43.0.windows.1"), Some("2.43.0".into()));
        assert_eq!(extract_version("no numbers here"), None);
    }

    #[test]
    fn test_host_probe_path_lookup() {
        let dir = TempDir::new().unwrap();
        install_tool(dir.path(), "fakecmake", "#!/bin/sh\necho 'fakecmake version 3.28.0'\n");
        std::fs::write(dir.path().join("notexec"), "").unwrap();

        let probe = HostProbe::new().with_path(dir.path()).pkg_config(false);
        assert!(probe.has("fakecmake"));
        assert!(!probe.has("notexec"));
        assert!(!probe.has("missing-tool"));
        assert_eq!(probe.version_of("fakecmake"), Some("3.28.0".into()));
    }

    #[test]
    fn test_hanging_version_query_gives_up() {
        let dir = TempDir::new().unwrap();
        install_tool(dir.path(), "stuck", "#!/bin/sh\nexec sleep 30\n");

        let probe = HostProbe::new()
            .with_path(dir.path())
            .pkg_config(false)
            .timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        assert!(probe.has("stuck"));
        assert_eq!(probe.version_of("stuck"), None);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_static_probe() {
        let probe = StaticProbe::new().with("cmake", Some("3.27.1")).with("magnum", None);
        assert!(probe.has("magnum"));
        assert_eq!(probe.version_of("magnum"), None);
        assert_eq!(probe.version_of("cmake"), Some("3.27.1".into()));
        assert!(!probe.has("python"));
    }

    #[test]
    fn test_probe_chain_first_wins() {
        let chain = ProbeChain::new()
            .push(StaticProbe::new().with("python", Some("3.11")))
            .push(StaticProbe::new().with("python", Some("3.12")).with("node", Some("20.1.0")));
        assert_eq!(chain.version_of("python"), Some("3.11".into()));
        assert_eq!(chain.version_of("node"), Some("20.1.0".into()));
        assert!(!chain.has("ruby"));
    }
}
