//! Source fetching: archive download + checksum, or a shallow git checkout.
//!
//! Downloads, extraction and clones are external commands issued through the
//! same [`Runner`] as the install steps, so dry runs and tests see them too.
//! Only checksum verification happens in-process.

use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::executor::runner::display_command;
use crate::executor::{Context, Runner};
use crate::recipe::{Checksum, HashAlgorithm, Source, SourceKind};

/// Chunk size for reading files during hashing (1MB)
const CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("{command} failed: {reason}{}", indented(stderr))]
    Command {
        command: String,
        reason: String,
        stderr: String,
    },
    #[error(
        "{algorithm} mismatch for {}\n  expected: {expected}\n  got:      {actual}",
        path.display()
    )]
    ChecksumMismatch {
        path: PathBuf,
        algorithm: HashAlgorithm,
        expected: String,
        actual: String,
    },
    #[error("unsupported source URL scheme: {0} (use https://, http://, ssh://, git:// or git@)")]
    UnsupportedScheme(String),
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn indented(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!("\n    {}", stderr.replace('\n', "\n    "))
    }
}

/// Extract filename from a URL.
pub fn url_filename(url: &str) -> String {
    let name = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    if name.is_empty() {
        "download".to_string()
    } else {
        name.to_string()
    }
}

fn validate_url(kind: SourceKind, url: &str) -> Result<(), FetchError> {
    let ok = match kind {
        SourceKind::Archive => url.starts_with("https://") || url.starts_with("http://"),
        SourceKind::Head => ["https://", "http://", "ssh://", "git://", "git@"]
            .iter()
            .any(|scheme| url.starts_with(scheme)),
    };
    if ok {
        Ok(())
    } else {
        Err(FetchError::UnsupportedScheme(url.to_string()))
    }
}

/// Hex digest of a file.
pub fn file_digest(path: &Path, algorithm: HashAlgorithm) -> Result<String, FetchError> {
    let mut f = std::fs::File::open(path).map_err(io_error(path))?;
    match algorithm {
        HashAlgorithm::Sha256 => hash_reader::<sha2::Sha256>(&mut f).map_err(io_error(path)),
        HashAlgorithm::Sha512 => hash_reader::<sha2::Sha512>(&mut f).map_err(io_error(path)),
    }
}

fn hash_reader<D: sha2::Digest>(reader: &mut impl Read) -> std::io::Result<String> {
    let mut hasher = D::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compare a file against its declared checksum.
pub fn verify_checksum(path: &Path, checksum: &Checksum) -> Result<(), FetchError> {
    let actual = file_digest(path, checksum.algorithm)?;
    if actual != checksum.digest {
        return Err(FetchError::ChecksumMismatch {
            path: path.to_path_buf(),
            algorithm: checksum.algorithm,
            expected: checksum.digest.clone(),
            actual,
        });
    }
    Ok(())
}

fn run(runner: &mut dyn Runner, argv: Vec<String>, cwd: &Path) -> Result<(), FetchError> {
    let command = display_command(&argv);
    tracing::debug!(command = %command, cwd = %cwd.display(), "fetch");
    match runner.run(&argv, cwd) {
        Ok(out) if out.exit_code == 0 => Ok(()),
        Ok(out) => Err(FetchError::Command {
            command,
            reason: format!("exit code {}", out.exit_code),
            stderr: out.stderr_lossy(),
        }),
        Err(e) => Err(FetchError::Command {
            command,
            reason: e.to_string(),
            stderr: String::new(),
        }),
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> FetchError + '_ {
    move |source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Obtain the source tree of formula `name` and return its path.
///
/// Everything happens inside `ctx.work_dir(name)`; the tree lands in
/// `ctx.source_dir_for(name)`, which is emptied first. Other formulas
/// sharing the build directory are never touched.
pub fn fetch(
    name: &str,
    source: &Source,
    ctx: &Context,
    runner: &mut dyn Runner,
) -> Result<PathBuf, FetchError> {
    validate_url(source.kind, &source.location)?;
    let work = ctx.work_dir(name);
    let source_dir = ctx.source_dir_for(name);
    let src = source_dir.display().to_string();

    if !ctx.dry_run {
        if source_dir.exists() {
            tracing::debug!(dir = %src, "removing previous source tree");
            std::fs::remove_dir_all(&source_dir).map_err(io_error(&source_dir))?;
        }
        std::fs::create_dir_all(&work).map_err(io_error(&work))?;
    }

    match source.kind {
        SourceKind::Archive => {
            let archive = work.join(url_filename(&source.location));
            let archive_str = archive.display().to_string();

            let download = vec![
                "curl".into(),
                "-fsSL".into(),
                "-o".into(),
                archive_str.clone(),
                source.location.clone(),
            ];
            run(runner, download, &work)?;

            match (&source.checksum, ctx.dry_run) {
                (Some(checksum), false) => {
                    verify_checksum(&archive, checksum)?;
                    tracing::info!(archive = %archive_str, "{} verified", checksum.algorithm);
                }
                (Some(_), true) => tracing::debug!("dry run: checksum verification skipped"),
                (None, _) => tracing::warn!(archive = %archive_str, "no checksum to verify"),
            }

            run(runner, vec!["mkdir".into(), "-p".into(), src.clone()], &work)?;
            let extract = vec![
                "tar".into(),
                "xf".into(),
                archive_str,
                "-C".into(),
                src,
                "--strip-components=1".into(),
            ];
            run(runner, extract, &work)?;
        }
        SourceKind::Head => {
            let mut argv: Vec<String> =
                vec!["git".into(), "clone".into(), "--depth".into(), "1".into()];
            if let Some(branch) = &source.branch {
                argv.push("--branch".into());
                argv.push(branch.clone());
            }
            argv.push(source.location.clone());
            argv.push(src);
            run(runner, argv, &work)?;
        }
    }

    Ok(source_dir)
}
