//! Top-level error type and its process exit codes.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::core::lock::LockError;
use crate::executor::{ExecuteError, StepFailure};
use crate::fetch::FetchError;
use crate::gate::MissingDependencies;
use crate::recipe::RecipeError;

pub mod exit {
    pub const OK: i32 = 0;
    pub const OTHER: i32 = 1;
    /// Parse, validation, template or configuration error.
    pub const INVALID: i32 = 2;
    pub const MISSING_DEPENDENCY: i32 = 3;
    pub const STEP_FAILED: i32 = 4;
    pub const FETCH_FAILED: i32 = 5;
    pub const POST_INSTALL: i32 = 6;
    pub const LOCKED: i32 = 7;
    /// Internal software error (sysexits `EX_SOFTWARE`).
    pub const DIRECTORY_SCOPE: i32 = 70;
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Recipe(#[from] RecipeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    MissingDependencies(#[from] MissingDependencies),

    #[error("post-install check failed: {0}")]
    PostInstall(MissingDependencies),

    #[error(transparent)]
    Step(#[from] StepFailure),

    #[error(transparent)]
    Execute(#[from] ExecuteError),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Recipe(_) | Self::Config(_) | Self::Catalog(_) => exit::INVALID,
            Self::MissingDependencies(_) => exit::MISSING_DEPENDENCY,
            Self::PostInstall(_) => exit::POST_INSTALL,
            Self::Step(_) => exit::STEP_FAILED,
            Self::Execute(ExecuteError::DirectoryScope(_)) => exit::DIRECTORY_SCOPE,
            Self::Execute(_) => exit::INVALID,
            Self::Fetch(_) => exit::FETCH_FAILED,
            Self::Lock(LockError::Held { .. }) => exit::LOCKED,
            Self::Lock(_) | Self::Io { .. } => exit::OTHER,
        }
    }
}
