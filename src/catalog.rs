//! Finding recipe files on disk.
//!
//! A recipe id is either a path to a `.recipe` file or a bare name looked up
//! as `<recipes_path>/<name>.recipe` or `<recipes_path>/<name>/<name>.recipe`.

use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

pub const EXTENSION: &str = "recipe";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CatalogError {
    #[error("invalid recipe name '{0}': only letters, digits, '_', '-', '+' and '.' are allowed")]
    InvalidName(String),
    #[error("recipe file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("recipe not found: {name}\nSearched in: {}", searched.display())]
    NotFound { name: String, searched: PathBuf },
}

/// Reject names that could escape the recipes directory.
fn validate_name(name: &str) -> Result<(), CatalogError> {
    let ok = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '+' | '.'));
    if ok {
        Ok(())
    } else {
        Err(CatalogError::InvalidName(name.to_string()))
    }
}

/// Resolve a recipe id to a file.
pub fn resolve(id: &str, recipes_path: &Path) -> Result<PathBuf, CatalogError> {
    let is_explicit_path = id.contains('/') || id.contains('\\') || id.ends_with(".recipe");
    if is_explicit_path {
        let path = PathBuf::from(id);
        return if path.is_file() {
            Ok(path)
        } else {
            Err(CatalogError::FileNotFound(path))
        };
    }

    validate_name(id)?;

    let flat = recipes_path.join(format!("{}.{}", id, EXTENSION));
    if flat.is_file() {
        return Ok(flat);
    }
    let nested = recipes_path.join(id).join(format!("{}.{}", id, EXTENSION));
    if nested.is_file() {
        return Ok(nested);
    }

    Err(CatalogError::NotFound {
        name: id.to_string(),
        searched: recipes_path.to_path_buf(),
    })
}

/// Every `.recipe` file under `recipes_path` (two levels deep), sorted.
pub fn discover(recipes_path: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(recipes_path)
        .max_depth(2)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|e| e == EXTENSION))
        .collect();
    found.sort();
    found
}
