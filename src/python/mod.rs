//! Python library manifests and self-executing python archives.
//!
//! `python_library` records a library's sources and their content hashes in
//! a JSON [`LibraryManifest`]. `python_binary` merges those manifests into
//! one zip, fills in missing `__init__.py` markers, and prepends a shell
//! bootstrap so the file runs directly.

pub mod binary;
pub mod library;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path};

use crate::error::ToolchainError;

pub use binary::{BinaryGenerator, PythonArchiveSpec};
pub use library::LibraryGenerator;

/// Name of the package marker file.
pub const PACKAGE_MARKER: &str = "__init__.py";

/// Sources of one python library, as staged by `python_library`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryManifest {
    /// Directory the archive paths are relative to. Empty means the
    /// working directory.
    pub base_dir: String,
    /// `(path, content hash)` per source, in input order.
    pub srcs: Vec<(String, String)>,
}

impl LibraryManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse library manifest {}", path.display()))
    }

    pub fn to_json(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }
}

/// Path of `path` inside the archive, relative to `base`.
///
/// An empty `base` means the working directory.
pub fn archive_name(path: &Path, base: &Path) -> Result<String> {
    let rel = if base.as_os_str().is_empty() {
        if path.is_absolute() {
            let cwd = std::env::current_dir().context("resolving current directory")?;
            path.strip_prefix(&cwd).map(Path::to_path_buf)
        } else {
            Ok(path.to_path_buf())
        }
    } else {
        path.strip_prefix(base).map(Path::to_path_buf)
    }
    .map_err(|_| {
        ToolchainError::args(
            "python_binary",
            format!("{} is not under {}", path.display(), base.display()),
        )
    })?;

    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(p) => parts.push(p.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => {
                return Err(ToolchainError::args(
                    "python_binary",
                    format!("{} escapes its base directory", path.display()),
                )
                .into())
            }
        }
    }
    if parts.is_empty() {
        return Err(
            ToolchainError::args("python_binary", format!("{} names no file", path.display()))
                .into(),
        );
    }
    Ok(parts.join("/"))
}
