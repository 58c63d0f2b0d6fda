//! Generic archive packaging with a content manifest.
//!
//! A package is described by an [`ArchivePlan`]: an output path whose suffix
//! selects the format, and ordered `(source, destination)` pairs.
//!
//! - Zip packages are deflated and carry `MANIFEST.TXT` as their last entry.
//! - Tar packages (plain, gzip, bzip2, zstd) dereference symlinks, write the
//!   manifest to an `<archive>.MANIFEST` sidecar, and add that sidecar to the
//!   archive as `MANIFEST.TXT`.
//!
//! Wire arguments: `<output> <src>... <dst>...` where sources and
//! destinations split the remainder evenly.

mod writer;

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

use crate::config::Settings;
use crate::error::ToolchainError;
use crate::generator::{split_halves, Generator};
use crate::manifest::{Manifest, MANIFEST_ENTRY};

pub use writer::{sidecar_path, write_package};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
    TarBz2,
    TarZst,
}

/// Recognized output suffixes. Longer suffixes first so `.tar.gz` is not
/// mistaken for something shorter.
const SUFFIXES: &[(&str, ArchiveFormat)] = &[
    (".tar.gz", ArchiveFormat::TarGz),
    (".tar.bz2", ArchiveFormat::TarBz2),
    (".tar.zst", ArchiveFormat::TarZst),
    (".tgz", ArchiveFormat::TarGz),
    (".tbz", ArchiveFormat::TarBz2),
    (".tzst", ArchiveFormat::TarZst),
    (".tar", ArchiveFormat::Tar),
    (".zip", ArchiveFormat::Zip),
];

impl ArchiveFormat {
    /// Select the format from the output path suffix.
    pub fn from_path(path: &Path) -> Result<Self, ToolchainError> {
        let name = path.to_string_lossy();
        SUFFIXES
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix))
            .map(|(_, format)| *format)
            .ok_or_else(|| ToolchainError::UnknownSuffix(name.into_owned()))
    }

    pub fn is_tar(self) -> bool {
        !matches!(self, ArchiveFormat::Zip)
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveFormat::Zip => write!(f, "zip"),
            ArchiveFormat::Tar => write!(f, "tar"),
            ArchiveFormat::TarGz => write!(f, "tar.gz"),
            ArchiveFormat::TarBz2 => write!(f, "tar.bz2"),
            ArchiveFormat::TarZst => write!(f, "tar.zst"),
        }
    }
}

/// One file to archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub source: PathBuf,
    pub dest: String,
}

#[derive(Debug, Clone)]
pub struct ArchivePlan {
    pub output: PathBuf,
    pub format: ArchiveFormat,
    pub entries: Vec<PlanEntry>,
}

impl ArchivePlan {
    /// Build a plan from `(source, destination)` pairs.
    ///
    /// Directory sources are expanded into their files (following symlinks)
    /// under the destination prefix. Destinations must be relative, free of
    /// `..`, and unique within the plan, `MANIFEST.TXT` included.
    pub fn new(output: &Path, pairs: &[(PathBuf, String)]) -> Result<Self> {
        let format = ArchiveFormat::from_path(output)?;
        let mut entries = Vec::new();
        for (source, dest) in pairs {
            let dest = normalize_dest(dest)?;
            if source.is_dir() {
                expand_dir(source, &dest, &mut entries)?;
            } else {
                entries.push(PlanEntry {
                    source: source.clone(),
                    dest,
                });
            }
        }

        let mut seen: HashMap<&str, &Path> = HashMap::new();
        seen.insert(MANIFEST_ENTRY, Path::new("<manifest>"));
        for entry in &entries {
            if let Some(first) = seen.insert(entry.dest.as_str(), entry.source.as_path()) {
                return Err(ToolchainError::DuplicatePath {
                    path: entry.dest.clone(),
                    first: first.display().to_string(),
                    second: entry.source.display().to_string(),
                }
                .into());
            }
        }

        Ok(Self {
            output: output.to_path_buf(),
            format,
            entries,
        })
    }

    /// Parse `<output> <src>... <dst>...`.
    pub fn from_args(args: &[String]) -> Result<Self> {
        let (output, rest) = args
            .split_first()
            .ok_or_else(|| ToolchainError::args("package", "missing output path"))?;
        let (sources, dests) = split_halves("package", rest)?;
        let pairs: Vec<(PathBuf, String)> = sources
            .iter()
            .zip(dests)
            .map(|(s, d)| (PathBuf::from(s), d.clone()))
            .collect();
        Self::new(Path::new(output), &pairs)
    }
}

fn normalize_dest(raw: &str) -> Result<String> {
    let path = Path::new(raw);
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(p) => parts.push(p.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => {
                return Err(ToolchainError::args(
                    "package",
                    format!("destination must be a relative path without '..': '{raw}'"),
                )
                .into())
            }
        }
    }
    if parts.is_empty() {
        return Err(ToolchainError::args("package", format!("empty destination '{raw}'")).into());
    }
    Ok(parts.join("/"))
}

fn expand_dir(dir: &Path, dest: &str, entries: &mut Vec<PlanEntry>) -> Result<()> {
    for ent in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let ent = ent.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if !ent.file_type().is_file() {
            continue;
        }
        let rel = ent
            .path()
            .strip_prefix(dir)
            .unwrap_or(ent.path())
            .to_string_lossy()
            .replace('\\', "/");
        entries.push(PlanEntry {
            source: ent.path().to_path_buf(),
            dest: format!("{dest}/{rel}"),
        });
    }
    Ok(())
}

pub struct PackageGenerator;

impl Generator for PackageGenerator {
    fn name(&self) -> &'static str {
        "package"
    }

    fn run(&self, args: &[String], settings: &Settings) -> Result<()> {
        let plan = ArchivePlan::from_args(args)?;
        let manifest: Manifest = write_package(&plan, settings)
            .with_context(|| format!("packaging {}", plan.output.display()))?;
        info!(
            output = %plan.output.display(),
            format = %plan.format,
            entries = manifest.len(),
            "package written"
        );
        Ok(())
    }
}
