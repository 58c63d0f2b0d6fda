use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use super::LibraryManifest;
use crate::config::Settings;
use crate::generator::{base_dir_arg, require_args, Generator};
use crate::manifest::hash_file;
use crate::output;

#[derive(Debug, Clone)]
pub struct LibrarySpec {
    pub base_dir: String,
    pub output: PathBuf,
    pub sources: Vec<PathBuf>,
}

impl LibrarySpec {
    /// Parse `<base-dir|__pythonbasedir__> <output> <src>...`.
    pub fn from_args(args: &[String]) -> Result<Self> {
        require_args("python_library", args, 2, "<base-dir> <output> <src>...")?;
        Ok(Self {
            base_dir: base_dir_arg(&args[0]).to_string(),
            output: PathBuf::from(&args[1]),
            sources: args[2..].iter().map(PathBuf::from).collect(),
        })
    }
}

pub fn build_library_manifest(spec: &LibrarySpec) -> Result<LibraryManifest> {
    let srcs = spec
        .sources
        .iter()
        .map(|src| Ok((src.to_string_lossy().into_owned(), hash_file(src)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(LibraryManifest {
        base_dir: spec.base_dir.clone(),
        srcs,
    })
}

pub struct LibraryGenerator;

impl Generator for LibraryGenerator {
    fn name(&self) -> &'static str {
        "python_library"
    }

    fn run(&self, args: &[String], _settings: &Settings) -> Result<()> {
        let spec = LibrarySpec::from_args(args)?;
        let manifest = build_library_manifest(&spec)
            .with_context(|| format!("staging python library {}", spec.output.display()))?;
        output::write_file(&spec.output, manifest.to_json()?.as_bytes())?;
        info!(output = %spec.output.display(), sources = manifest.srcs.len(), "python library staged");
        Ok(())
    }
}
