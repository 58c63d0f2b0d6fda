//! Library jar assembly from an optional classes jar plus resources.
//!
//! Resources are staged under `<output>.resources/` (the `.jar` suffix
//! replaced) and stored at their path relative to that directory. A resource
//! replaces a classes-jar entry of the same name.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::info;
use zip::ZipWriter;

use super::{deflated_options, open_jar, read_entry, write_entry, JarManifest, JAR_MANIFEST};
use crate::config::Settings;
use crate::error::ToolchainError;
use crate::generator::{require_args, Generator};
use crate::output;

const CLASSES_JAR_SUFFIX: &str = "__classes__.jar";

#[derive(Debug, Clone)]
pub struct JarSpec {
    pub output: PathBuf,
    pub classes_jar: Option<PathBuf>,
    pub resources_dir: PathBuf,
    pub resources: Vec<PathBuf>,
}

impl JarSpec {
    /// Parse `<jar-tool> <output> [<classes-jar>] <resource>...`.
    ///
    /// The jar tool is accepted for compatibility; archiving is done here.
    pub fn from_args(args: &[String]) -> Result<Self> {
        require_args(
            "java_jar",
            args,
            3,
            "<jar-tool> <output> [<x__classes__.jar>] <resource>...",
        )?;
        let output = PathBuf::from(&args[1]);
        let (classes_jar, resources) = if args[2].ends_with(CLASSES_JAR_SUFFIX) {
            (Some(PathBuf::from(&args[2])), &args[3..])
        } else {
            (None, &args[2..])
        };
        Ok(Self {
            resources_dir: resources_dir(&output),
            output,
            classes_jar,
            resources: resources.iter().map(PathBuf::from).collect(),
        })
    }
}

/// `out/lib.jar` stages resources in `out/lib.resources`.
pub fn resources_dir(output: &Path) -> PathBuf {
    let name = output.to_string_lossy();
    let base = name.strip_suffix(".jar").unwrap_or(&name);
    PathBuf::from(format!("{base}.resources"))
}

fn resource_name(resources_dir: &Path, resource: &Path) -> Result<String> {
    let rel = resource.strip_prefix(resources_dir).map_err(|_| {
        ToolchainError::args(
            "java_jar",
            format!(
                "resource {} is not under {}",
                resource.display(),
                resources_dir.display()
            ),
        )
    })?;
    Ok(rel.to_string_lossy().replace('\\', "/"))
}

pub fn build_jar(spec: &JarSpec) -> Result<usize> {
    let mut out = ZipWriter::new(Cursor::new(Vec::new()));
    let options = deflated_options();

    let resources = spec
        .resources
        .iter()
        .map(|r| Ok((resource_name(&spec.resources_dir, r)?, r)))
        .collect::<Result<Vec<_>>>()?;
    let overridden: HashSet<&str> = resources.iter().map(|(n, _)| n.as_str()).collect();
    let mut written = 0;

    match &spec.classes_jar {
        Some(classes) => {
            let mut jar = open_jar(classes)?;
            for i in 0..jar.len() {
                let (name, is_dir, data) = read_entry(&mut jar, i, classes)?;
                if overridden.contains(name.as_str()) {
                    continue;
                }
                write_entry(&mut out, &name, is_dir, &data, options)?;
                written += 1;
            }
        }
        None => {
            let manifest = JarManifest::new()
                .attr("Created-By", env!("CARGO_PKG_NAME"))
                .render();
            write_entry(&mut out, JAR_MANIFEST, false, manifest.as_bytes(), options)?;
            written += 1;
        }
    }

    for (name, path) in &resources {
        let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        write_entry(&mut out, name, false, &data, options)?;
        written += 1;
    }

    let bytes = out.finish()?.into_inner();
    output::write_file(&spec.output, &bytes)?;
    Ok(written)
}

pub struct JarGenerator;

impl Generator for JarGenerator {
    fn name(&self) -> &'static str {
        "java_jar"
    }

    fn run(&self, args: &[String], _settings: &Settings) -> Result<()> {
        let spec = JarSpec::from_args(args)?;
        let entries =
            build_jar(&spec).with_context(|| format!("building jar {}", spec.output.display()))?;
        info!(output = %spec.output.display(), entries, "jar written");
        Ok(())
    }
}
