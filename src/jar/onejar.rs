//! One-jar assembly.
//!
//! The output is a runnable jar whose `Main-Class` is a bootstrap loader from
//! the boot runtime jar. The application jar and its dependencies are nested
//! verbatim under `main/` and `lib/`; their non-class resources are also
//! exposed at the archive root so they can be found without the loader.
//!
//! Write order fixes conflict resolution: boot runtime, then the main jar,
//! then dependencies in listed order. The first writer of a path wins.

use anyhow::{Context, Result};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipWriter;

use super::{
    file_name, open_jar, read_entry, stored_options, write_entry, JarManifest, SeenPathSet,
    JAR_MANIFEST,
};
use crate::config::Settings;
use crate::error::ToolchainError;
use crate::generator::{require_args, Generator};
use crate::output;

/// Manifest attribute naming the real entry class for the bootstrap loader.
pub const ONE_JAR_MAIN_CLASS: &str = "One-Jar-Main-Class";

#[derive(Debug, Clone)]
pub struct JarMergeSpec {
    pub output: PathBuf,
    pub boot_jar: PathBuf,
    pub main_jar: Option<PathBuf>,
    pub deps: Vec<PathBuf>,
    pub main_class: String,
}

impl JarMergeSpec {
    /// Parse `<boot-jar> <main-class> <output> [<main-jar> <dep>...]`.
    pub fn from_args(args: &[String]) -> Result<Self> {
        require_args(
            "java_onejar",
            args,
            3,
            "<boot-jar> <main-class> <output> [<main-jar> <dep>...]",
        )?;
        if args[1].trim().is_empty() {
            return Err(ToolchainError::args("java_onejar", "empty main class").into());
        }
        Ok(Self {
            boot_jar: PathBuf::from(&args[0]),
            main_class: args[1].clone(),
            output: PathBuf::from(&args[2]),
            main_jar: args.get(3).map(PathBuf::from),
            deps: args.iter().skip(4).map(PathBuf::from).collect(),
        })
    }

    fn inner_jars(&self) -> impl Iterator<Item = &PathBuf> {
        self.main_jar.iter().chain(self.deps.iter())
    }
}

/// A class file stays inside its nested jar.
fn is_class_file(name: &str) -> bool {
    name.ends_with(".class")
}

fn is_meta_inf(name: &str) -> bool {
    name.to_ascii_uppercase().starts_with("META-INF")
}

fn is_manifest(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with("manifest.mf")
}

/// Build the one-jar and return the set of paths written.
pub fn build_one_jar(spec: &JarMergeSpec, settings: &Settings) -> Result<SeenPathSet> {
    let mut out = ZipWriter::new(Cursor::new(Vec::new()));
    let options = stored_options();
    let mut seen = SeenPathSet::new();

    // 1. Boot runtime, minus its manifest.
    let mut boot = open_jar(&spec.boot_jar)?;
    for i in 0..boot.len() {
        let (name, is_dir, data) = read_entry(&mut boot, i, &spec.boot_jar)?;
        if is_manifest(&name) {
            continue;
        }
        if seen.claim(&name, &spec.boot_jar).is_some() {
            continue;
        }
        write_entry(&mut out, &name, is_dir, &data, options)?;
    }

    // 2-3. Nested jars, unmodified.
    for (dir, jar) in spec
        .main_jar
        .iter()
        .map(|j| ("main", j))
        .chain(spec.deps.iter().map(|j| ("lib", j)))
    {
        let name = format!("{dir}/{}", file_name(jar)?);
        if let Some(first) = seen.claim(&name, jar) {
            return Err(ToolchainError::DuplicatePath {
                path: name,
                first: first.display().to_string(),
                second: jar.display().to_string(),
            }
            .into());
        }
        let bytes = fs::read(jar).with_context(|| format!("Failed to read {}", jar.display()))?;
        write_entry(&mut out, &name, false, &bytes, options)?;
    }

    // 4. Non-class resources at the root.
    for jar_path in spec.inner_jars() {
        let mut jar = open_jar(jar_path)?;
        for i in 0..jar.len() {
            let (name, is_dir, data) = read_entry(&mut jar, i, jar_path)?;
            if is_class_file(&name) || is_meta_inf(&name) {
                continue;
            }
            if let Some(first) = seen.claim(&name, jar_path) {
                if !is_dir {
                    debug!(
                        path = %name,
                        kept = %first.display(),
                        dropped = %jar_path.display(),
                        "resource already written"
                    );
                }
                continue;
            }
            write_entry(&mut out, &name, is_dir, &data, options)?;
        }
    }

    // 5. Manifest dispatching through the bootstrap loader.
    let manifest = JarManifest::new()
        .attr("Main-Class", &settings.onejar_boot_class)
        .attr(ONE_JAR_MAIN_CLASS, &spec.main_class)
        .render();
    seen.claim(JAR_MANIFEST, Path::new("<generated>"));
    write_entry(&mut out, JAR_MANIFEST, false, manifest.as_bytes(), options)?;

    let bytes = out.finish()?.into_inner();
    output::write_file(&spec.output, &bytes)?;
    Ok(seen)
}

pub struct OneJarGenerator;

impl Generator for OneJarGenerator {
    fn name(&self) -> &'static str {
        "java_onejar"
    }

    fn run(&self, args: &[String], settings: &Settings) -> Result<()> {
        let spec = JarMergeSpec::from_args(args)?;
        let seen = build_one_jar(&spec, settings)
            .with_context(|| format!("building one-jar {}", spec.output.display()))?;
        info!(
            output = %spec.output.display(),
            entries = seen.len(),
            main_class = %spec.main_class,
            "one-jar written"
        );
        Ok(())
    }
}
