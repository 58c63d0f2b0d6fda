//! Fat-jar assembly: every input jar unpacked into one archive.
//!
//! The first jar is the application jar. Entries are written in input order
//! and the first writer of a path wins. Per-jar manifests, signatures, and
//! license/readme boilerplate are dropped; a fresh manifest carries the
//! application jar's `Main-Class`.
//!
//! Diagnostics for one invocation go to `<name>__fatjar__.log` beside the
//! output when enabled in [`Settings`].

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};
use zip::ZipWriter;

use super::{
    deflated_options, file_name, open_jar, read_entry, write_entry, JarManifest, SeenPathSet,
    JAR_MANIFEST,
};
use crate::config::Settings;
use crate::generator::{require_args, Generator};
use crate::output;

const EXCLUDED_PREFIXES: &[&str] = &[
    "LICENSE",
    "README",
    "NOTICE",
    "META-INF/LICENSE",
    "META-INF/README",
    "META-INF/NOTICE",
    "META-INF/INDEX.LIST",
];

/// Conflicts from jars in a local maven repository are too common to report.
const MAVEN_REPOSITORY: &str = "/.m2/repository/";

#[derive(Debug, Clone)]
pub struct FatJarSpec {
    pub output: PathBuf,
    pub jars: Vec<PathBuf>,
    pub log_file: Option<PathBuf>,
}

impl FatJarSpec {
    /// Parse `<output> <jar>...`.
    pub fn from_args(args: &[String], settings: &Settings) -> Result<Self> {
        require_args("java_fatjar", args, 2, "<output> <jar>...")?;
        let output = PathBuf::from(&args[0]);
        let log_file = settings.fatjar_log.then(|| log_path(&output));
        Ok(Self {
            output,
            jars: args[1..].iter().map(PathBuf::from).collect(),
            log_file,
        })
    }
}

/// `out/app.fat.jar` logs to `out/app__fatjar__.log`.
pub fn log_path(output: &Path) -> PathBuf {
    let name = output.to_string_lossy().replace(".fat.jar", "__fatjar__");
    PathBuf::from(format!("{name}.log"))
}

/// Signature files sit directly under `META-INF/`.
fn is_signature_file(upper: &str) -> bool {
    match upper.split('/').collect::<Vec<_>>().as_slice() {
        ["META-INF", file] => {
            file.ends_with(".SF")
                || file.ends_with(".DSA")
                || file.ends_with(".RSA")
                || file.starts_with("SIG-")
        }
        _ => false,
    }
}

fn is_excluded(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    upper == JAR_MANIFEST
        || is_signature_file(&upper)
        || EXCLUDED_PREFIXES.iter().any(|p| upper.starts_with(p))
}

#[derive(Debug, Default)]
pub struct FatJarReport {
    pub entries: usize,
    /// Duplicate paths outside the local maven repository.
    pub conflicts: Vec<String>,
}

/// Merge `spec.jars` into `spec.output`.
pub fn build_fat_jar(spec: &FatJarSpec) -> Result<FatJarReport> {
    let mut out = ZipWriter::new(Cursor::new(Vec::new()));
    let options = deflated_options();
    let mut seen = SeenPathSet::new();
    let mut report = FatJarReport::default();

    for jar_path in &spec.jars {
        let mut jar = open_jar(jar_path)?;
        for i in 0..jar.len() {
            let (name, is_dir, data) = read_entry(&mut jar, i, jar_path)?;
            if !is_dir && is_excluded(&name) {
                continue;
            }
            match seen.claim(&name, jar_path) {
                None => write_entry(&mut out, &name, is_dir, &data, options)?,
                Some(_) if is_dir => {}
                Some(first) => {
                    let message = format!(
                        "{}: duplicate path {} found in {{{}, {}}}",
                        spec.output.display(),
                        name,
                        file_name(first)?,
                        file_name(jar_path)?
                    );
                    debug!("{message}");
                    if !jar_path.to_string_lossy().contains(MAVEN_REPOSITORY) {
                        report.conflicts.push(message);
                    }
                }
            }
        }
    }

    if !report.conflicts.is_empty() {
        warn!(
            "{}: found {} conflicts between jars",
            spec.output.display(),
            report.conflicts.len()
        );
    }

    let mut manifest = JarManifest::new().attr("Created-By", env!("CARGO_PKG_NAME"));
    if let Some(main_class) = spec.jars.first().map(|j| main_class_of(j)).transpose()?.flatten() {
        manifest = manifest.attr("Main-Class", &main_class);
    }
    write_entry(&mut out, JAR_MANIFEST, false, manifest.render().as_bytes(), options)?;
    report.entries = seen.len() + 1;

    let bytes = out.finish()?.into_inner();
    output::write_file(&spec.output, &bytes)?;
    Ok(report)
}

fn main_class_of(jar_path: &Path) -> Result<Option<String>> {
    let mut jar = open_jar(jar_path)?;
    let index = match jar.index_for_name(JAR_MANIFEST) {
        Some(i) => i,
        None => return Ok(None),
    };
    let (_, _, data) = read_entry(&mut jar, index, jar_path)?;
    Ok(JarManifest::lookup(&String::from_utf8_lossy(&data), "Main-Class"))
}

/// Run `f` with diagnostics routed to `log_file`.
fn with_log_file<T>(log_file: &Path, f: impl FnOnce() -> T) -> Result<T> {
    let file = File::create(log_file)
        .with_context(|| format!("Failed to create log file {}", log_file.display()))?;
    let subscriber = tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    Ok(tracing::subscriber::with_default(subscriber, f))
}

pub struct FatJarGenerator;

impl Generator for FatJarGenerator {
    fn name(&self) -> &'static str {
        "java_fatjar"
    }

    fn run(&self, args: &[String], settings: &Settings) -> Result<()> {
        let spec = FatJarSpec::from_args(args, settings)?;
        let report = match &spec.log_file {
            Some(log) => with_log_file(log, || build_fat_jar(&spec))??,
            None => build_fat_jar(&spec)?,
        };
        info!(
            output = %spec.output.display(),
            entries = report.entries,
            conflicts = report.conflicts.len(),
            "fat jar written"
        );
        Ok(())
    }
}
