//! Self-executing python archive.
//!
//! Built in two phases: the zip is assembled completely in memory, then the
//! output file is written as the bootstrap script followed by the untouched
//! zip bytes. Zip readers locate the central directory from the end of the
//! file, so the prefix does not disturb them.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use super::{archive_name, LibraryManifest, PACKAGE_MARKER};
use crate::config::Settings;
use crate::generator::{base_dir_arg, require_args, Generator};
use crate::jar::SeenPathSet;
use crate::output::{OutputFile, EXECUTABLE_MODE};

#[derive(Debug, Clone)]
pub struct PythonArchiveSpec {
    /// Base directory of the binary target itself. Archive paths always come
    /// from each library's own base directory; this is only logged.
    pub base_dir: String,
    /// Module run with `python -m`.
    pub main_entry: String,
    pub output: PathBuf,
    pub libraries: Vec<PathBuf>,
}

impl PythonArchiveSpec {
    /// Parse `<base-dir|__pythonbasedir__> <main-entry> <output> <pylib>...`.
    pub fn from_args(args: &[String]) -> Result<Self> {
        require_args(
            "python_binary",
            args,
            3,
            "<base-dir> <main-entry> <output> <pylib>...",
        )?;
        Ok(Self {
            base_dir: base_dir_arg(&args[0]).to_string(),
            main_entry: args[1].clone(),
            output: PathBuf::from(&args[2]),
            libraries: args[3..].iter().map(PathBuf::from).collect(),
        })
    }
}

/// Directory prefixes seen while copying, and which already hold a marker.
#[derive(Debug, Default)]
struct PackageDirs {
    dirs: BTreeSet<String>,
    with_marker: BTreeSet<String>,
}

impl PackageDirs {
    fn record(&mut self, name: &str) {
        let (mut dir, file) = match name.rsplit_once('/') {
            Some((dir, file)) => (dir, file),
            None => ("", name),
        };
        if file == PACKAGE_MARKER {
            self.with_marker.insert(dir.to_string());
        }
        while !dir.is_empty() {
            self.dirs.insert(dir.to_string());
            dir = dir.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("");
        }
    }

    /// Directories still lacking a marker, sorted.
    fn missing(&self) -> impl Iterator<Item = &String> {
        self.dirs.difference(&self.with_marker)
    }
}

fn options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
}

/// Assemble the archive portion of a python binary.
pub fn build_archive(spec: &PythonArchiveSpec) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut written = SeenPathSet::new();
    let mut dirs = PackageDirs::default();
    debug!(base_dir = %spec.base_dir, libraries = spec.libraries.len(), "assembling python archive");

    for lib_path in &spec.libraries {
        let lib = LibraryManifest::load(lib_path)?;
        for (src, _hash) in &lib.srcs {
            let src = Path::new(src);
            let name = archive_name(src, Path::new(&lib.base_dir))?;
            if let Some(first) = written.claim(&name, lib_path) {
                warn!(
                    path = %name,
                    kept = %first.display(),
                    dropped = %lib_path.display(),
                    "duplicate archive path dropped"
                );
                continue;
            }
            dirs.record(&name);
            let data = fs::read(src).with_context(|| format!("Failed to read {}", src.display()))?;
            zip.start_file(name.as_str(), options())?;
            zip.write_all(&data)?;
        }
    }

    for dir in dirs.missing() {
        zip.start_file(format!("{dir}/{PACKAGE_MARKER}"), options())?;
    }
    if !written.contains(PACKAGE_MARKER) {
        zip.start_file(PACKAGE_MARKER, options())?;
    }

    Ok(zip.finish()?.into_inner())
}

/// Shell header that runs `main_entry` from the archive itself.
pub fn bootstrap(main_entry: &str, python: &str) -> String {
    format!(
        "#!/bin/sh\n\nPYTHONPATH=\"$0:$PYTHONPATH\" exec {python} -m \"{main_entry}\" \"$@\"\n"
    )
}

/// Write the executable archive; returns the bootstrap length.
pub fn build_python_binary(spec: &PythonArchiveSpec, settings: &Settings) -> Result<usize> {
    let archive = build_archive(spec)?;
    let header = bootstrap(&spec.main_entry, &settings.python);

    let mut out = OutputFile::create(&spec.output)?.with_mode(EXECUTABLE_MODE);
    out.write_all(header.as_bytes())
        .and_then(|()| out.write_all(&archive))
        .with_context(|| format!("Failed to write {}", spec.output.display()))?;
    out.commit()?;
    Ok(header.len())
}

pub struct BinaryGenerator;

impl Generator for BinaryGenerator {
    fn name(&self) -> &'static str {
        "python_binary"
    }

    fn run(&self, args: &[String], settings: &Settings) -> Result<()> {
        let spec = PythonArchiveSpec::from_args(args)?;
        build_python_binary(&spec, settings)
            .with_context(|| format!("building python binary {}", spec.output.display()))?;
        info!(output = %spec.output.display(), main = %spec.main_entry, "python binary written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::hash_bytes;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn write_library(dir: &Path, base: &Path, files: &[(&str, &[u8])]) -> PathBuf {
        let mut srcs = Vec::new();
        for (rel, data) in files {
            let path = base.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, data).unwrap();
            srcs.push((path.to_string_lossy().into_owned(), hash_bytes(data)));
        }
        let manifest = LibraryManifest {
            base_dir: base.to_string_lossy().into_owned(),
            srcs,
        };
        let name = format!("{}.pylib", base.file_name().unwrap().to_string_lossy());
        let out = dir.join(name);
        fs::write(&out, manifest.to_json().unwrap()).unwrap();
        out
    }

    fn two_library_spec(temp: &TempDir) -> PythonArchiveSpec {
        let a = write_library(temp.path(), &temp.path().join("a"), &[("pkg/mod.py", b"A = 1\n")]);
        let b = write_library(temp.path(), &temp.path().join("b"), &[("pkg/mod.py", b"B = 1\n")]);
        PythonArchiveSpec {
            base_dir: String::new(),
            main_entry: "pkg.mod".to_string(),
            output: temp.path().join("app.par"),
            libraries: vec![a, b],
        }
    }

    fn names(archive: &[u8]) -> Vec<String> {
        let zip = ZipArchive::new(Cursor::new(archive)).unwrap();
        let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    #[test]
    fn markers_are_synthesized_once() {
        let temp = TempDir::new().unwrap();
        let spec = two_library_spec(&temp);

        let archive = build_archive(&spec).unwrap();

        assert_eq!(names(&archive), ["__init__.py", "pkg/__init__.py", "pkg/mod.py"]);
        let mut zip = ZipArchive::new(Cursor::new(&archive)).unwrap();
        let mut text = String::new();
        zip.by_name("pkg/mod.py").unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "A = 1\n");
    }

    #[test]
    fn existing_markers_are_kept() {
        let temp = TempDir::new().unwrap();
        let lib = write_library(
            temp.path(),
            &temp.path().join("src"),
            &[
                ("__init__.py", b""),
                ("top/__init__.py", b"VERSION = 2\n"),
                ("top/sub/leaf.py", b""),
            ],
        );
        let spec = PythonArchiveSpec {
            base_dir: String::new(),
            main_entry: "top.sub.leaf".to_string(),
            output: temp.path().join("out.par"),
            libraries: vec![lib],
        };

        let archive = build_archive(&spec).unwrap();
        assert_eq!(
            names(&archive),
            [
                "__init__.py",
                "top/__init__.py",
                "top/sub/__init__.py",
                "top/sub/leaf.py"
            ]
        );
        let mut zip = ZipArchive::new(Cursor::new(&archive)).unwrap();
        let mut text = String::new();
        zip.by_name("top/__init__.py").unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "VERSION = 2\n");
    }

    #[test]
    fn output_is_bootstrap_then_untouched_archive() {
        let temp = TempDir::new().unwrap();
        let spec = two_library_spec(&temp);

        let header_len = build_python_binary(&spec, &Settings::default()).unwrap();
        let bytes = fs::read(&spec.output).unwrap();

        let header = bootstrap("pkg.mod", "python");
        assert_eq!(header_len, header.len());
        assert!(bytes.starts_with(b"#!/bin/sh\n"));
        assert_eq!(&bytes[..header_len], header.as_bytes());
        assert_eq!(&bytes[header_len..], build_archive(&spec).unwrap().as_slice());
    }

    #[test]
    fn libraries_keep_their_own_base_dirs() {
        let temp = TempDir::new().unwrap();
        let a = write_library(temp.path(), &temp.path().join("a"), &[("apkg/mod.py", b"")]);
        let b = write_library(temp.path(), &temp.path().join("b"), &[("bpkg/mod.py", b"")]);
        let spec = PythonArchiveSpec {
            base_dir: temp.path().join("a").to_string_lossy().into_owned(),
            main_entry: "apkg.mod".to_string(),
            output: temp.path().join("app.par"),
            libraries: vec![a, b],
        };

        let archive = build_archive(&spec).unwrap();

        assert_eq!(
            names(&archive),
            [
                "__init__.py",
                "apkg/__init__.py",
                "apkg/mod.py",
                "bpkg/__init__.py",
                "bpkg/mod.py"
            ]
        );
    }

    #[test]
    fn whole_output_reads_as_a_zip() {
        let temp = TempDir::new().unwrap();
        let spec = two_library_spec(&temp);
        build_python_binary(&spec, &Settings::default()).unwrap();

        let mut zip = ZipArchive::new(fs::File::open(&spec.output).unwrap()).unwrap();
        let mut text = String::new();
        zip.by_name("pkg/mod.py").unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "A = 1\n");
        assert!(zip.by_name(PACKAGE_MARKER).is_ok());
    }

    #[test]
    fn rebuild_is_byte_identical() {
        let temp = TempDir::new().unwrap();
        let spec = two_library_spec(&temp);

        build_python_binary(&spec, &Settings::default()).unwrap();
        let first = fs::read(&spec.output).unwrap();
        build_python_binary(&spec, &Settings::default()).unwrap();
        assert_eq!(first, fs::read(&spec.output).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn output_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let spec = two_library_spec(&temp);
        build_python_binary(&spec, &Settings::default()).unwrap();

        let mode = fs::metadata(&spec.output).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn bootstrap_uses_configured_interpreter() {
        assert_eq!(
            bootstrap("app.main", "python3"),
            "#!/bin/sh\n\nPYTHONPATH=\"$0:$PYTHONPATH\" exec python3 -m \"app.main\" \"$@\"\n"
        );
    }

    #[test]
    fn package_dirs_track_every_prefix() {
        let mut dirs = PackageDirs::default();
        dirs.record("a/b/c/mod.py");
        dirs.record("a/__init__.py");
        let missing: Vec<_> = dirs.missing().cloned().collect();
        assert_eq!(missing, ["a/b", "a/b/c"]);
    }
}
