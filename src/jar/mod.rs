//! Java archive assembly.
//!
//! - [`onejar`] - a boot-runtime one-jar with nested main/dependency jars
//! - [`fatjar`] - every input jar unpacked into one archive
//! - [`plain`] - a library jar from a classes jar plus resources
//!
//! All merges are first-writer-wins over a [`SeenPathSet`] scoped to one
//! invocation.

pub mod fatjar;
pub mod onejar;
pub mod plain;

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

pub use fatjar::FatJarGenerator;
pub use onejar::OneJarGenerator;
pub use plain::JarGenerator;

/// Path of the manifest inside a jar.
pub const JAR_MANIFEST: &str = "META-INF/MANIFEST.MF";

/// Archive paths already written during one merge, with the jar that
/// supplied each.
#[derive(Debug, Default)]
pub struct SeenPathSet {
    paths: HashMap<String, PathBuf>,
}

impl SeenPathSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` for `origin`. Returns the earlier owner if the path was
    /// already written.
    pub fn claim(&mut self, name: &str, origin: &Path) -> Option<&Path> {
        if self.paths.contains_key(name) {
            return self.paths.get(name).map(PathBuf::as_path);
        }
        self.paths.insert(name.to_string(), origin.to_path_buf());
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.paths.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Ordered manifest attributes, rendered with the trailing blank line the
/// jar format requires.
#[derive(Debug, Default, Clone)]
pub struct JarManifest {
    attrs: Vec<(String, String)>,
}

impl JarManifest {
    pub fn new() -> Self {
        Self {
            attrs: vec![("Manifest-Version".to_string(), "1.0".to_string())],
        }
    }

    pub fn attr(mut self, key: &str, value: &str) -> Self {
        self.attrs.push((key.to_string(), value.to_string()));
        self
    }

    pub fn render(&self) -> String {
        let mut text = String::new();
        for (key, value) in &self.attrs {
            text.push_str(key);
            text.push_str(": ");
            text.push_str(value);
            text.push('\n');
        }
        text.push('\n');
        text
    }

    /// Read a main attribute from manifest text. Accepts LF or CRLF.
    pub fn lookup(text: &str, key: &str) -> Option<String> {
        text.lines()
            .map(|l| l.trim_end_matches('\r'))
            .take_while(|l| !l.is_empty())
            .find_map(|l| {
                let (k, v) = l.split_once(':')?;
                (k.trim() == key).then(|| v.trim().to_string())
            })
    }
}

pub(crate) fn open_jar(path: &Path) -> Result<ZipArchive<File>> {
    let f = File::open(path).with_context(|| format!("Failed to open jar {}", path.display()))?;
    ZipArchive::new(f).with_context(|| format!("Failed to read jar {}", path.display()))
}

/// Options for entries copied verbatim (nested jars, one-jar content).
pub(crate) fn stored_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .last_modified_time(zip::DateTime::default())
}

pub(crate) fn deflated_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
}

/// Read entry `index` of `jar`, returning its name, whether it is a
/// directory, and its bytes.
pub(crate) fn read_entry(
    jar: &mut ZipArchive<File>,
    index: usize,
    jar_path: &Path,
) -> Result<(String, bool, Vec<u8>)> {
    let mut entry = jar
        .by_index(index)
        .with_context(|| format!("Failed to read entry {index} of {}", jar_path.display()))?;
    let name = entry.name().to_string();
    let is_dir = entry.is_dir();
    let mut data = Vec::new();
    if !is_dir {
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("Failed to read {name} from {}", jar_path.display()))?;
    }
    Ok((name, is_dir, data))
}

/// Write a file or directory entry.
pub(crate) fn write_entry<W: Write + std::io::Seek>(
    out: &mut ZipWriter<W>,
    name: &str,
    is_dir: bool,
    data: &[u8],
    options: SimpleFileOptions,
) -> Result<()> {
    if is_dir {
        out.add_directory(name, options)
            .with_context(|| format!("Failed to add directory {name}"))?;
    } else {
        out.start_file(name, options)
            .with_context(|| format!("Failed to add {name}"))?;
        out.write_all(data)?;
    }
    Ok(())
}

pub(crate) fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow::anyhow!("path has no file name: {}", path.display()))
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use std::io::Cursor;

    /// Build a jar at `path` from `(name, content)` pairs. Names ending in
    /// `/` become directory entries.
    pub(crate) fn make_jar(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            write_entry(&mut zip, name, name.ends_with('/'), data, deflated_options()).unwrap();
        }
        std::fs::write(path, zip.finish().unwrap().into_inner()).unwrap();
    }

    pub(crate) fn jar_names(path: &Path) -> Vec<String> {
        let jar = open_jar(path).unwrap();
        jar.file_names().map(str::to_string).collect()
    }

    pub(crate) fn jar_entry(path: &Path, name: &str) -> Vec<u8> {
        let mut jar = open_jar(path).unwrap();
        let mut data = Vec::new();
        jar.by_name(name).unwrap().read_to_end(&mut data).unwrap();
        data
    }
}
