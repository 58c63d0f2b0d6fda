//! Output file handling.
//!
//! Every generator writes its outputs through [`OutputFile`]: bytes go to a
//! temporary sibling first and are renamed into place on [`OutputFile::commit`].
//! A failed invocation therefore leaves the previous output (or nothing)
//! behind instead of a truncated artifact.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Mode for generated scripts and self-executing archives.
pub const EXECUTABLE_MODE: u32 = 0o755;

/// An output file being written to a temporary sibling path.
pub struct OutputFile {
    dest: PathBuf,
    tmp: PathBuf,
    writer: Option<BufWriter<File>>,
    mode: Option<u32>,
}

impl OutputFile {
    pub fn create(dest: &Path) -> Result<Self> {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let tmp = tmp_path(dest);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        Ok(Self {
            dest: dest.to_path_buf(),
            tmp,
            writer: Some(BufWriter::new(file)),
            mode: None,
        })
    }

    /// Apply `mode` to the file before it is renamed into place.
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Flush, set permissions, and move the file to its destination.
    pub fn commit(mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            let file = writer
                .into_inner()
                .map_err(|e| e.into_error())
                .with_context(|| format!("Failed to flush {}", self.tmp.display()))?;
            file.sync_all()
                .with_context(|| format!("Failed to sync {}", self.tmp.display()))?;
        }
        if let Some(mode) = self.mode {
            set_mode(&self.tmp, mode)?;
        }
        fs::rename(&self.tmp, &self.dest).with_context(|| {
            format!(
                "Failed to move {} to {}",
                self.tmp.display(),
                self.dest.display()
            )
        })?;
        Ok(())
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "output already committed"))
    }
}

impl Write for OutputFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }
}

impl Drop for OutputFile {
    fn drop(&mut self) {
        if self.writer.is_some() || self.tmp.exists() {
            self.writer.take();
            let _ = fs::remove_file(&self.tmp);
        }
    }
}

/// Write `bytes` to `dest` through a temporary file.
pub fn write_file(dest: &Path, bytes: &[u8]) -> Result<()> {
    let mut out = OutputFile::create(dest)?;
    out.write_all(bytes)
        .with_context(|| format!("Failed to write {}", dest.display()))?;
    out.commit()
}

/// Write a shell script and mark it executable.
pub fn write_script(dest: &Path, text: &str) -> Result<()> {
    let mut out = OutputFile::create(dest)?.with_mode(EXECUTABLE_MODE);
    out.write_all(text.as_bytes())
        .with_context(|| format!("Failed to write {}", dest.display()))?;
    out.commit()
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to chmod {}", path.display()))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

fn tmp_path(dest: &Path) -> PathBuf {
    let n = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    dest.with_file_name(format!(".{name}.tmp-{}-{n}", std::process::id()))
}
