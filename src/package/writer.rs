use anyhow::{Context, Result};
use bzip2::write::BzEncoder;
use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use std::ffi::OsString;
use std::fs;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use tar::Builder as TarBuilder;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use super::{ArchiveFormat, ArchivePlan};
use crate::config::Settings;
use crate::manifest::{Manifest, MANIFEST_ENTRY};
use crate::output::{self, OutputFile};

/// Write the archive described by `plan` and return its manifest.
pub fn write_package(plan: &ArchivePlan, settings: &Settings) -> Result<Manifest> {
    if plan.format.is_tar() {
        write_tar(plan, plan.format, settings)
    } else {
        write_zip(plan)
    }
}

/// `<archive>.MANIFEST`, the manifest sidecar of tar packages.
pub fn sidecar_path(archive: &Path) -> PathBuf {
    let mut name = OsString::from(archive.as_os_str());
    name.push(".MANIFEST");
    PathBuf::from(name)
}

fn read_source(path: &Path) -> Result<(Vec<u8>, u32)> {
    // fs::read and fs::metadata follow symlinks, so links are archived as
    // their target's content.
    let md = fs::metadata(path).with_context(|| format!("Failed to stat {}", path.display()))?;
    if !md.is_file() {
        anyhow::bail!("not a regular file: {}", path.display());
    }
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok((bytes, file_mode(&md)))
}

#[cfg(unix)]
fn file_mode(md: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    md.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(_md: &fs::Metadata) -> u32 {
    0o644
}

fn write_zip(plan: &ArchivePlan) -> Result<Manifest> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());
    let mut manifest = Manifest::new();

    for entry in &plan.entries {
        let (bytes, mode) = read_source(&entry.source)?;
        debug!(source = %entry.source.display(), dest = %entry.dest, "adding to zip");
        zip.start_file(entry.dest.as_str(), options.unix_permissions(mode))?;
        zip.write_all(&bytes)?;
        manifest.record(&entry.dest, &bytes);
    }

    zip.start_file(MANIFEST_ENTRY, options.unix_permissions(0o644))?;
    zip.write_all(manifest.render().as_bytes())?;

    let bytes = zip.finish()?.into_inner();
    output::write_file(&plan.output, &bytes)?;
    Ok(manifest)
}

/// Compressed tar stream over an output file.
enum TarSink {
    Plain(OutputFile),
    Gz(GzEncoder<OutputFile>),
    Bz2(BzEncoder<OutputFile>),
    Zst(zstd::stream::Encoder<'static, OutputFile>),
}

impl TarSink {
    fn open(path: &Path, format: ArchiveFormat, settings: &Settings) -> Result<Self> {
        let out = OutputFile::create(path)?;
        Ok(match format {
            ArchiveFormat::Tar | ArchiveFormat::Zip => TarSink::Plain(out),
            ArchiveFormat::TarGz => {
                TarSink::Gz(GzBuilder::new().write(out, Compression::new(settings.gzip_level)))
            }
            ArchiveFormat::TarBz2 => {
                TarSink::Bz2(BzEncoder::new(out, bzip2::Compression::best()))
            }
            ArchiveFormat::TarZst => {
                TarSink::Zst(zstd::stream::Encoder::new(out, settings.zstd_level)?)
            }
        })
    }

    fn finish(self) -> io::Result<OutputFile> {
        match self {
            TarSink::Plain(out) => Ok(out),
            TarSink::Gz(enc) => enc.finish(),
            TarSink::Bz2(enc) => enc.finish(),
            TarSink::Zst(enc) => enc.finish(),
        }
    }
}

impl Write for TarSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            TarSink::Plain(w) => w.write(buf),
            TarSink::Gz(w) => w.write(buf),
            TarSink::Bz2(w) => w.write(buf),
            TarSink::Zst(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            TarSink::Plain(w) => w.flush(),
            TarSink::Gz(w) => w.flush(),
            TarSink::Bz2(w) => w.flush(),
            TarSink::Zst(w) => w.flush(),
        }
    }
}

fn tar_header(size: u64, mode: u32) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(size);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(mode);
    header.set_cksum();
    header
}

fn write_tar(plan: &ArchivePlan, format: ArchiveFormat, settings: &Settings) -> Result<Manifest> {
    let sink = TarSink::open(&plan.output, format, settings)?;
    let mut builder = TarBuilder::new(sink);
    let mut manifest = Manifest::new();

    for entry in &plan.entries {
        let (bytes, mode) = read_source(&entry.source)?;
        debug!(source = %entry.source.display(), dest = %entry.dest, "adding to tar");
        let mut header = tar_header(bytes.len() as u64, mode);
        builder
            .append_data(&mut header, &entry.dest, bytes.as_slice())
            .with_context(|| format!("Failed to append {}", entry.dest))?;
        manifest.record(&entry.dest, &bytes);
    }

    // The sidecar is committed only once the archive itself is in place.
    let sidecar_dest = sidecar_path(&plan.output);
    let text = manifest.render_sidecar();
    let mut sidecar = OutputFile::create(&sidecar_dest)?;
    sidecar
        .write_all(text.as_bytes())
        .with_context(|| format!("Failed to write {}", sidecar_dest.display()))?;

    let mut header = tar_header(text.len() as u64, 0o644);
    builder
        .append_data(&mut header, MANIFEST_ENTRY, text.as_bytes())
        .with_context(|| format!("Failed to append {MANIFEST_ENTRY}"))?;

    let sink = builder
        .into_inner()
        .with_context(|| "Failed to finalize tar builder")?;
    sink.finish()
        .with_context(|| format!("Failed to finish {} stream", format))?
        .commit()?;
    sidecar.commit()?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::hash_bytes;
    use crate::package::ArchivePlan;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn fixture(temp: &TempDir) -> Vec<(PathBuf, String)> {
        let bin = temp.path().join("tool");
        let conf = temp.path().join("tool.conf");
        fs::write(&bin, b"#!/bin/sh\necho tool\n").unwrap();
        fs::write(&conf, b"level=3\n").unwrap();
        vec![
            (bin, "bin/tool".to_string()),
            (conf, "etc/tool.conf".to_string()),
        ]
    }

    fn tar_entries<R: Read>(reader: R) -> Vec<(String, Vec<u8>)> {
        let mut archive = tar::Archive::new(reader);
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let mut e = e.unwrap();
                let name = e.path().unwrap().to_string_lossy().into_owned();
                let mut data = Vec::new();
                e.read_to_end(&mut data).unwrap();
                (name, data)
            })
            .collect()
    }

    #[test]
    fn zip_package_holds_sources_and_manifest() {
        let temp = TempDir::new().unwrap();
        let pairs = fixture(&temp);
        let out = temp.path().join("dist/tool.zip");
        let plan = ArchivePlan::new(&out, &pairs).unwrap();

        write_package(&plan, &Settings::default()).unwrap();

        let mut zip = ZipArchive::new(fs::File::open(&out).unwrap()).unwrap();
        assert_eq!(zip.len(), pairs.len() + 1);

        let mut text = String::new();
        zip.by_name(MANIFEST_ENTRY)
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        for (source, dest) in &pairs {
            let expected = format!("{} {}", hash_bytes(&fs::read(source).unwrap()), dest);
            assert!(text.lines().any(|l| l == expected), "missing {expected}");

            let mut data = Vec::new();
            zip.by_name(dest).unwrap().read_to_end(&mut data).unwrap();
            assert_eq!(data, fs::read(source).unwrap());
        }
        assert!(!sidecar_path(&out).exists());
    }

    #[test]
    fn tar_gz_package_has_sidecar_and_embedded_manifest() {
        let temp = TempDir::new().unwrap();
        let pairs = fixture(&temp);
        let out = temp.path().join("tool.tar.gz");
        let plan = ArchivePlan::new(&out, &pairs).unwrap();

        let manifest = write_package(&plan, &Settings::default()).unwrap();

        let sidecar = fs::read_to_string(sidecar_path(&out)).unwrap();
        assert_eq!(sidecar, manifest.render_sidecar());
        assert!(sidecar.ends_with("\n\n"));

        let gz = flate2::read::GzDecoder::new(fs::File::open(&out).unwrap());
        let entries = tar_entries(gz);
        assert_eq!(entries.len(), pairs.len() + 1);
        let (name, data) = entries.last().unwrap();
        assert_eq!(name, MANIFEST_ENTRY);
        assert_eq!(data, sidecar.as_bytes());
    }

    #[cfg(unix)]
    #[test]
    fn tar_dereferences_symlinks() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("real.txt");
        let link = temp.path().join("link.txt");
        fs::write(&target, b"real content").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let out = temp.path().join("out.tar");
        let plan = ArchivePlan::new(&out, &[(link, "data/link.txt".to_string())]).unwrap();
        write_package(&plan, &Settings::default()).unwrap();

        let mut archive = tar::Archive::new(fs::File::open(&out).unwrap());
        let mut entries = archive.entries().unwrap();
        let mut first = entries.next().unwrap().unwrap();
        assert_eq!(first.header().entry_type(), tar::EntryType::Regular);
        let mut data = Vec::new();
        first.read_to_end(&mut data).unwrap();
        assert_eq!(data, b"real content");
    }

    #[test]
    fn bz2_and_zst_streams_decode() {
        let temp = TempDir::new().unwrap();
        let pairs = fixture(&temp);

        let bz = temp.path().join("tool.tbz");
        write_package(&ArchivePlan::new(&bz, &pairs).unwrap(), &Settings::default()).unwrap();
        let decoded = bzip2::read::BzDecoder::new(fs::File::open(&bz).unwrap());
        assert_eq!(tar_entries(decoded).len(), 3);

        let zst = temp.path().join("tool.tar.zst");
        write_package(&ArchivePlan::new(&zst, &pairs).unwrap(), &Settings::default()).unwrap();
        let decoded = zstd::stream::Decoder::new(fs::File::open(&zst).unwrap()).unwrap();
        assert_eq!(tar_entries(decoded).len(), 3);
    }

    #[test]
    fn missing_source_aborts_without_output() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out.tar.gz");
        let plan = ArchivePlan::new(
            &out,
            &[(temp.path().join("absent"), "absent".to_string())],
        )
        .unwrap();

        assert!(write_package(&plan, &Settings::default()).is_err());
        assert!(!out.exists());
    }

    #[test]
    fn failed_archive_commit_leaves_no_sidecar() {
        let temp = TempDir::new().unwrap();
        let pairs = fixture(&temp);
        // A directory in the way makes the final rename fail.
        let out = temp.path().join("blocked.tar.gz");
        fs::create_dir_all(out.join("occupied")).unwrap();
        let plan = ArchivePlan::new(&out, &pairs).unwrap();

        assert!(write_package(&plan, &Settings::default()).is_err());
        assert!(!sidecar_path(&out).exists());
        assert!(out.is_dir());
    }

    #[test]
    fn rebuilding_is_byte_identical() {
        let temp = TempDir::new().unwrap();
        let pairs = fixture(&temp);
        for name in ["a.zip", "a.tar.gz"] {
            let out = temp.path().join(name);
            let plan = ArchivePlan::new(&out, &pairs).unwrap();
            write_package(&plan, &Settings::default()).unwrap();
            let first = fs::read(&out).unwrap();
            write_package(&plan, &Settings::default()).unwrap();
            assert_eq!(first, fs::read(&out).unwrap(), "{name}");
        }
    }
}
