//! Content manifests: `(hash, archive path)` records describing what went
//! into an archive.
//!
//! Hashes are lowercase hex SHA-256 of the exact bytes archived. They prove
//! integrity of the packaging step, nothing more.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Name of the manifest entry stored inside generated packages.
pub const MANIFEST_ENTRY: &str = "MANIFEST.TXT";

/// Hex content hash of a byte slice.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Hex content hash of a file, streamed.
pub fn hash_file(path: &Path) -> Result<String> {
    let f = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut r = BufReader::new(f);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = r
            .read(&mut buf)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    pub hash: String,
    pub path: String,
}

/// Ordered manifest records, one per archived source.
#[derive(Debug, Default, Clone)]
pub struct Manifest {
    records: Vec<ManifestRecord>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `bytes` as archived under `path`.
    pub fn record(&mut self, path: &str, bytes: &[u8]) {
        self.records.push(ManifestRecord {
            hash: hash_bytes(bytes),
            path: path.to_string(),
        });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn lines(&self) -> String {
        self.records
            .iter()
            .map(|r| format!("{} {}", r.hash, r.path))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Text stored as the in-archive `MANIFEST.TXT` of zip packages.
    pub fn render(&self) -> String {
        format!("{}\n", self.lines())
    }

    /// Text of the `<archive>.MANIFEST` sidecar of tar packages, which ends
    /// with a blank line.
    pub fn render_sidecar(&self) -> String {
        format!("{}\n\n", self.lines())
    }
}
