//! File staging generators: plain copies and path lists.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::config::Settings;
use crate::generator::{require_args, split_halves, Generator};
use crate::manifest::hash_file;
use crate::output;

fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    let data = fs::read(src).with_context(|| format!("Failed to read {}", src.display()))?;
    output::write_file(dst, &data)
}

pub struct JavaResourceGenerator;

impl Generator for JavaResourceGenerator {
    fn name(&self) -> &'static str {
        "java_resource"
    }

    /// `<dst>... <src>...`
    fn run(&self, args: &[String], _settings: &Settings) -> Result<()> {
        let (targets, sources) = split_halves("java_resource", args)?;
        for (dst, src) in targets.iter().zip(sources) {
            debug!(src = %src, dst = %dst, "staging resource");
            copy_file(Path::new(src), Path::new(dst))?;
        }
        info!(resources = targets.len(), "java resources staged");
        Ok(())
    }
}

pub struct ShellTestdataGenerator;

impl Generator for ShellTestdataGenerator {
    fn name(&self) -> &'static str {
        "shell_testdata"
    }

    /// `<list> <src>... <dst>...`
    fn run(&self, args: &[String], _settings: &Settings) -> Result<()> {
        require_args("shell_testdata", args, 1, "<list> <src>... <dst>...")?;
        let list = Path::new(&args[0]);
        let (sources, dests) = split_halves("shell_testdata", &args[1..])?;
        let cwd = std::env::current_dir().context("resolving current directory")?;
        let mut text = String::new();
        for (src, dst) in sources.iter().zip(dests) {
            let src = Path::new(src);
            let abs = if src.is_absolute() {
                src.to_path_buf()
            } else {
                cwd.join(src)
            };
            text.push_str(&format!("{} {}\n", abs.display(), dst));
        }
        output::write_file(list, text.as_bytes())?;
        info!(list = %list.display(), entries = sources.len(), "testdata list written");
        Ok(())
    }
}

/// Outcome of refreshing a secure-compiled object from its phony copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    Created,
    Replaced,
    Unchanged,
}

/// Copy `phony` over `obj` unless their contents already match.
pub fn refresh_object(obj: &Path, phony: &Path) -> Result<Refresh> {
    if !obj.exists() {
        copy_file(phony, obj)?;
        return Ok(Refresh::Created);
    }
    if hash_file(obj)? == hash_file(phony)? {
        return Ok(Refresh::Unchanged);
    }
    copy_file(phony, obj)?;
    Ok(Refresh::Replaced)
}

pub struct SecureObjectGenerator;

impl Generator for SecureObjectGenerator {
    fn name(&self) -> &'static str {
        "securecc_object"
    }

    /// `<obj> <phony-obj>`
    fn run(&self, args: &[String], _settings: &Settings) -> Result<()> {
        require_args("securecc_object", args, 2, "<obj> <phony-obj>")?;
        let obj = Path::new(&args[0]);
        let outcome = refresh_object(obj, Path::new(&args[1]))?;
        debug!(obj = %obj.display(), ?outcome, "secure object refreshed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn s(p: &Path) -> String {
        p.to_string_lossy().into_owned()
    }

    #[test]
    fn java_resources_copy_pairwise() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a.properties");
        let dst = temp.path().join("out/res/a.properties");
        fs::write(&src, b"k=v").unwrap();

        JavaResourceGenerator
            .run(&[s(&dst), s(&src)], &Settings::default())
            .unwrap();

        assert_eq!(fs::read(&dst).unwrap(), b"k=v");
    }

    #[test]
    fn testdata_list_uses_absolute_sources() {
        let temp = TempDir::new().unwrap();
        let list = temp.path().join("testdata.list");
        let args = vec![s(&list), "/data/in.txt".to_string(), "in.txt".to_string()];

        ShellTestdataGenerator.run(&args, &Settings::default()).unwrap();

        assert_eq!(fs::read_to_string(&list).unwrap(), "/data/in.txt in.txt\n");
    }

    #[test]
    fn testdata_odd_pairs_rejected() {
        let args = vec!["list".to_string(), "a".to_string()];
        assert!(ShellTestdataGenerator.run(&args, &Settings::default()).is_err());
    }

    #[test]
    fn refresh_only_when_contents_differ() {
        let temp = TempDir::new().unwrap();
        let obj = temp.path().join("x.o");
        let phony = temp.path().join("x.o.phony");
        fs::write(&phony, b"v1").unwrap();

        assert_eq!(refresh_object(&obj, &phony).unwrap(), Refresh::Created);
        assert_eq!(refresh_object(&obj, &phony).unwrap(), Refresh::Unchanged);
        fs::write(&phony, b"v2").unwrap();
        assert_eq!(refresh_object(&obj, &phony).unwrap(), Refresh::Replaced);
        assert_eq!(fs::read(&obj).unwrap(), b"v2");
    }
}
