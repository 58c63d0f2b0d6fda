//! Toolchain settings.
//!
//! Loaded once at the CLI boundary and passed to every generator.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::ToolchainError;

/// Environment variable naming a settings file when `--config` is absent.
pub const CONFIG_ENV: &str = "ARTIFACT_TOOLCHAIN_CONFIG";

pub const DEFAULT_ONEJAR_BOOT_CLASS: &str = "com.simontuffs.onejar.Boot";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    /// Interpreter named in python bootstrap headers.
    pub python: String,
    /// Java launcher used by wrapper scripts.
    pub java: String,
    /// `Main-Class` written into one-jar manifests.
    pub onejar_boot_class: String,
    pub gzip_level: u32,
    pub zstd_level: i32,
    /// Redirect fat-jar diagnostics into `<name>__fatjar__.log`.
    pub fatjar_log: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            python: "python".to_string(),
            java: "java".to_string(),
            onejar_boot_class: DEFAULT_ONEJAR_BOOT_CLASS.to_string(),
            gzip_level: 6,
            zstd_level: 3,
            fatjar_log: true,
        }
    }
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(text).map_err(|e| ToolchainError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| ToolchainError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text).with_context(|| format!("loading settings '{}'", path.display()))
    }

    /// Resolve settings from an explicit path, then `ARTIFACT_TOOLCHAIN_CONFIG`,
    /// then defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::from_file(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.gzip_level > 9 {
            return Err(ToolchainError::Config(format!(
                "gzip_level must be 0-9, got {}",
                self.gzip_level
            ))
            .into());
        }
        if !(1..=22).contains(&self.zstd_level) {
            return Err(ToolchainError::Config(format!(
                "zstd_level must be 1-22, got {}",
                self.zstd_level
            ))
            .into());
        }
        if self.python.trim().is_empty() || self.java.trim().is_empty() {
            return Err(ToolchainError::Config("interpreter names must not be empty".into()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::exit_code;
    use tempfile::TempDir;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Settings::from_toml("").unwrap(), Settings::default());
    }

    #[test]
    fn partial_file_overrides_fields() {
        let settings = Settings::from_toml("python = \"python3\"\nzstd_level = 19\n").unwrap();
        assert_eq!(settings.python, "python3");
        assert_eq!(settings.zstd_level, 19);
        assert_eq!(settings.java, "java");
    }

    #[test]
    fn unknown_keys_are_config_errors() {
        let err = Settings::from_toml("pythn = \"python3\"\n").unwrap_err();
        assert_eq!(exit_code(&err), 2);
    }

    #[test]
    fn out_of_range_levels_are_rejected() {
        assert!(Settings::from_toml("gzip_level = 12\n").is_err());
        assert!(Settings::from_toml("zstd_level = 0\n").is_err());
    }

    #[test]
    fn explicit_path_is_loaded() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("toolchain.toml");
        fs::write(&path, "fatjar_log = false\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert!(!settings.fatjar_log);
    }

    #[test]
    fn missing_explicit_path_is_a_config_error() {
        let temp = TempDir::new().unwrap();
        let err = Settings::load(Some(&temp.path().join("absent.toml"))).unwrap_err();
        assert_eq!(exit_code(&err), 2);
    }
}
