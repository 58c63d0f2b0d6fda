//! Version-stamp source generation.
//!
//! Emits a C++ source defining the `binary_version` symbols linked into every
//! binary: source revision, build profile, build time, builder, host, and
//! compiler. The output is time- and host-stamped by nature.

use anyhow::{Context, Result};
use std::path::PathBuf;
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;
use tracing::info;

use crate::config::Settings;
use crate::generator::{require_args, Generator};
use crate::output;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStamp {
    pub revision: String,
    pub url: String,
    pub profile: String,
    pub compiler: String,
    pub build_time: String,
    pub builder: String,
    pub host: String,
}

impl BuildStamp {
    /// Capture time, user, and host for the current build.
    pub fn capture(revision: &str, url: &str, profile: &str, compiler: &str) -> Result<Self> {
        let build_time = OffsetDateTime::now_utc()
            .format(&Rfc2822)
            .context("formatting build time")?;
        Ok(Self {
            revision: revision.to_string(),
            url: url.to_string(),
            profile: profile.to_string(),
            compiler: compiler.to_string(),
            build_time,
            builder: std::env::var("USER").unwrap_or_default(),
            host: hostname(),
        })
    }

    pub fn render(&self) -> String {
        format!(
            "\n/* This file was generated by {} */\n\
             extern \"C\" {{\n\
             namespace binary_version {{\n\
             \x20 extern const int kSvnInfoCount = 1;\n\
             \x20 extern const char* const kSvnInfo[] = {{\"{}@{}\\n\"}};\n\
             \x20 extern const char kBuildType[] = \"{}\";\n\
             \x20 extern const char kBuildTime[] = \"{}\";\n\
             \x20 extern const char kBuilderName[] = \"{}\";\n\
             \x20 extern const char kHostName[] = \"{}\";\n\
             \x20 extern const char kCompiler[] = \"{}\";\n\
             }}}}\n\n",
            env!("CARGO_PKG_NAME"),
            escape(&self.url),
            escape(&self.revision),
            escape(&self.profile),
            escape(&self.build_time),
            escape(&self.builder),
            escape(&self.host),
            escape(&self.compiler),
        )
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Host name from `gethostname(2)`; empty if unavailable.
fn hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for writes of buf.len() bytes.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return String::new();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

pub struct ScmGenerator;

impl Generator for ScmGenerator {
    fn name(&self) -> &'static str {
        "scm"
    }

    /// `<output> <revision> <url> <profile> <compiler>`
    fn run(&self, args: &[String], _settings: &Settings) -> Result<()> {
        require_args(
            "scm",
            args,
            5,
            "<output> <revision> <url> <profile> <compiler>",
        )?;
        let output_path = PathBuf::from(&args[0]);
        let stamp = BuildStamp::capture(&args[1], &args[2], &args[3], &args[4])?;
        output::write_file(&output_path, stamp.render().as_bytes())?;
        info!(output = %output_path.display(), revision = %stamp.revision, "version stamp written");
        Ok(())
    }
}
