//! Generator registry.
//!
//! Each generator is one post-compilation step invoked with a flat argument
//! list. Implementations parse that list into a typed request up front and
//! never look at raw arguments again.

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::Settings;
use crate::error::ToolchainError;
use crate::{jar, package, python, resource, staging, version, wrapper};

/// A named artifact generator.
pub trait Generator: Sync {
    /// Name used on the command line.
    fn name(&self) -> &'static str;

    /// Run one invocation. Outputs are either fully written or absent.
    fn run(&self, args: &[String], settings: &Settings) -> Result<()>;
}

static GENERATORS: &[&dyn Generator] = &[
    &version::ScmGenerator,
    &package::PackageGenerator,
    &staging::SecureObjectGenerator,
    &resource::ResourceIndexGenerator,
    &jar::JarGenerator,
    &staging::JavaResourceGenerator,
    &wrapper::JavaTestGenerator,
    &jar::FatJarGenerator,
    &jar::OneJarGenerator,
    &wrapper::JavaBinaryGenerator,
    &wrapper::ScalaTestGenerator,
    &wrapper::ShellTestGenerator,
    &staging::ShellTestdataGenerator,
    &python::LibraryGenerator,
    &python::BinaryGenerator,
];

/// All registered generators, in registration order.
pub fn generators() -> &'static [&'static dyn Generator] {
    GENERATORS
}

pub fn lookup(name: &str) -> Option<&'static dyn Generator> {
    GENERATORS.iter().copied().find(|g| g.name() == name)
}

/// Look up `name` and run it with `args`.
pub fn run(name: &str, args: &[String], settings: &Settings) -> Result<()> {
    let generator =
        lookup(name).ok_or_else(|| ToolchainError::UnknownGenerator(name.to_string()))?;
    debug!(generator = name, args = args.len(), "invoking");
    generator
        .run(args, settings)
        .with_context(|| format!("generator '{name}' failed"))
}

/// Split `args` into two equal halves.
pub(crate) fn split_halves<'a>(
    generator: &'static str,
    args: &'a [String],
) -> Result<(&'a [String], &'a [String]), ToolchainError> {
    if args.len() % 2 != 0 {
        return Err(ToolchainError::args(
            generator,
            format!("expected an even number of paths, got {}", args.len()),
        ));
    }
    Ok(args.split_at(args.len() / 2))
}

/// Require at least `n` arguments.
pub(crate) fn require_args(
    generator: &'static str,
    args: &[String],
    n: usize,
    usage: &str,
) -> Result<(), ToolchainError> {
    if args.len() < n {
        return Err(ToolchainError::args(
            generator,
            format!("expected {usage}, got {} argument(s)", args.len()),
        ));
    }
    Ok(())
}

/// Sentinel standing in for an empty base directory on the wire.
pub(crate) const PYTHON_BASEDIR_PLACEHOLDER: &str = "__pythonbasedir__";

/// Map the wire sentinel to an empty base directory.
pub(crate) fn base_dir_arg(raw: &str) -> &str {
    if raw == PYTHON_BASEDIR_PLACEHOLDER {
        ""
    } else {
        raw
    }
}
