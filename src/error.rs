//! Error taxonomy for generator invocations.
//!
//! Generators return `anyhow::Result` and attach context at filesystem
//! boundaries. The variants here mark failures the caller needs to tell
//! apart: a configuration error means nothing was produced, an integrity
//! error means the inputs would have produced a silently wrong artifact.
//! Plain I/O failures stay as `std::io::Error` inside the anyhow chain.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("unknown generator '{0}'")]
    UnknownGenerator(String),

    #[error("invalid arguments for '{generator}': {reason}")]
    Arguments {
        generator: &'static str,
        reason: String,
    },

    #[error("unrecognized archive suffix: {0}")]
    UnknownSuffix(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("duplicate archive path '{path}' (from {first} and {second})")]
    DuplicatePath {
        path: String,
        first: String,
        second: String,
    },

    #[error("resource identifier '{ident}' produced by both '{first}' and '{second}'")]
    IdentifierCollision {
        ident: String,
        first: String,
        second: String,
    },
}

impl ToolchainError {
    /// Configuration errors are raised before any output is written.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            ToolchainError::UnknownGenerator(_)
                | ToolchainError::Arguments { .. }
                | ToolchainError::UnknownSuffix(_)
                | ToolchainError::Config(_)
        )
    }

    pub(crate) fn args(generator: &'static str, reason: impl Into<String>) -> Self {
        ToolchainError::Arguments {
            generator,
            reason: reason.into(),
        }
    }
}

/// Exit status for a failed invocation.
///
/// Configuration errors exit with 2, everything else with 1.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ToolchainError>() {
        Some(e) if e.is_config() => 2,
        _ => 1,
    }
}
