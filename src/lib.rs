//! Post-compilation artifact generators.
//!
//! Each generator turns already-built inputs into a deployable artifact and is
//! driven by a flat list of path arguments from the build system:
//!
//! - **Packages** - zip and tar (plain, gz, bz2, zst) archives with an embedded
//!   content manifest
//! - **Jars** - one-jar bundles, fat jars, and plain jars with staged resources
//! - **Resources** - C index tables for files linked into a binary
//! - **Python** - source library manifests and self-executing archives
//! - **Wrappers** - launcher and test-runner shell scripts
//!
//! # Architecture
//!
//! ```text
//! artifact-toolchain <generator> <args>...
//!     │
//!     ├── generator: name -> Generator lookup
//!     ├── config:    interpreter names, compression levels
//!     │
//!     ├── package ──┐
//!     ├── jar ──────┤
//!     ├── python ───┼── manifest (content hashes)
//!     ├── resource  │
//!     └── wrapper ──┴── output (atomic writes)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use artifact_toolchain::{generator, Settings};
//!
//! let args: Vec<String> = vec![
//!     "out/app.tar.gz".into(),
//!     "build/app".into(),
//!     "bin/app".into(),
//! ];
//! generator::run("package", &args, &Settings::default())?;
//! ```

pub mod config;
pub mod error;
pub mod generator;
pub mod jar;
pub mod manifest;
pub mod output;
pub mod package;
pub mod python;
pub mod resource;
pub mod staging;
pub mod version;
pub mod wrapper;

pub use config::Settings;
pub use error::{exit_code, ToolchainError};
pub use generator::Generator;
