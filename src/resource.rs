//! Embedded resource index generation.
//!
//! Given a directory of resource files, emits a C header declaring one
//! byte-array symbol and length per file plus an index table, and a C source
//! defining the index table. The byte arrays themselves are produced by the
//! platform's binary-resource compilation step; this module only declares
//! and tabulates them.
//!
//! Symbols are `RESOURCE_` followed by the resource path (root included)
//! with every non-identifier character replaced by `_`. Two resources that
//! sanitize to the same symbol are rejected. The index keeps input order.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::ToolchainError;
use crate::generator::{require_args, Generator};
use crate::output;

const ENTRY_TYPE: &str = "EmbeddedResourceEntry";

#[derive(Debug, Clone)]
pub struct ResourceEmbedSpec {
    /// Module name; with `root` it names the guard and index symbols.
    pub name: String,
    pub root: PathBuf,
    pub header: PathBuf,
    pub source: PathBuf,
    pub resources: Vec<PathBuf>,
}

impl ResourceEmbedSpec {
    /// Parse `<name> <root> <header> <source> <resource>...`.
    pub fn from_args(args: &[String]) -> Result<Self> {
        require_args(
            "resource_index",
            args,
            4,
            "<name> <root> <header> <source> <resource>...",
        )?;
        Ok(Self {
            name: args[0].clone(),
            root: PathBuf::from(&args[1]),
            header: PathBuf::from(&args[2]),
            source: PathBuf::from(&args[3]),
            resources: args[4..].iter().map(PathBuf::from).collect(),
        })
    }

    /// Sanitized `<root>/<name>`, shared by the guard and index symbols.
    pub fn module_ident(&self) -> String {
        identifier(&self.root.join(&self.name).to_string_lossy())
    }
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
pub fn identifier(path: &str) -> String {
    path.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedResource {
    /// Path relative to the root, as stored in the index.
    pub name: String,
    pub symbol: String,
    pub size: u64,
}

/// Resolve names, symbols, and sizes, rejecting symbol collisions.
pub fn collect_resources(spec: &ResourceEmbedSpec) -> Result<Vec<EmbeddedResource>> {
    // Every name the header declares, with the resource (or index) owning it.
    let mut by_symbol: HashMap<String, String> = HashMap::new();
    let index = index_symbol(spec);
    by_symbol.insert(index.clone(), "<index>".to_string());
    by_symbol.insert(format!("{index}_len"), "<index>".to_string());
    let mut resources = Vec::with_capacity(spec.resources.len());

    for path in &spec.resources {
        let rel = path.strip_prefix(&spec.root).map_err(|_| {
            ToolchainError::args(
                "resource_index",
                format!(
                    "resource {} is not under {}",
                    path.display(),
                    spec.root.display()
                ),
            )
        })?;
        let name = rel.to_string_lossy().replace('\\', "/");
        let symbol = symbol_for(&spec.root, &name);
        for declared in [symbol.clone(), format!("{symbol}_len")] {
            if let Some(first) = by_symbol.insert(declared.clone(), name.clone()) {
                return Err(ToolchainError::IdentifierCollision {
                    ident: declared,
                    first,
                    second: name,
                }
                .into());
            }
        }
        let size = fs::metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();
        debug!(resource = %name, symbol = %symbol, size, "embedding");
        resources.push(EmbeddedResource { name, symbol, size });
    }
    Ok(resources)
}

fn c_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c if c.is_ascii_control() => {
                let _ = write!(out, "\\{:03o}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

pub fn render_header(spec: &ResourceEmbedSpec, resources: &[EmbeddedResource]) -> String {
    let module = spec.module_ident();
    let guard = format!("EMBEDDED_RESOURCE_{}_H_", module.to_ascii_uppercase());
    let index = index_symbol(spec);

    let mut h = String::new();
    let _ = write!(
        h,
        "// This file was automatically generated by {pkg}\n\
         #ifndef {guard}\n\
         #define {guard}\n\
         \n\
         #ifdef __cplusplus\n\
         extern \"C\" {{\n\
         #endif\n\
         \n\
         #ifndef EMBEDDED_RESOURCE_TYPE_DEFINED\n\
         #define EMBEDDED_RESOURCE_TYPE_DEFINED\n\
         struct {ENTRY_TYPE} {{\n\
         \x20   const char* name;\n\
         \x20   const char* data;\n\
         \x20   unsigned int size;\n\
         }};\n\
         #endif\n\
         \n",
        pkg = env!("CARGO_PKG_NAME"),
    );
    for r in resources {
        let _ = write!(
            h,
            "// \"{}\"\n\
             extern const char {sym}[{}];\n\
             extern const unsigned {sym}_len;\n\
             \n",
            c_string(&r.name),
            r.size,
            sym = r.symbol,
        );
    }
    let _ = write!(
        h,
        "// Resource index\n\
         extern const struct {ENTRY_TYPE} {index}[];\n\
         extern const unsigned {index}_len;\n\
         \n\
         #ifdef __cplusplus\n\
         }}  // extern \"C\"\n\
         #endif\n\
         \n\
         #endif  // {guard}\n"
    );
    h
}

pub fn render_source(spec: &ResourceEmbedSpec, resources: &[EmbeddedResource]) -> String {
    let index = index_symbol(spec);
    let mut c = String::new();
    let _ = write!(
        c,
        "// This file was automatically generated by {}\n\
         #include \"{}\"\n\
         \n\
         const struct {ENTRY_TYPE} {index}[] = {{\n",
        env!("CARGO_PKG_NAME"),
        c_string(&spec.header.to_string_lossy()),
    );
    for r in resources {
        let _ = writeln!(c, "    {{ \"{}\", {}, {} }},", c_string(&r.name), r.symbol, r.size);
    }
    let _ = write!(
        c,
        "}};\n\
         const unsigned {index}_len = {};\n",
        resources.len()
    );
    c
}

pub fn generate_resource_index(spec: &ResourceEmbedSpec) -> Result<usize> {
    let resources = collect_resources(spec)?;
    output::write_file(&spec.header, render_header(spec, &resources).as_bytes())?;
    output::write_file(&spec.source, render_source(spec, &resources).as_bytes())?;
    Ok(resources.len())
}

pub struct ResourceIndexGenerator;

impl Generator for ResourceIndexGenerator {
    fn name(&self) -> &'static str {
        "resource_index"
    }

    fn run(&self, args: &[String], _settings: &Settings) -> Result<()> {
        let spec = ResourceEmbedSpec::from_args(args)?;
        let count = generate_resource_index(&spec)
            .with_context(|| format!("generating resource index {}", spec.header.display()))?;
        info!(header = %spec.header.display(), resources = count, "resource index written");
        Ok(())
    }
}

fn index_symbol(spec: &ResourceEmbedSpec) -> String {
    format!("RESOURCE_INDEX_{}", spec.module_ident())
}

/// Symbol declared for the resource at `rel` under `root`.
pub fn symbol_for(root: &Path, rel: &str) -> String {
    format!("RESOURCE_{}", identifier(&root.join(rel).to_string_lossy()))
}
