//! artifact-toolchain - post-compilation artifact generators
//!
//! Invoked by the build system as `artifact-toolchain <generator> <args>...`.

use std::path::PathBuf;

use anyhow::Result;
use artifact_toolchain::{exit_code, generator, Settings};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Build deployable artifacts from compiled inputs
#[derive(Parser, Debug)]
#[command(name = "artifact-toolchain")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Settings file (falls back to $ARTIFACT_TOOLCHAIN_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// List available generators and exit
    #[arg(long)]
    list: bool,

    /// Generator to run
    #[arg(required_unless_present = "list")]
    generator: Option<String>,

    /// Generator arguments, passed through verbatim
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn run(cli: Cli) -> Result<()> {
    if cli.list {
        for g in generator::generators() {
            println!("{}", g.name());
        }
        return Ok(());
    }
    let settings = Settings::load(cli.config.as_deref())?;
    let name = cli.generator.unwrap_or_default();
    generator::run(&name, &cli.args, &settings)
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(exit_code(&err));
    }
}
