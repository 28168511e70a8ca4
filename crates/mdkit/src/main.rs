//! mdkit CLI - Markdown plugin manager.
//!
//! Provides commands for:
//! - `convert`: Convert markdown to HTML with the configured parser
//! - `plugins`: List parsers and extensions with their libraries
//! - `config`: Print the persistable configuration of one plugin

mod commands;
mod error;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{ConfigArgs, ConvertArgs, PluginsArgs};
use output::Output;

/// mdkit - Markdown plugin manager.
#[derive(Parser)]
#[command(name = "mdkit", version, about)]
struct Cli {
    /// Path to configuration file (default: auto-discover mdkit.toml).
    #[arg(short, long, global = true, env = "MDKIT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output (registry and cache logs).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert markdown to HTML.
    Convert(ConvertArgs),
    /// List parsers and extensions.
    Plugins(PluginsArgs),
    /// Print the persistable configuration of a plugin as JSON.
    Config(ConfigArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    let result = match cli.command {
        Commands::Convert(args) => args.execute(config_path),
        Commands::Plugins(args) => args.execute(config_path),
        Commands::Config(args) => args.execute(config_path),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
