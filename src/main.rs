//! Thin CLI caller around the envtree library.
//!
//! Registers one or more YAML files into a fresh configuration and prints
//! the merged result. All configuration semantics live in the library; this
//! binary only parses arguments, wires up logging, and formats output.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use envtree::{Configuration, RegisterOptions, discover_env};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Output format for the merged tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum Format {
    /// Pretty-printed JSON (default)
    #[default]
    Json,
    /// YAML document
    Yaml,
    /// One `path = value` line per leaf, sorted
    Flat,
}

/// Environment-scoped configuration inspector
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge one or more YAML files and print the resulting tree
    Dump(DumpArgs),

    /// Print the active environment name
    Env,
}

#[derive(clap::Args, Debug)]
struct DumpArgs {
    /// Absolute paths of YAML files to register, in merge order
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Environment to select (default: discovered from /etc/flags/env)
    #[arg(short, long)]
    env: Option<String>,

    /// Merge whole documents without per-environment selection
    #[arg(long)]
    raw: bool,

    /// Tolerate missing files
    #[arg(long)]
    optional: bool,

    /// Dotted path to mount the documents under
    #[arg(long)]
    nested: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Json)]
    format: Format,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Env => {
            println!("{}", discover_env());
        }
        Command::Dump(args) => {
            let mut config = match args.env {
                Some(env) => Configuration::with_env(env),
                None => Configuration::new(),
            };
            for file in &args.files {
                let options = RegisterOptions {
                    raw: args.raw,
                    optional: args.optional,
                    nested: args.nested.clone(),
                };
                config.register(file, options)?;
            }
            match args.format {
                Format::Json => {
                    println!("{}", serde_json::to_string_pretty(&config.snapshot())?)
                }
                Format::Yaml => print!("{}", serde_yaml::to_string(&config.snapshot())?),
                Format::Flat => println!("{}", config.root().render()),
            }
        }
    }

    Ok(())
}
