// SPDX-License-Identifier: MIT OR Apache-2.0
//! `soundedit` - inspect and validate sound operator stacks.
//!
//! Loads a game's operator manifest, then builds node graphs from the
//! stacks in a KeyValues stack file:
//! - `list` the stacks of a file
//! - `types` of the active manifest
//! - `show` one stack as a graph
//! - `check` that every stack builds
//! - `flatten` imports into a new stack file

mod commands;
mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::EditorConfig;
use soundedit_graph::{Manifest, ManifestRegistry, StackKind};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "soundedit")]
#[command(author, version, about = "Sound operator stack tools", long_about = None)]
struct Cli {
    /// Config file (default: ./soundedit.ron when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Game whose manifest to use
    #[arg(long, global = true)]
    game: Option<String>,

    /// Manifest file, overriding the configured one
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the stacks of a stack file
    List {
        /// Stack file
        file: PathBuf,
    },

    /// List operator types of the active manifest
    Types {
        /// Only types in this category
        #[arg(long)]
        category: Option<String>,
    },

    /// Build one stack and print its graph
    Show {
        /// Stack file
        file: PathBuf,

        /// Stack name
        stack: String,

        /// Look in update_stacks instead of start_stacks
        #[arg(long)]
        update: bool,

        /// Print the graph as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build every stack of a file and report failures
    Check {
        /// Stack file
        file: PathBuf,
    },

    /// Write a copy of a stack file with imports flattened
    Flatten {
        /// Stack file
        file: PathBuf,

        /// Output path
        #[arg(short = 'o', long)]
        out: PathBuf,
    },
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("soundedit_app={level}").parse()?)
        .add_directive(format!("soundedit_graph={level}").parse()?);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(())
}

/// Load the selected game's manifest and make it the active one
fn load_registry(cli: &Cli) -> anyhow::Result<&'static ManifestRegistry> {
    let (name, path) = match &cli.manifest {
        Some(path) => {
            let name = cli
                .game
                .clone()
                .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
                .unwrap_or_else(|| "custom".to_string());
            (name, path.clone())
        }
        None => {
            let cwd = std::env::current_dir().context("No working directory")?;
            let config = EditorConfig::discover(cli.config.as_deref(), &cwd)?;
            let game = config.select(cli.game.as_deref())?;
            (game.name.clone(), game.manifest.clone())
        }
    };

    let manifest = Manifest::load(&path)
        .with_context(|| format!("Failed to load manifest for '{name}'"))?;
    Ok(soundedit_graph::install_global(&name, manifest))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    tracing::debug!("soundedit v{}", env!("CARGO_PKG_VERSION"));

    let mut stdout = std::io::stdout().lock();
    match &cli.command {
        Commands::List { file } => commands::list(file, &mut stdout),
        Commands::Types { category } => {
            let registry = load_registry(&cli)?;
            commands::types(registry, category.as_deref(), &mut stdout)
        }
        Commands::Show {
            file,
            stack,
            update,
            json,
        } => {
            let registry = load_registry(&cli)?;
            let kind = if *update { StackKind::Update } else { StackKind::Start };
            commands::show(registry, file, stack, kind, *json, &mut stdout)
        }
        Commands::Check { file } => {
            let registry = load_registry(&cli)?;
            commands::check(registry, file, &mut stdout)
        }
        Commands::Flatten { file, out } => {
            let registry = load_registry(&cli)?;
            commands::flatten(registry, file, out)
        }
    }
}
