//! Config inspection and sweep CLI.
//!
//! Builds a configuration from a default file plus override layers, merges
//! raw `--name value !type` overrides through the engine codec, and can
//! print, save, or expand the result into its registered variations.

use anyhow::Result;
use clap::Parser;
use config_tree::{ConfigSource, ConfigTree, Regime, Schema, Transform};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "config-tree", version, about)]
struct Cli {
    /// Default (schema) config file.
    #[arg(long)]
    default: PathBuf,

    /// Override config files, merged in order. Accepts a comma-separated
    /// list, brackets optional.
    #[arg(long = "config", value_delimiter = ',')]
    configs: Vec<String>,

    /// Overwrite regime: auto-save, locked, or unsafe.
    #[arg(long, default_value = "auto-save")]
    regime: String,

    /// Print the full parameter tree after building.
    #[arg(long)]
    details: bool,

    /// Expand and list the registered variations.
    #[arg(long)]
    variations: bool,

    /// Save the final configuration to this path.
    #[arg(long)]
    save: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, short)]
    verbose: bool,

    /// Raw `--name value !type` overrides passed to the engine codec.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    overrides: Vec<String>,
}

/// The template schema for projects without a subclassed one: suffix
/// conventions bind the standard pre-processing operations.
fn template_schema(default: &PathBuf) -> Schema {
    Schema::with_default(default.clone())
        .rule("*_config_file", Transform::AdditionalConfigFile)
        .rule("*_variations", Transform::Variation)
        .rule("*_grid", Transform::Grid)
        .rule("*experiment_path*", Transform::ExperimentPath)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let regime: Regime = cli.regime.parse()?;
    let sources: Vec<ConfigSource> = cli
        .configs
        .iter()
        .map(|path| ConfigSource::from(path.trim().trim_matches(['[', ']'])))
        .collect();

    let schema = template_schema(&cli.default);
    let mut tree = ConfigTree::load(schema, regime, &sources)?;
    tree.merge_command_line(&cli.overrides, false)?;

    if cli.details {
        println!("{}", tree.details());
    }

    if cli.variations {
        let variations = tree.create_variations()?;
        println!("{} variation(s):", variations.len());
        for variation in &variations {
            println!("- {}", variation.name());
        }
    }

    if let Some(path) = &cli.save {
        let saved = tree.save(path)?;
        println!("saved to {}", saved.display());
    }

    Ok(())
}
