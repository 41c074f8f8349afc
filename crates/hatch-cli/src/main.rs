//! Hatch command-line tool
//!
//! Inspects, plans, loads and extracts packaged interactive-content
//! archives through the same pipeline an embedding host uses.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use commands::{extract, inspect, load, plan, Context};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hatch")]
#[command(about = "Interactive content archive toolkit", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a hatch.toml configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// When to use colors (auto, always, never)
    #[arg(long, global = true, value_parser = ["auto", "always", "never"])]
    color: Option<String>,

    /// Print every injected asset and extracted file
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the root descriptor, packages and content of an archive
    Inspect {
        /// Archive file
        archive: PathBuf,
        /// Print a JSON summary instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the dependency order and the style and script tiers
    Plan {
        /// Archive file
        archive: PathBuf,
    },

    /// Run a full load against a recording host
    Load {
        /// Archive file
        archive: PathBuf,
    },

    /// Unpack an archive into a directory
    Extract {
        /// Archive file
        archive: PathBuf,
        /// Output directory
        #[arg(default_value = ".")]
        out_dir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let color = cli.color.clone();

    let rt = tokio::runtime::Runtime::new()?;
    if let Err(e) = rt.block_on(run(cli)) {
        let mut out = output::StyledOutput::new(output::resolve_color_choice(color.as_deref()));
        out.stderr_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut ctx = Context::new(cli.config.as_deref(), cli.color.as_deref(), cli.verbose)?;

    match cli.command {
        Commands::Inspect { archive, json } => inspect::execute(&mut ctx, &archive, json).await,
        Commands::Plan { archive } => plan::execute(&mut ctx, &archive).await,
        Commands::Load { archive } => load::execute(&mut ctx, &archive).await,
        Commands::Extract { archive, out_dir } => extract::execute(&mut ctx, &archive, &out_dir),
    }
}
