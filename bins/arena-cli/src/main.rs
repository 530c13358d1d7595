mod commands;

use clap::{Parser, Subcommand};
use anyhow::Result;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "arena-cli")]
#[command(about = "Arena CLI - Scaffold competitions, inspect configuration, render reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new competition root
    Init {
        /// Competition root path
        #[arg(short, long, default_value = ".")]
        path: String,
    },

    /// Re-render report and leaderboard from a stored run
    Report {
        /// records_<run_id>.json written by the worker
        #[arg(short, long)]
        records: PathBuf,

        /// Output directory (defaults to the records file's directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show the effective configuration
    Config {
        /// Competition root path
        #[arg(short, long, default_value = ".")]
        root: String,

        /// Config file (defaults to <root>/config/arena.json when present)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path } => {
            commands::init_project(&path)?;
        }
        Commands::Report { records, out } => {
            commands::render_report(&records, out.as_deref())?;
        }
        Commands::Config { root, config } => {
            commands::show_config(&root, config.as_deref())?;
        }
    }

    Ok(())
}
