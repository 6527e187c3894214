mod practice;
mod prompt;
mod seed;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use practizio_storage::{resolve_data_dir, PracticeStore};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "practizio")]
#[command(about = "Practizio practice store CLI", long_about = None)]
struct Cli {
    /// Store directory (defaults to $PRACTIZIO_DATA_DIR, then the platform data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store files if they are missing
    Init,
    /// Insert the built-in practices
    Seed {
        #[arg(long)]
        force: bool,
    },
    /// Manage practices
    Practice {
        #[command(subcommand)]
        action: practice::PracticeCommand,
    },
    /// Manage system prompts
    Prompt {
        #[command(subcommand)]
        action: prompt::PromptCommand,
    },
}

/// Shared state for every command: the opened store and the output mode.
pub struct CliContext {
    pub store: PracticeStore,
    pub json: bool,
}

impl CliContext {
    pub fn emit<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir.as_deref());
    let store = PracticeStore::open_dir(&data_dir)
        .with_context(|| format!("Failed to open store at {}", data_dir.display()))?;
    let ctx = CliContext {
        store,
        json: cli.json,
    };

    match cli.command {
        Commands::Init => {
            let paths = ctx.store.paths();
            if ctx.json {
                ctx.emit(&serde_json::json!({
                    "root": paths.root,
                    "practices": paths.practices_path,
                    "systemPrompts": paths.prompts_path,
                }))?;
            } else {
                println!("Store ready at {}", paths.root.display());
            }
        }
        Commands::Seed { force } => {
            let report = seed::seed(&ctx.store, force)?;
            if ctx.json {
                ctx.emit(&report)?;
            } else if report.skipped {
                println!("Store already has practices; use --force to seed anyway.");
            } else {
                println!("Seeded {} practices.", report.inserted.len());
            }
        }
        Commands::Practice { action } => practice::handle(&ctx, action)?,
        Commands::Prompt { action } => prompt::handle(&ctx, action)?,
    }

    Ok(())
}
