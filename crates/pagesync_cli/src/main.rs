//! PageSync CLI
//!
//! Offline tools for a local page mirror. Nothing here talks to the remote
//! store; these commands read what previous sync passes left on disk.
//!
//! # Commands
//!
//! - `spaces` - List synced spaces
//! - `inspect` - Show index statistics and sync watermarks for a space
//! - `verify` - Check that the files on disk match the index
//! - `locate` - Find the local file of a page
//! - `nav` - Show breadcrumb, siblings and children of a page
//! - `gitignore` - Keep the mirror out of version control

mod commands;

use clap::{Parser, Subcommand};
use pagesync_engine::SyncConfig;
use pagesync_storage::{StorageConfig, DEFAULT_ROOT_DIR};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// PageSync command-line mirror tools.
#[derive(Parser)]
#[command(name = "pagesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Mirror root directory
    #[arg(global = true, short, long, default_value = DEFAULT_ROOT_DIR)]
    root: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List synced spaces
    Spaces {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show index statistics and sync watermarks for a space
    Inspect {
        /// Space key
        space: String,

        /// Print the page tree
        #[arg(short, long)]
        tree: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check that the files on disk match the index
    Verify {
        /// Space key
        space: String,
    },

    /// Find the owning space and local file of a page
    Locate {
        /// Page id
        page_id: String,
    },

    /// Show breadcrumb, siblings and children of a page
    Nav {
        /// Page id
        page_id: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Add the mirror directory to .gitignore
    Gitignore {
        /// Project directory holding the .gitignore
        #[arg(short, long, default_value = ".")]
        project: PathBuf,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = SyncConfig::new(StorageConfig::new(&cli.root), "");

    match cli.command {
        Commands::Spaces { format } => {
            commands::spaces::run(&config.storage, &format)?;
        }
        Commands::Inspect {
            space,
            tree,
            format,
        } => {
            commands::inspect::run(&config, &space, tree, &format)?;
        }
        Commands::Verify { space } => {
            commands::verify::run(&config.storage, &space)?;
        }
        Commands::Locate { page_id } => {
            commands::locate::run(&config.storage, &page_id)?;
        }
        Commands::Nav { page_id, format } => {
            commands::nav::run(&config.storage, &page_id, &format)?;
        }
        Commands::Gitignore { project } => {
            commands::gitignore::run(&project, &cli.root)?;
        }
        Commands::Version => {
            println!("PageSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Index format v{}", pagesync_storage::INDEX_FORMAT_VERSION);
        }
    }

    Ok(())
}
