//! pkd CLI
//!
//! Runs the package daemon and inspects its persisted state.
//!
//! # Commands
//!
//! - `run` - Run the daemon until it quits, goes idle or gets Ctrl-C
//! - `history` - Print past transactions from the ledger
//! - `check-filter` - Validate filter text
//! - `check-package-id` - Validate a package id
//! - `roles` - Show what a backend can do

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Package daemon and maintenance tools.
#[derive(Parser)]
#[command(name = "pkd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// State directory holding the ledger and id counter
    #[arg(global = true, short, long)]
    state_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon
    Run {
        /// Backend to load
        #[arg(short, long)]
        backend: Option<String>,

        /// JSON configuration file, watched for changes
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Quit after this many idle seconds
        #[arg(long)]
        exit_on_idle: Option<u64>,

        /// Forward backend and daemon errors to clients
        #[arg(long)]
        developer: bool,
    },

    /// Print past transactions
    History {
        /// Maximum number of records, newest first (0 for all)
        #[arg(short, long, default_value = "0")]
        limit: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Validate filter text such as "installed;~devel"
    CheckFilter {
        /// Filter text
        text: String,
    },

    /// Validate a package id such as "powertop;1.8-1.fc8;i386;fedora"
    CheckPackageId {
        /// Package id
        id: String,
    },

    /// Show the capabilities of a backend
    Roles {
        /// Backend to load
        #[arg(short, long, default_value = "dummy")]
        backend: String,
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

    match cli.command {
        Commands::Run {
            backend,
            config,
            exit_on_idle,
            developer,
        } => {
            let options = commands::run::RunOptions {
                backend,
                config,
                state_dir: cli.state_dir,
                exit_on_idle,
                developer,
            };
            commands::run::run(options)?;
        }
        Commands::History { limit, format } => {
            let path = cli.state_dir.ok_or("State directory required for history")?;
            commands::history::run(&path, limit, &format)?;
        }
        Commands::CheckFilter { text } => {
            commands::check::filter(&text)?;
        }
        Commands::CheckPackageId { id } => {
            commands::check::package_id(&id)?;
        }
        Commands::Roles { backend } => {
            commands::roles::run(&backend)?;
        }
        Commands::Version => {
            println!("pkd v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
