mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use photoindex_core::domain::ScanMode;
use photoindex_core::Library;
use tracing_subscriber::EnvFilter;

/// photoindex: incremental photo library indexer
#[derive(Parser)]
#[command(name = "photoindex", version, about)]
struct Cli {
    /// Path to the catalog database
    #[arg(long, global = true, default_value_t = default_catalog_path())]
    catalog: String,

    /// Debug-level logging (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage library roots: add, remove, or list directories
    Roots {
        #[command(subcommand)]
        action: Option<RootsAction>,
    },
    /// Scan registered roots and update the catalog
    Scan {
        /// Only scan the root registered at this path
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Change detection: normal (content hash), date, quick, or reload
        #[arg(long, default_value = "normal")]
        mode: ScanMode,
        /// Skip thumbnail and fingerprint generation
        #[arg(long)]
        no_thumbnails: bool,
        /// Skip region bookkeeping
        #[arg(long)]
        no_regions: bool,
    },
    /// List recent scan batches
    Batches {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show the audit log of one batch
    Log {
        /// Batch ID
        batch: i64,
    },
    /// Manage path fragments excluded from scans
    Ignore {
        #[command(subcommand)]
        action: Option<IgnoreAction>,
    },
    /// Show or set the exiftool program used for extraction
    Tool {
        /// Program name or path to store
        program: Option<String>,
    },
    /// Show catalog status summary
    Status,
}

#[derive(Subcommand)]
enum RootsAction {
    /// Register a directory as a library root
    Add {
        /// Path to the photo directory
        path: PathBuf,
    },
    /// Unregister a root and drop its assets from the catalog
    Rm {
        /// Path of a registered root
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum IgnoreAction {
    /// Exclude paths containing this fragment (case-insensitive)
    Add { fragment: String },
    /// Stop excluding a fragment
    Rm { fragment: String },
}

fn default_catalog_path() -> String {
    dirs_path().to_string_lossy().to_string()
}

fn dirs_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".photoindex").join("catalog.db")
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "photoindex=debug,photoindex_core=debug"
    } else {
        "photoindex=info,photoindex_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let catalog_path = PathBuf::from(&cli.catalog);
    let library = Library::open(&catalog_path)?;

    match cli.command {
        Commands::Roots { action } => match action {
            None => commands::roots::list(&library)?,
            Some(RootsAction::Add { path }) => commands::roots::add(&library, path)?,
            Some(RootsAction::Rm { path }) => commands::roots::rm(&library, path)?,
        },
        Commands::Scan {
            folder,
            mode,
            no_thumbnails,
            no_regions,
        } => commands::scan::run(&library, folder, mode, !no_thumbnails, !no_regions)?,
        Commands::Batches { limit } => commands::batches::list(&library, limit)?,
        Commands::Log { batch } => commands::batches::log(&library, batch)?,
        Commands::Ignore { action } => match action {
            None => commands::ignore::list(&library)?,
            Some(IgnoreAction::Add { fragment }) => commands::ignore::add(&library, &fragment)?,
            Some(IgnoreAction::Rm { fragment }) => commands::ignore::rm(&library, &fragment)?,
        },
        Commands::Tool { program } => commands::scan::tool(&library, program)?,
        Commands::Status => commands::status::run(&library)?,
    }

    Ok(())
}
