// Command line: `serve` (default), `sync`, `migrate`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::migration::MigrationArgs;

#[derive(Debug, Parser)]
#[command(name = "statsync", version, about = "Historical test stats sync service")]
pub struct Cli {
    /// Config file; falls back to $CONFIG_FILE, then ./config.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve HTTP and run the periodic sync worker.
    Serve,
    /// Run one sync pass and exit.
    Sync {
        /// Only sync this project (default: every configured project).
        #[arg(long)]
        project: Option<String>,
    },
    /// Run database migrations (disabled in this build).
    Migrate(MigrationArgs),
}
