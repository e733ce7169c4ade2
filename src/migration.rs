// `migrate` subcommand. Migrations are switched off in this build: flags are parsed and
// validated, then the command fails without touching any database.

use std::path::PathBuf;

use clap::Args;
use thiserror::Error;

pub const DEFAULT_SETTINGS_PATH: &str = "/etc/mci_settings.yml";

#[derive(Debug, Clone, Args)]
pub struct MigrationArgs {
    /// Path to the service configuration file.
    #[arg(long = "conf", default_value = DEFAULT_SETTINGS_PATH)]
    pub config_path: PathBuf,
    /// Alternate database URI, overrides the config file.
    #[arg(long = "mongodburi", default_value = "")]
    pub database_uri: String,
    /// Run the migration in dry-run mode.
    #[arg(short = 'n', long = "dry-run")]
    pub dry_run: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MigrationError {
    #[error("migrations are not enabled in this build")]
    Disabled,
}

const MIGRATIONS_ENABLED: bool = false;

impl MigrationArgs {
    pub fn execute(&self) -> Result<(), MigrationError> {
        tracing::debug!(
            conf = %self.config_path.display(),
            uri_override = !self.database_uri.is_empty(),
            dry_run = self.dry_run,
            "migrate requested"
        );
        if !MIGRATIONS_ENABLED {
            return Err(MigrationError::Disabled);
        }
        Ok(())
    }
}
