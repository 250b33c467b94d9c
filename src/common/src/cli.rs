use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command line of the cleanup job
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Removes stale upload chunks from object storage and the file catalog", long_about = None)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Report what would be removed without deleting anything")]
    pub dry_run: bool,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<CommonCommands>,
}

#[derive(Subcommand, Debug, Clone, Default)]
pub enum CommonCommands {
    /// Run a single cleanup pass (default behavior)
    #[default]
    Run,
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
    /// Show version information and exit
    Version,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Initialize logging based on CLI arguments.
    ///
    /// `RUST_LOG` wins over the flags. Logs go to stderr, stdout is reserved
    /// for the cleanup report.
    pub fn init_logging(args: &CommonArgs) {
        let level = if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(args: &CommonArgs) -> Result<Configuration> {
        let mut config = match &args.config {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")?
            }
            None => Configuration::load().context("Failed to load configuration")?,
        };

        if args.dry_run {
            config.reconcile.dry_run = true;
        }

        Ok(config)
    }

    /// Display configuration in human-readable or JSON format, secrets masked
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        let config = config.redacted();
        if json {
            let json = serde_json::to_string_pretty(&config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            println!("Upload Janitor Configuration:");
            println!("=============================");
            println!("Database driver: {}", config.database.driver.scheme());
            match &config.database.dsn {
                Some(dsn) => println!("Database DSN: {dsn}"),
                None => println!(
                    "Database: {}@{}/{}",
                    config.database.user, config.database.host, config.database.name
                ),
            }
            println!("Table prefix: {:?}", config.database.table_prefix);
            println!("Storage bucket: {}", config.storage.bucket);
            println!("Storage region: {}", config.storage.region);
            println!(
                "Storage endpoint: {}",
                config.storage.endpoint.as_deref().unwrap_or("AWS default")
            );
            println!("Grace period: {}s", config.reconcile.grace_period_secs);
            println!("Storage key pattern: {}", config.reconcile.storage_key_pattern);
            println!("Uploads path: {}", config.reconcile.uploads_path);
            println!("Dry run: {}", config.reconcile.dry_run);
            println!("On error: {:?}", config.reconcile.on_error);
        }
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::info!("Validating configuration...");
        config.validate()?;
        log::info!("Configuration validation passed");
        Ok(())
    }

    /// Handle CLI commands that don't run a cleanup pass.
    ///
    /// Returns `true` when the command was handled.
    pub fn handle_common_command(command: &CommonCommands, config: &Configuration) -> Result<bool> {
        match command {
            CommonCommands::Config { json } => {
                display_config(config, *json)?;
                Ok(true)
            }
            CommonCommands::Validate => {
                validate_config(config)?;
                Ok(true)
            }
            CommonCommands::Version => {
                println!("{}", version_info());
                Ok(true)
            }
            CommonCommands::Run => Ok(false),
        }
    }

    /// Standard version information
    pub fn version_info() -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_commands_default() {
        let default_cmd = CommonCommands::default();
        assert!(matches!(default_cmd, CommonCommands::Run));
    }

    #[test]
    fn test_parse_without_subcommand() {
        let args = CommonArgs::parse_from(["upload-janitor", "--dry-run"]);
        assert!(args.dry_run);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_parse_config_subcommand() {
        let args = CommonArgs::parse_from(["upload-janitor", "config", "--json", "-v"]);
        assert!(args.verbose);
        assert!(matches!(args.command, Some(CommonCommands::Config { json: true })));
    }

    #[test]
    fn test_version_info() {
        let version = utils::version_info();
        assert!(version.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_handle_run_is_not_handled() {
        let config = crate::config::Configuration::default();
        assert!(!utils::handle_common_command(&CommonCommands::Run, &config).unwrap());
    }
}
