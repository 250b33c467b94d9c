use anyhow::{Context, Result};
use clap::Parser;
use common::FileCache;
use common::cli::{CommonArgs, utils};
use common::storage::create_object_store;
use janitor::{JanitorConfig, Reconciler};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CommonArgs::parse();
    utils::init_logging(&args);

    let config = utils::load_config(&args)?;

    let command = args.command.clone().unwrap_or_default();
    if utils::handle_common_command(&command, &config)? {
        return Ok(());
    }

    utils::validate_config(&config)?;
    let janitor_config =
        JanitorConfig::try_from(&config.reconcile).context("Invalid reconcile configuration")?;

    let catalog = Arc::new(
        FileCache::connect(&config.database)
            .await
            .context("Failed to connect to the file catalog")?,
    );
    let object_store =
        create_object_store(&config.storage).context("Failed to create object store client")?;

    log::info!(
        "Removing uploads older than {}s from bucket {}",
        config.reconcile.grace_period_secs,
        config.storage.bucket
    );

    let report = Reconciler::new(janitor_config, catalog, object_store)
        .run()
        .await
        .context("Cleanup run failed")?;

    if !report.is_complete() {
        for failure in &report.failures {
            tracing::warn!(file_id = failure.file_id, error = %failure.error, "Left in place");
        }
        anyhow::bail!(
            "{} catalog entries could not be removed",
            report.failures.len()
        );
    }

    Ok(())
}
