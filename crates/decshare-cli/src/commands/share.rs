//! `decshare share`: run the synchronization until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use decshare_sync::{ShareConfig, SharedVolume, SyncOptions};
use decshare_tree::SystemClock;
use tracing::info;

/// Open the volume, let the worker run, close on Ctrl-C.
pub(crate) async fn run(config: ShareConfig) -> Result<()> {
    let config = ShareConfig {
        sync: SyncOptions {
            background: true,
            ..config.sync
        },
        ..config
    };
    println!(
        "{} {} <-> {}",
        "Sharing".green().bold(),
        config.image.display(),
        config.share_dir.display()
    );

    let open = move || SharedVolume::open(&config, Arc::new(SystemClock));
    let volume = tokio::task::spawn_blocking(open)
        .await
        .context("sync startup panicked")??;
    info!(size = volume.size(), "Volume shared, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for Ctrl-C")?;

    println!("\n{}", "Shutting down...".yellow());
    tokio::task::spawn_blocking(move || volume.close())
        .await
        .context("sync shutdown panicked")??;
    Ok(())
}
