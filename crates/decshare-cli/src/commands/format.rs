//! `decshare format`: write an empty volume.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use decshare_config::Config;
use decshare_image::{ImageStream, Partition};
use decshare_rt11::{BLOCK_SIZE, Rt11Filesystem};
use decshare_tree::SystemClock;
use tracing::info;

use crate::commands::open_image;
use crate::config_bridge::{self, VolumeArgs};

/// Create or overwrite the RT-11 structures of an image.
pub(crate) fn run(config: &Config, path: &Path, args: &VolumeArgs) -> Result<()> {
    let mut open = open_image(config, path, args, true)?;
    if let Some(spec) = &open.layout.bad_sector {
        let table = Partition::from_spec(spec, BLOCK_SIZE)?;
        if table.fill_bad_sector_table(&mut open.image)? {
            info!(image = %path.display(), "Wrote empty bad sector table");
        }
    }
    let options = config_bridge::to_rt11_options(&config.rt11)?;
    let mut fs = Rt11Filesystem::new(options, open.partition.block_count(), Arc::new(SystemClock));
    fs.format(&mut open.partition, &mut open.image)?;
    open.image.close()?;
    println!(
        "{} {}: {} blocks, {} free",
        "Formatted".green().bold(),
        path.display(),
        fs.block_count(),
        fs.free_blocks()
    );
    Ok(())
}
