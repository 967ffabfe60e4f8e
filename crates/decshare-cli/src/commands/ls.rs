//! `decshare ls`: print the directory of an image.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use decshare_config::Config;
use decshare_rt11::{Rt11Filesystem, report};
use decshare_tree::SystemClock;

use crate::commands::open_image;
use crate::config_bridge::{self, VolumeArgs};

/// Parse the image read-only and print its directory or volume information.
pub(crate) fn run(config: &Config, path: &Path, args: &VolumeArgs, info: bool) -> Result<()> {
    let mut open = open_image(config, path, args, false)?;
    let options = config_bridge::to_rt11_options(&config.rt11)?;
    let mut fs = Rt11Filesystem::new(options, open.partition.block_count(), Arc::new(SystemClock));
    if let Err(e) = fs.parse(&mut open.partition, &mut open.image) {
        if !e.is_structural() {
            return Err(e.into());
        }
        eprintln!("{} {e}", "Volume is damaged:".yellow().bold());
    }
    if !fs.is_formatted() {
        println!("{}", "No RT-11 volume on this image".yellow());
        return Ok(());
    }
    if info {
        print!("{}", report::volume_info(&fs));
    } else {
        print!("{}", report::directory_listing(&fs));
    }
    Ok(())
}
