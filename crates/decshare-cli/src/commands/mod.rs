//! Subcommand implementations.

pub(crate) mod config;
pub(crate) mod format;
pub(crate) mod ls;
pub(crate) mod share;

use std::path::Path;

use anyhow::{Context, Result};
use decshare_image::{FileImage, ImageStream, Partition, VolumeLayout};
use decshare_rt11::BLOCK_SIZE;

use crate::config_bridge::{self, VolumeArgs};

/// An image file opened with its filesystem partition.
pub(crate) struct OpenImage {
    pub(crate) image: FileImage,
    pub(crate) partition: Partition,
    pub(crate) layout: VolumeLayout,
}

/// Open an image for the configured drive. With `create` the file is created
/// and grown to the drive size.
pub(crate) fn open_image(
    config: &decshare_config::Config,
    path: &Path,
    args: &VolumeArgs,
    create: bool,
) -> Result<OpenImage> {
    let (drive, blocks) = config_bridge::to_drive(config, args)?;
    let layout = drive.layout(BLOCK_SIZE, blocks);
    let mut image = FileImage::open(path, create)
        .with_context(|| format!("cannot open image {}", path.display()))?;
    if create && image.size() < layout.image_size {
        image.set_size(layout.image_size)?;
    }
    let partition = Partition::from_spec(&layout.filesystem, BLOCK_SIZE)?;
    Ok(OpenImage {
        image,
        partition,
        layout,
    })
}
