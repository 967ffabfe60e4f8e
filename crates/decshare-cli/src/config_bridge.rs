//! Bridge from `decshare_config::Config` to the library settings types.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use decshare_config::{Config, LoggingSection, Rt11Section};
use decshare_image::DriveType;
use decshare_rt11::Rt11Options;
use decshare_sync::{ShareConfig, SyncOptions};
use decshare_telemetry::{LogConfig, LogFormat};
use decshare_tree::SortRules;

/// Drive and image overrides given on the command line.
#[derive(Debug, Clone, Default, clap::Args)]
pub(crate) struct VolumeArgs {
    /// Drive type (rx01, rx02, rk05, rl01, rl02, rk06, rk07, mscp)
    #[arg(short, long)]
    pub(crate) drive: Option<String>,

    /// Block count of an MSCP disk
    #[arg(short, long)]
    pub(crate) blocks: Option<u32>,
}

/// Convert the `[logging]` section.
pub(crate) fn to_log_config(logging: &LoggingSection) -> LogConfig {
    let format = logging.format.parse().unwrap_or(LogFormat::Compact);
    logging
        .directives
        .iter()
        .fold(LogConfig::new(&logging.level).with_format(format), |config, d| {
            config.with_directive(d)
        })
}

/// Convert the `[rt11]` section.
pub(crate) fn to_rt11_options(rt11: &Rt11Section) -> Result<Rt11Options> {
    let sort_rules = SortRules::parse(rt11.sort.as_slice()).context("invalid rt11.sort rule")?;
    Ok(Rt11Options {
        volume_id: rt11.volume_id.clone(),
        owner_name: rt11.owner.clone(),
        system_id: rt11.system_id.clone(),
        extra_bytes: rt11.extra_bytes,
        volume_info: rt11.volume_info,
        sort_rules,
    })
}

/// Drive type and MSCP block count, command line first.
pub(crate) fn to_drive(cfg: &Config, args: &VolumeArgs) -> Result<(DriveType, Option<u32>)> {
    let name = args.drive.as_deref().unwrap_or(&cfg.volume.drive);
    let drive: DriveType = name.parse().map_err(|e: String| anyhow!(e))?;
    let blocks = args.blocks.or(cfg.volume.blocks);
    if drive == DriveType::Mscp && blocks.is_none_or(|b| b == 0) {
        return Err(anyhow!("an mscp drive needs --blocks or volume.blocks"));
    }
    Ok((drive, blocks))
}

/// Everything `share` needs, command line first.
pub(crate) fn to_share_config(
    cfg: &Config,
    image: Option<PathBuf>,
    share_dir: Option<PathBuf>,
    args: &VolumeArgs,
) -> Result<ShareConfig> {
    let image = image
        .or_else(|| cfg.volume.image.clone())
        .context("no image given; pass IMAGE, set volume.image or DECSHARE_IMAGE")?;
    let share_dir = share_dir
        .or_else(|| cfg.volume.share_dir.clone())
        .context(
            "no share directory; pass --share-dir, set volume.share_dir or DECSHARE_SHARE_DIR",
        )?;
    let (drive, mscp_blocks) = to_drive(cfg, args)?;
    Ok(ShareConfig {
        image,
        share_dir,
        drive,
        mscp_blocks,
        create_image: cfg.volume.create_image,
        rt11: to_rt11_options(&cfg.rt11)?,
        sync: SyncOptions {
            poll_interval: Duration::from_millis(cfg.sync.poll_interval_ms),
            settle: Duration::from_millis(cfg.sync.settle_ms),
            background: cfg.sync.background,
        },
    })
}
