//! decshare - share a DEC RT-11 disk image with a host directory.
//!
//! While `decshare share` runs, files written by the emulated machine appear
//! in the share directory and files dropped into the share directory appear
//! on the volume.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config_bridge;

use config_bridge::VolumeArgs;

/// decshare - DEC disk image sharing
#[derive(Parser)]
#[command(name = "decshare")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Additional configuration file with the highest priority
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep an image and a host directory in sync until interrupted
    Share {
        /// Disk image file (default: volume.image)
        image: Option<PathBuf>,

        /// Host directory (default: volume.share_dir)
        #[arg(short, long)]
        share_dir: Option<PathBuf>,

        #[command(flatten)]
        volume: VolumeArgs,
    },

    /// Print the RT-11 directory of an image
    Ls {
        /// Disk image file
        image: PathBuf,

        /// Print the volume information instead of the directory
        #[arg(short, long)]
        info: bool,

        #[command(flatten)]
        volume: VolumeArgs,
    },

    /// Write an empty RT-11 volume
    Format {
        /// Disk image file, created if missing
        image: PathBuf,

        #[command(flatten)]
        volume: VolumeArgs,
    },

    /// View the effective configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the merged configuration with source annotations
    Show {
        /// Output format (toml or json)
        #[arg(short, long, default_value = "toml")]
        format: String,
    },
    /// Validate the configuration
    Validate,
    /// Show the config file paths being checked
    Paths,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let resolved = decshare_config::Config::load(cli.config.as_deref());
    let mut log_config = match &resolved {
        Ok(r) => config_bridge::to_log_config(&r.config.logging),
        Err(_) => decshare_telemetry::LogConfig::default(),
    };
    if cli.verbose {
        "debug".clone_into(&mut log_config.level);
    }
    if let Err(e) = decshare_telemetry::setup_logging(&log_config.with_thread_names()) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match cli.command {
        Commands::Config { command } => match command {
            ConfigCommands::Show { format } => commands::config::show(&resolved?, &format),
            ConfigCommands::Validate => commands::config::validate(resolved),
            ConfigCommands::Paths => commands::config::paths(cli.config.as_deref()),
        },
        Commands::Share {
            image,
            share_dir,
            volume,
        } => {
            let config = resolved?.config;
            let share = config_bridge::to_share_config(&config, image, share_dir, &volume)?;
            commands::share::run(share).await
        },
        Commands::Ls {
            image,
            info,
            volume,
        } => commands::ls::run(&resolved?.config, &image, &volume, info),
        Commands::Format { image, volume } => {
            commands::format::run(&resolved?.config, &image, &volume)
        },
    }
}
