//! Configuration types.
//!
//! Every section implements [`Default`] with the same values as the embedded
//! `defaults.toml`, so a bare `[section]` header produces a working setup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Drive types accepted by `volume.drive`.
pub const DRIVE_TYPES: [&str; 8] = ["rx01", "rx02", "rk05", "rl01", "rl02", "rk06", "rk07", "mscp"];

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Image file, share directory and drive type.
    pub volume: VolumeSection,
    /// Tick timing.
    pub sync: SyncSection,
    /// RT-11 volume settings.
    pub rt11: Rt11Section,
    /// Log level, format and per-crate directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// VolumeSection
// ---------------------------------------------------------------------------

/// Which image is shared, where, and how it is laid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeSection {
    /// Disk image file. Falls back to `DECSHARE_IMAGE`.
    pub image: Option<PathBuf>,
    /// Host directory mirroring the volume. Falls back to
    /// `DECSHARE_SHARE_DIR`.
    pub share_dir: Option<PathBuf>,
    /// Drive type, one of [`DRIVE_TYPES`].
    pub drive: String,
    /// Block count; required for `mscp` and ignored otherwise.
    pub blocks: Option<u32>,
    /// Create the image file if it does not exist.
    pub create_image: bool,
}

impl Default for VolumeSection {
    fn default() -> Self {
        Self {
            image: None,
            share_dir: None,
            drive: "rk05".to_owned(),
            blocks: None,
            create_image: true,
        }
    }
}

// ---------------------------------------------------------------------------
// SyncSection
// ---------------------------------------------------------------------------

/// Tick timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    /// Milliseconds between ticks.
    pub poll_interval_ms: u64,
    /// Milliseconds a side must stay quiet before its changes are applied.
    pub settle_ms: u64,
    /// Run ticks on a background thread.
    pub background: bool,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            settle_ms: 2000,
            background: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Rt11Section
// ---------------------------------------------------------------------------

/// RT-11 volume settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rt11Section {
    /// Volume identification written when formatting.
    pub volume_id: String,
    /// Owner name written when formatting.
    pub owner: String,
    /// System identification written when formatting.
    pub system_id: String,
    /// Minimum extra bytes per directory entry.
    pub extra_bytes: u16,
    /// Synthesize the read-only `$VOLUM.INF` file.
    pub volume_info: bool,
    /// Listing order rules; names in slashes are regular expressions.
    pub sort: Vec<String>,
}

impl Default for Rt11Section {
    fn default() -> Self {
        Self {
            volume_id: "RT11A".to_owned(),
            owner: String::new(),
            system_id: "DECRT11A".to_owned(),
            extra_bytes: 0,
            volume_info: true,
            sort: vec![
                "SWAP.SYS".to_owned(),
                "/^RT11.*\\.SYS$/".to_owned(),
                "/\\.SYS$/".to_owned(),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"` or `"full"`.
    pub format: String,
    /// Per-crate directives (e.g. `["decshare_rt11=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}
