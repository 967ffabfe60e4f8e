//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Config, DRIVE_TYPES};

/// Longest identification string the home block holds.
const MAX_IDENT_LEN: usize = 12;

/// Largest per-entry directory extension.
const MAX_EXTRA_BYTES: u16 = 64;

/// Validate a fully merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_volume(config)?;
    validate_sync(config)?;
    validate_rt11(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_volume(config: &Config) -> ConfigResult<()> {
    let v = &config.volume;
    if !DRIVE_TYPES.contains(&v.drive.as_str()) {
        return Err(invalid(
            "volume.drive",
            format!(
                "unsupported drive '{}'; expected one of: {}",
                v.drive,
                DRIVE_TYPES.join(", ")
            ),
        ));
    }
    if v.drive == "mscp" {
        match v.blocks {
            None => return Err(invalid("volume.blocks", "an mscp drive needs a block count")),
            Some(0) => return Err(invalid("volume.blocks", "block count must be positive")),
            Some(_) => {},
        }
    }
    Ok(())
}

fn validate_sync(config: &Config) -> ConfigResult<()> {
    if config.sync.poll_interval_ms == 0 {
        return Err(invalid("sync.poll_interval_ms", "poll interval must be positive"));
    }
    Ok(())
}

fn validate_rt11(config: &Config) -> ConfigResult<()> {
    let r = &config.rt11;
    for (field, value) in [
        ("rt11.volume_id", &r.volume_id),
        ("rt11.owner", &r.owner),
        ("rt11.system_id", &r.system_id),
    ] {
        if value.chars().count() > MAX_IDENT_LEN || !value.is_ascii() {
            return Err(invalid(
                field,
                format!("'{value}' must be at most {MAX_IDENT_LEN} ASCII characters"),
            ));
        }
    }
    if !r.extra_bytes.is_multiple_of(2) || r.extra_bytes > MAX_EXTRA_BYTES {
        return Err(invalid(
            "rt11.extra_bytes",
            format!("must be even and at most {MAX_EXTRA_BYTES}"),
        ));
    }
    for rule in &r.sort {
        if let Some(pattern) = rule
            .strip_prefix('/')
            .and_then(|s| s.strip_suffix('/'))
            .filter(|s| !s.is_empty())
            && let Err(e) = regex::Regex::new(pattern)
        {
            return Err(invalid("rt11.sort", format!("invalid pattern {rule}: {e}")));
        }
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        ));
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        ));
    }
    Ok(())
}
