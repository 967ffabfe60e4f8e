//! `decshare config`: inspect the layered configuration.

use std::path::Path;

use anyhow::{Result, anyhow};
use colored::Colorize;
use decshare_config::{ConfigResult, ResolvedConfig, ShowFormat};

/// Print the merged configuration.
pub(crate) fn show(resolved: &ResolvedConfig, format: &str) -> Result<()> {
    let format = match format {
        "toml" => ShowFormat::Toml,
        "json" => ShowFormat::Json,
        other => return Err(anyhow!("unknown format '{other}', expected toml or json")),
    };
    let text = resolved.render(format).map_err(|e| anyhow!(e))?;
    println!("{text}");
    Ok(())
}

/// Report whether the configuration loads and validates.
pub(crate) fn validate(resolved: ConfigResult<ResolvedConfig>) -> Result<()> {
    match resolved {
        Ok(resolved) => {
            println!("{}", "Configuration is valid".green());
            for file in &resolved.loaded_files {
                println!("  {file}");
            }
            Ok(())
        },
        Err(e) => {
            println!("{} {e}", "Configuration is invalid:".red());
            Err(e.into())
        },
    }
}

/// List the files that are consulted, in increasing priority.
pub(crate) fn paths(explicit: Option<&Path>) -> Result<()> {
    let mut candidates = vec![Path::new("/etc/decshare/config.toml").to_path_buf()];
    if let Some(dirs) = directories::BaseDirs::new() {
        candidates.push(dirs.home_dir().join(".decshare").join("config.toml"));
    }
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    for path in candidates {
        let state = if path.is_file() {
            "found".green()
        } else {
            "missing".dimmed()
        };
        println!("  {} ({state})", path.display());
    }
    Ok(())
}
