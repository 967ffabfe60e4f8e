//! Environment variable fallbacks.
//!
//! Variables only fill fields no file has set; a value from any config file
//! wins over the environment.

use std::collections::HashMap;

use crate::merge::{ConfigLayer, FieldSources};

/// Fallback for `volume.image`.
pub const IMAGE_VAR: &str = "DECSHARE_IMAGE";
/// Fallback for `volume.share_dir`.
pub const SHARE_DIR_VAR: &str = "DECSHARE_SHARE_DIR";

/// Mapping of environment variables to the dotted fields they fill.
const FALLBACKS: [(&str, &str, &str); 2] = [
    (IMAGE_VAR, "volume", "image"),
    (SHARE_DIR_VAR, "volume", "share_dir"),
];

/// Snapshot of the `DECSHARE_*` variables.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with("DECSHARE_"))
        .collect()
}

/// Fill unset fields from `env_vars`. Returns the number of fields set.
pub fn apply_env_fallbacks(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String>,
) -> usize {
    let Some(root) = merged.as_table_mut() else {
        return 0;
    };
    let mut applied = 0usize;
    for (var, section, key) in FALLBACKS {
        let Some(value) = env_vars.get(var).filter(|v| !v.is_empty()) else {
            continue;
        };
        let table = root
            .entry(section)
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        let Some(table) = table.as_table_mut() else {
            continue;
        };
        if table.contains_key(key) {
            continue;
        }
        table.insert(key.to_owned(), toml::Value::String(value.clone()));
        sources.insert(format!("{section}.{key}"), ConfigLayer::Environment);
        applied = applied.saturating_add(1);
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_fills_unset_only() {
        let mut merged: toml::Value =
            toml::from_str("[volume]\nimage = \"/from/file.dsk\"").unwrap();
        let env: HashMap<String, String> = [
            (IMAGE_VAR.to_owned(), "/from/env.dsk".to_owned()),
            (SHARE_DIR_VAR.to_owned(), "/srv/share".to_owned()),
        ]
        .into();
        let mut sources = FieldSources::new();

        assert_eq!(apply_env_fallbacks(&mut merged, &mut sources, &env), 1);
        assert_eq!(merged["volume"]["image"].as_str(), Some("/from/file.dsk"));
        assert_eq!(merged["volume"]["share_dir"].as_str(), Some("/srv/share"));
        assert_eq!(sources.get("volume.share_dir"), Some(&ConfigLayer::Environment));
    }

    #[test]
    fn test_empty_variable_ignored() {
        let mut merged: toml::Value = toml::from_str("").unwrap();
        let env: HashMap<String, String> = [(IMAGE_VAR.to_owned(), String::new())].into();
        let mut sources = FieldSources::new();
        assert_eq!(apply_env_fallbacks(&mut merged, &mut sources, &env), 0);
    }
}
