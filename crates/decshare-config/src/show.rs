//! The resolved configuration and how it is printed.

use std::fmt::Write as _;

use crate::merge::FieldSources;
use crate::types::Config;

/// Output format of [`ResolvedConfig::render`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShowFormat {
    /// TOML, annotated with the layer each value came from.
    #[default]
    Toml,
    /// Plain JSON.
    Json,
}

/// A merged configuration together with where its values came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The effective configuration.
    pub config: Config,
    /// Layer that set each dotted field path.
    pub field_sources: FieldSources,
    /// Files that contributed, lowest priority first.
    pub loaded_files: Vec<String>,
}

impl ResolvedConfig {
    /// Print the effective configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized.
    pub fn render(&self, format: ShowFormat) -> Result<String, String> {
        match format {
            ShowFormat::Json => {
                serde_json::to_string_pretty(&self.config).map_err(|e| e.to_string())
            },
            ShowFormat::Toml => {
                let body = toml::to_string_pretty(&self.config).map_err(|e| e.to_string())?;
                let mut out = String::new();
                for file in &self.loaded_files {
                    let _ = writeln!(out, "# loaded: {file}");
                }
                if !self.loaded_files.is_empty() {
                    out.push('\n');
                }
                let mut section = String::new();
                for line in body.lines() {
                    if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                        section = name.to_owned();
                    }
                    let key = line.split_once(" = ").map(|(k, _)| k.trim());
                    let source =
                        key.and_then(|k| self.field_sources.get(&format!("{section}.{k}")));
                    match source {
                        Some(layer) => {
                            let _ = writeln!(out, "{line}  # {layer}");
                        },
                        None => {
                            let _ = writeln!(out, "{line}");
                        },
                    }
                }
                Ok(out)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::ConfigLayer;

    #[test]
    fn test_toml_annotates_sources() {
        let mut sources = FieldSources::new();
        sources.insert("sync.settle_ms".to_owned(), ConfigLayer::User);
        let resolved = ResolvedConfig {
            config: Config::default(),
            field_sources: sources,
            loaded_files: vec!["/home/pdp/.decshare/config.toml".to_owned()],
        };
        let text = resolved.render(ShowFormat::Toml).unwrap();
        assert!(text.starts_with("# loaded: /home/pdp/.decshare/config.toml"));
        assert!(text.contains("settle_ms = 2000  # user"));
    }

    #[test]
    fn test_json_round_trips() {
        let resolved = ResolvedConfig {
            config: Config::default(),
            field_sources: FieldSources::new(),
            loaded_files: Vec::new(),
        };
        let text = resolved.render(ShowFormat::Json).unwrap();
        let parsed: Config = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, Config::default());
    }
}
