use std::path::PathBuf;
use toml::Value as TomlValue;

/// Source of a configuration layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLayerSource {
    /// User-level configuration (`~/.toolkeep/toolkeep.toml`)
    User { file: PathBuf },
    /// Workspace configuration (`toolkeep.toml` in the workspace root)
    Workspace { file: PathBuf },
    /// File named explicitly through `TOOLKEEP_CONFIG_PATH`
    Explicit { file: PathBuf },
    /// Environment variable overrides
    Environment,
}

/// A single layer of configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigLayerEntry {
    pub source: ConfigLayerSource,
    pub config: TomlValue,
}

impl ConfigLayerEntry {
    pub fn new(source: ConfigLayerSource, config: TomlValue) -> Self {
        Self { source, config }
    }
}

/// A stack of configuration layers, ordered from lowest to highest precedence.
#[derive(Debug, Clone, Default)]
pub struct ConfigLayerStack {
    layers: Vec<ConfigLayerEntry>,
}

impl ConfigLayerStack {
    pub fn push(&mut self, layer: ConfigLayerEntry) {
        self.layers.push(layer);
    }

    /// Merge all layers into a single effective configuration.
    pub fn effective_config(&self) -> TomlValue {
        let mut merged = TomlValue::Table(toml::Table::new());
        for layer in &self.layers {
            overlay(&mut merged, &layer.config);
        }
        merged
    }

    pub fn layers(&self) -> &[ConfigLayerEntry] {
        &self.layers
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Tables merge key by key; any other value in `upper` replaces `lower`.
fn overlay(lower: &mut TomlValue, upper: &TomlValue) {
    match (lower, upper) {
        (TomlValue::Table(lower_table), TomlValue::Table(upper_table)) => {
            for (key, value) in upper_table {
                match lower_table.get_mut(key) {
                    Some(existing) => overlay(existing, value),
                    None => {
                        lower_table.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (lower, upper) => *lower = upper.clone(),
    }
}
