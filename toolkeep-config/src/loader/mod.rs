pub mod layers;

mod config;
mod manager;

#[cfg(test)]
mod tests;

pub use config::ToolkeepConfig;
pub use layers::{ConfigLayerEntry, ConfigLayerSource, ConfigLayerStack};
pub use manager::ConfigManager;
