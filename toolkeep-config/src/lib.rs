//! Typed configuration for the toolkeep execution server.
//!
//! Every section deserializes with defaults so a missing `toolkeep.toml`
//! yields a working in-process setup. [`ConfigManager`] layers the user and
//! workspace files and applies environment overrides on top.

pub mod backend;
pub mod cache;
pub mod constants;
pub mod debug;
pub mod loader;
pub mod lock;
pub mod session;

pub use backend::BackendConfig;
pub use cache::CacheConfig;
pub use debug::{DebugConfig, TraceLevel};
pub use loader::{ConfigLayerSource, ConfigManager, ToolkeepConfig};
pub use lock::LockConfig;
pub use session::SessionConfig;
