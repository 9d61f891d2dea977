//! Names and defaults shared by the loader and the runtime.

/// Default configuration file name looked up in the workspace root.
pub const CONFIG_FILE_NAME: &str = "toolkeep.toml";

/// Directory under the user's home holding the user-level config file.
pub const USER_CONFIG_DIR: &str = ".toolkeep";

pub mod env {
    /// Explicit path to a configuration file.
    pub const CONFIG_PATH: &str = "TOOLKEEP_CONFIG_PATH";
    /// Workspace directory to search for `toolkeep.toml`.
    pub const WORKSPACE: &str = "TOOLKEEP_WORKSPACE";
    /// Shared backend address override.
    pub const BACKEND_URL: &str = "TOOLKEEP_BACKEND_URL";
    /// Conventional Redis address, consulted when `TOOLKEEP_BACKEND_URL` is unset.
    pub const REDIS_URL: &str = "REDIS_URL";
    /// Force the in-process backend (`1`, `true`, `yes`).
    pub const FORCE_MEMORY: &str = "TOOLKEEP_FORCE_MEMORY";
}

pub mod keys {
    /// Default prefix for every key written to the shared backend.
    pub const DEFAULT_PREFIX: &str = "toolkeep";
}
