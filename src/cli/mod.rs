//! Handlers behind each subcommand.

mod cache;
mod exec;
mod probe;
mod serve;
mod sessions;

pub use cache::handle_cache_command;
pub use exec::handle_exec_command;
pub use probe::handle_probe_command;
pub use serve::handle_serve_command;
pub use sessions::handle_sessions_command;
