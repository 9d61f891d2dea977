//! # toolkeep
//!
//! Runs code-analysis tools against persistent sessions. A session keeps the
//! state machine context and per-tool state between calls, survives restarts
//! when a shared Redis backend is configured, and is protected by a
//! per-session lock so concurrent calls never lose each other's history.
//! Results are cached in a two-tier cache keyed by a fingerprint of the tool
//! name and its normalized parameters.
//!
//! ## Architecture
//!
//! - `toolkeep-core/` holds the backend abstraction, session store, lock,
//!   tiered cache, state machine and the [`ExecutionService`](toolkeep_core::ExecutionService).
//! - `toolkeep-config/` loads `toolkeep.toml` with environment overrides.
//! - `toolkeep-exec-events/` defines the response envelope written to callers.
//! - `toolkeep-commons/` carries the error taxonomy shared by all crates.
//!
//! This crate adds the CLI surface, process startup and the built-in tools.
//!
//! ```toml
//! [backend]
//! url = "redis://127.0.0.1:6379"
//!
//! [lock]
//! wait_ms = 250
//! ```

pub mod args;
pub mod serve;
pub mod startup;
pub mod tools;

pub use startup::StartupContext;
