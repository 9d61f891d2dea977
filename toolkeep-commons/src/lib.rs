//! Shared contracts reused by the toolkeep crates.
//!
//! The error taxonomy lives here so the response envelope, the execution
//! core, and the CLI classify failures the same way without depending on
//! each other.

pub mod error_category;

pub use error_category::ErrorCategory;
