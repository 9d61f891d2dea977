//! Command-line arguments for the `toolkeep` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "toolkeep",
    version,
    about = "Run code-analysis tools against persistent, shared sessions"
)]
pub struct Cli {
    /// Configuration file to load instead of discovering `toolkeep.toml`.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Workspace root for config discovery and relative tool paths.
    #[arg(long, global = true, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Keep sessions in process memory even when a backend url is configured.
    #[arg(long, global = true)]
    pub force_memory: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Run one tool call and print the response envelope.
    Exec(ExecArgs),

    /// Answer JSON-lines requests on stdin with one envelope per line on stdout.
    Serve,

    /// Inspect and maintain sessions.
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Maintain the result cache.
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Report which session backend this configuration selects.
    Probe,
}

/// Arguments for the `exec` subcommand.
#[derive(Debug, Clone, Args)]
pub struct ExecArgs {
    /// Registered tool name.
    pub tool: String,

    /// Tool parameters as a JSON object.
    #[arg(long, value_name = "JSON", default_value = "{}")]
    pub params: String,

    /// Continue an existing session instead of starting a new one.
    #[arg(long, value_name = "ID")]
    pub session: Option<String>,

    /// Always run the tool, ignoring cached results.
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum SessionCommands {
    /// List live session ids.
    List,

    /// Print a session's stored state.
    Show {
        id: String,

        /// Print only the execution history.
        #[arg(long)]
        history: bool,
    },

    /// Return a session to idle and drop its history.
    Reset { id: String },

    /// Delete a session.
    Clear { id: String },

    /// Push a session's expiry out to `seconds` from now.
    Extend { id: String, seconds: u64 },
}

#[derive(Debug, Clone, Subcommand)]
pub enum CacheCommands {
    /// Drop every cached result in a namespace (a tool name).
    Invalidate { namespace: String },

    /// Drop every cached result.
    Clear,
}
