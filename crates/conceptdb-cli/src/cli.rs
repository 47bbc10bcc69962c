//! CLI argument parsing and command definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use conceptdb::{Preference, SyncDirection};

// ============================================================================
// CLI argument types
// ============================================================================

/// Top-level CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "conceptdb", author, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file.
    #[arg(short, long, env = "CONCEPTDB_CONFIG")]
    pub config: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long)]
    pub quiet: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Route a query and print the response.
    Route {
        /// Query text: SQL or natural language.
        query: String,

        /// Return at most this many results.
        #[arg(short, long)]
        limit: Option<usize>,

        /// Store preference for this query (precise or semantic).
        #[arg(short, long)]
        prefer: Option<Preference>,
    },

    /// Show how a query would be routed, without running it.
    Explain {
        /// Query text.
        query: String,

        /// Store preference (precise or semantic).
        #[arg(short, long)]
        prefer: Option<Preference>,
    },

    /// Show routing statistics.
    Stats {
        /// Only count decisions from the last N seconds.
        #[arg(short, long)]
        window_secs: Option<u64>,

        /// Route every non-empty line of this file first.
        #[arg(long)]
        queries: Option<PathBuf>,

        /// Also show per-day activity for the last N days.
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Show evolution and sync status.
    Status,

    /// Move to the next (or a given) evolution phase.
    Evolve {
        /// Target phase number.
        #[arg(short, long)]
        target: Option<u8>,

        /// Skip the promotion criteria.
        #[arg(short, long)]
        force: bool,
    },

    /// Run one sync cycle.
    Sync {
        /// precise-to-semantic, semantic-to-precise, or bidirectional.
        #[arg(short, long, default_value = "bidirectional")]
        direction: SyncDirection,

        /// Run even when no changes are detected.
        #[arg(short, long)]
        force: bool,

        /// Limit the cycle to these tables.
        #[arg(short, long = "table")]
        tables: Vec<String>,
    },

    /// Print version information.
    Version,

    /// Configuration operations.
    Config(ConfigCommand),
}

/// Config-specific subcommands.
#[derive(Parser, Debug)]
pub struct ConfigCommand {
    /// Config subcommand to execute.
    #[command(subcommand)]
    pub command: ConfigAction,
}

/// Available config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the resolved config file path.
    Path,

    /// Get a configuration value by dotted key.
    Get {
        /// Dotted key (e.g., "router.search_limit").
        key: String,
    },

    /// Create a default configuration file.
    Init {
        /// Output file path (defaults to XDG config path).
        #[arg(short, long)]
        file: Option<String>,

        /// Overwrite existing file.
        #[arg(long)]
        force: bool,
    },

    /// Export configuration as environment variables.
    Export {
        /// Format as Docker --env flags.
        #[arg(long)]
        docker_env: bool,
    },
}

// ============================================================================
// Tests
// ============================================================================
