//! Command-line interface for ConceptDB.
//!
//! - [`cli`]: clap argument and command definitions
//! - [`config`]: `ConceptDbConfig`, loaded from TOML files and environment
//! - [`config_handlers`]: `conceptdb config ...` subcommands
//! - [`app`]: Command dispatch over a [`conceptdb::ConceptDb`]

pub mod app;
pub mod cli;
pub mod config;
pub mod config_handlers;

pub use app::ConceptDbCli;
pub use cli::{CliArgs, Command, ConfigAction, ConfigCommand};
pub use config::ConceptDbConfig;
