//! The ConceptDB CLI application.
//!
//! Stores are in memory: each invocation seeds the precise store from the
//! configured dataset and restores the evolution phase from
//! `<state_dir>/phase.json`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use conceptdb::conceptdb_core::adapters::{Dataset, MemoryPreciseStore};
use conceptdb::conceptdb_evolution::JsonPhaseStore;
use conceptdb::{ConceptDb, Error, Result, RouteOptions};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::cli::{CliArgs, Command};
use crate::config::ConceptDbConfig;
use crate::config_handlers;

// ============================================================================
// ConceptDbCli
// ============================================================================

/// CLI application over a loaded configuration.
pub struct ConceptDbCli {
    config: ConceptDbConfig,
    version: String,
}

impl ConceptDbCli {
    /// Create from CLI args, loading config from file/env.
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let config = ConceptDbConfig::load(args.config.as_deref())?;
        Ok(Self::new(config))
    }

    /// Create an application over `config`.
    pub fn new(config: ConceptDbConfig) -> Self {
        Self {
            config,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// The loaded configuration.
    pub fn config(&self) -> &ConceptDbConfig {
        &self.config
    }

    /// Initialise tracing-based logging.
    ///
    /// Uses `RUST_LOG` env var if set, otherwise defaults based on verbosity flags.
    pub fn init_logging(&self, verbose: bool, quiet: bool) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if quiet {
            EnvFilter::new("warn")
        } else if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        };

        // A subscriber may already be set (e.g. in tests).
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }

    /// Run the CLI with the given arguments.
    pub async fn run(&self, args: CliArgs) -> Result<()> {
        self.init_logging(args.verbose, args.quiet);

        let Some(command) = args.command else {
            println!("conceptdb {} (use --help for usage)", self.version);
            return Ok(());
        };

        match command {
            Command::Version => {
                println!("conceptdb {}", self.version);
                Ok(())
            }
            Command::Config(config_cmd) => {
                config_handlers::handle_config_command(args.config.as_deref(), config_cmd.command)
            }
            Command::Route {
                query,
                limit,
                prefer,
            } => {
                let db = self.open().await?;
                let response = db.route_with(&query, RouteOptions { limit, prefer }).await;
                print_json(&response)
            }
            Command::Explain { query, prefer } => {
                let db = self.open().await?;
                print_json(&db.explain(&query, prefer).await)
            }
            Command::Stats {
                window_secs,
                queries,
                days,
            } => {
                let db = self.open().await?;
                if let Some(path) = queries {
                    replay_queries(&db, &path).await?;
                }
                let stats = db.routing_stats(window_secs.map(Duration::from_secs)).await;
                match days {
                    Some(days) => print_json(&serde_json::json!({
                        "stats": stats,
                        "timeline": db.routing_timeline(days).await,
                    })),
                    None => print_json(&stats),
                }
            }
            Command::Status => {
                let db = self.open().await?;
                print_json(&serde_json::json!({
                    "evolution": db.evolution_status().await,
                    "sync": db.sync_status().await,
                }))
            }
            Command::Evolve { target, force } => {
                let db = self.open().await?;
                let outcome = db.trigger_evolution(target, force).await;
                tracing::info!("{}", outcome.message());
                print_json(&outcome)
            }
            Command::Sync {
                direction,
                force,
                tables,
            } => {
                let db = self.open().await?;
                let report = if tables.is_empty() {
                    db.trigger_sync(direction, force).await
                } else {
                    db.trigger_sync_tables(direction, &tables, force).await
                };
                print_json(&report)
            }
        }
    }

    /// Assemble a [`ConceptDb`] from the configuration.
    pub async fn open(&self) -> Result<ConceptDb> {
        let precise = match &self.config.dataset_path {
            Some(path) => {
                let dataset = Dataset::load(Path::new(path))?;
                tracing::debug!(
                    "Loaded {} table(s) from {path}",
                    dataset.tables.len()
                );
                MemoryPreciseStore::from_dataset(dataset)
            }
            None => {
                tracing::warn!("No dataset_path configured; starting with an empty precise store");
                MemoryPreciseStore::new()
            }
        };
        let state_dir = self.config.state_dir()?;

        Ok(ConceptDb::builder()
            .precise_store(Arc::new(precise))
            .phase_store(Arc::new(JsonPhaseStore::in_dir(state_dir)))
            .router_config(self.config.router.clone())
            .sync_config(self.config.sync.clone())
            .evolution_config(self.config.evolution.clone())
            .build()
            .await)
    }
}

/// Route every non-empty line of `path`.
async fn replay_queries(db: &ConceptDb, path: &Path) -> Result<usize> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::io_with_path(e, path))?;
    let mut routed = 0;
    for query in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        db.route(query).await;
        routed += 1;
    }
    tracing::info!("Routed {routed} queries from {}", path.display());
    Ok(routed)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
