//! island-coop-server binary
//!
//! Runs the island service headless: opens the store, picks the world
//! backend, restores pending invites and runs the maintenance sweeps until
//! SIGINT, then flushes everything.
//!
//! ## Configuration (CLI / env, layered over `config` crate file + `ISLANDS__*`)
//!
//! | Flag            | Env                    | Description                         |
//! |-----------------|------------------------|-------------------------------------|
//! | `--config`      | `ISLANDS_CONFIG`       | TOML config file                    |
//! | `--store`       | `ISLANDS_STORE`        | JSON store file                     |
//! | `--backend`     | `ISLANDS_BACKEND`      | `directory` or `memory`             |
//! | `--worlds-dir`  | `ISLANDS_WORLDS_DIR`   | Directory holding island worlds     |
//! | `--template`    | `ISLANDS_TEMPLATE`     | Template world directory            |

use anyhow::{Context, Result};
use clap::Parser;
use island_coop::{
    clock::SystemClock, config::WorldBackend, host::LoggingHost, IslandService, IslandsConfig,
};
use std::path::PathBuf;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "island-coop-server", about = "Island Co-op Service", version)]
struct Args {
    /// TOML config file
    #[arg(long, env = "ISLANDS_CONFIG")]
    config: Option<PathBuf>,

    /// JSON store file (in-memory if unset)
    #[arg(long, env = "ISLANDS_STORE")]
    store: Option<PathBuf>,

    /// World backend
    #[arg(long, env = "ISLANDS_BACKEND", value_enum)]
    backend: Option<WorldBackend>,

    /// Directory holding island worlds
    #[arg(long, env = "ISLANDS_WORLDS_DIR")]
    worlds_dir: Option<PathBuf>,

    /// Template world directory
    #[arg(long, env = "ISLANDS_TEMPLATE")]
    template: Option<PathBuf>,
}

impl Args {
    fn apply(self, mut config: IslandsConfig) -> IslandsConfig {
        if let Some(store) = self.store {
            config.store.path = Some(store);
        }
        if let Some(backend) = self.backend {
            config.world.backend = backend;
        }
        if let Some(dir) = self.worlds_dir {
            config.world.worlds_dir = dir;
        }
        if let Some(template) = self.template {
            config.world.template_dir = template;
        }
        config
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("island_coop=debug".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = IslandsConfig::load(args.config.as_deref()).context("Failed to load config")?;
    let config = args.apply(config);

    log::info!(
        "Starting island-coop-server (backend={:?}, store={}, cache={}, invite_ttl={}s)",
        config.world.backend,
        config
            .store
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "memory".into()),
        config.registry.cache_capacity,
        config.coop.invite_ttl_secs,
    );

    let service = IslandService::build(
        config,
        Arc::new(LoggingHost::new()),
        Arc::new(SystemClock),
    )
    .await
    .context("Failed to open island store")?;

    service
        .coop()
        .restore()
        .await
        .context("Failed to restore co-op invites")?;

    // Mirror lifecycle events into the log.
    let mut events = service.registry().bus().subscribe();
    let event_log = tokio::spawn(async move {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            match events.recv().await {
                Ok(msg) => log::debug!(
                    "{} {}",
                    msg.subject,
                    String::from_utf8_lossy(&msg.payload)
                ),
                Err(RecvError::Lagged(n)) => log::warn!("Event log lagged by {} event(s)", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let sweeps = service.spawn_maintenance();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for SIGINT")?;
    log::info!("island-coop-server shutting down (SIGINT)");

    service.shutdown().await;
    for sweep in sweeps {
        let _ = sweep.await;
    }
    event_log.abort();

    let stats = service.stats();
    log::info!(
        "Final stats: {} cached island(s), {} resident world(s)",
        stats.cached_islands,
        stats.resident_worlds
    );
    Ok(())
}
