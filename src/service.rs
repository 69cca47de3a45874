//! IslandService – wires registry, co-op service, world provider and store
//! together and drives the periodic sweeps.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::bus::EventBus;
use crate::clock::Clock;
use crate::config::IslandsConfig;
use crate::coop::CoopInviteService;
use crate::error::StoreResult;
use crate::hooks::HookRegistry;
use crate::host::PlayerHost;
use crate::registry::IslandRegistry;
use crate::store::{IslandStore, TableStore};
use crate::types::{IslandStats, PlayerId, ProfileId};
use crate::world::{build_provider, WorldProvider};

pub struct IslandService {
    config: IslandsConfig,
    registry: Arc<IslandRegistry>,
    coop: Arc<CoopInviteService>,
    worlds: Arc<dyn WorldProvider>,
    shutdown: watch::Sender<bool>,
}

impl IslandService {
    /// Open the configured store and world backend.
    pub async fn build(
        config: IslandsConfig,
        host: Arc<dyn PlayerHost>,
        clock: Arc<dyn Clock>,
    ) -> StoreResult<Self> {
        let store: Arc<dyn IslandStore> = match &config.store.path {
            Some(path) => Arc::new(TableStore::open(path).await?),
            None => Arc::new(TableStore::in_memory()),
        };
        let worlds = build_provider(&config.world, host.clone(), clock.clone());
        Ok(Self::from_parts(config, store, worlds, host, clock))
    }

    pub fn from_parts(
        config: IslandsConfig,
        store: Arc<dyn IslandStore>,
        worlds: Arc<dyn WorldProvider>,
        host: Arc<dyn PlayerHost>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registry = Arc::new(
            IslandRegistry::new(
                config.registry.clone(),
                config.visitors.clone(),
                store,
                worlds.clone(),
                host,
                clock,
            )
            .with_hooks(Arc::new(HookRegistry::new()))
            .with_bus(EventBus::default()),
        );
        let coop = Arc::new(CoopInviteService::new(config.coop.clone(), registry.clone()));
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            registry,
            coop,
            worlds,
            shutdown,
        }
    }

    pub fn registry(&self) -> &Arc<IslandRegistry> {
        &self.registry
    }

    pub fn coop(&self) -> &Arc<CoopInviteService> {
        &self.coop
    }

    pub fn worlds(&self) -> &Arc<dyn WorldProvider> {
        &self.worlds
    }

    /// Reset through the co-op service so the island's invites and vote go
    /// with it.
    pub async fn reset_island(&self, profile: ProfileId, requester: PlayerId) -> bool {
        self.coop.reset_island(profile, requester).await
    }

    pub fn stats(&self) -> IslandStats {
        IslandStats {
            pending_invites: self.coop.pending_invite_count(),
            active_votes: self.coop.active_vote_count(),
            ..self.registry.stats()
        }
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Spawn the cache, world-idle and co-op sweeps. They stop on
    /// [`IslandService::shutdown`].
    pub fn spawn_maintenance(&self) -> Vec<JoinHandle<()>> {
        let registry = self.registry.clone();
        let cache_sweep = spawn_periodic(
            "cache_sweep",
            self.config.registry.cache_sweep_interval(),
            self.shutdown.subscribe(),
            move || {
                let registry = registry.clone();
                async move {
                    registry.sweep_cache().await;
                }
            },
        );

        let worlds = self.worlds.clone();
        let idle = self.config.world.idle_threshold();
        let world_sweep = spawn_periodic(
            "world_sweep",
            self.config.world.sweep_interval(),
            self.shutdown.subscribe(),
            move || {
                let worlds = worlds.clone();
                async move {
                    worlds.sweep_idle(idle).await;
                }
            },
        );

        let coop = self.coop.clone();
        let coop_sweep = spawn_periodic(
            "coop_sweep",
            self.config.coop.sweep_interval(),
            self.shutdown.subscribe(),
            move || {
                let coop = coop.clone();
                async move {
                    coop.sweep().await;
                }
            },
        );

        vec![cache_sweep, world_sweep, coop_sweep]
    }

    /// Stop sweeps, drop invites, close visits, flush every island and
    /// release idle worlds.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        self.coop.shutdown().await;
        self.registry.shutdown().await;
        let unloaded = self.worlds.unload_all().await;
        log::info!("Island service stopped ({} world(s) unloaded)", unloaded);
    }
}

fn spawn_periodic<F, Fut>(
    task: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut run: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let period = period.max(Duration::from_secs(1));
    tokio::spawn(
        async move {
            let mut timer = tokio::time::interval(period);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            timer.tick().await;
            loop {
                tokio::select! {
                    _ = timer.tick() => run().await,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            log::debug!("{} stopped", task);
        }
        .instrument(tracing::info_span!("maintenance", task)),
    )
}
