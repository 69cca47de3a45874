//! Shared fixture for the integration tests.

#![allow(dead_code)]

use island_coop::clock::ManualClock;
use island_coop::config::IslandsConfig;
use island_coop::host::RecordingHost;
use island_coop::{
    CoopInviteService, InMemoryWorldProvider, IslandRegistry, IslandStore, PlayerId, ProfileId,
    SharedIsland, TableStore,
};
use std::sync::Arc;

pub struct Harness {
    pub registry: Arc<IslandRegistry>,
    pub coop: Arc<CoopInviteService>,
    pub store: Arc<TableStore>,
    pub worlds: Arc<InMemoryWorldProvider>,
    pub host: Arc<RecordingHost>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(IslandsConfig::default())
    }

    pub fn with_config(config: IslandsConfig) -> Self {
        Self::with_store(config, |store| store as Arc<dyn IslandStore>)
    }

    /// The registry sees `wrap(store)`; `Harness::store` stays the inner table
    /// store so tests can inspect rows directly.
    pub fn with_store<F>(config: IslandsConfig, wrap: F) -> Self
    where
        F: FnOnce(Arc<TableStore>) -> Arc<dyn IslandStore>,
    {
        let store = Arc::new(TableStore::in_memory());
        let host = Arc::new(RecordingHost::new());
        let clock = Arc::new(ManualClock::default());
        let worlds = Arc::new(InMemoryWorldProvider::new(
            config.world.default_pvp,
            host.clone(),
            clock.clone(),
        ));
        let registry = Arc::new(IslandRegistry::new(
            config.registry.clone(),
            config.visitors.clone(),
            wrap(store.clone()),
            worlds.clone(),
            host.clone(),
            clock.clone(),
        ));
        let coop = Arc::new(CoopInviteService::new(config.coop.clone(), registry.clone()));

        Self {
            registry,
            coop,
            store,
            worlds,
            host,
            clock,
        }
    }

    /// A fresh island and its owner.
    pub async fn island(&self) -> (SharedIsland, PlayerId) {
        let owner = PlayerId::new();
        let island = self
            .registry
            .create_island(ProfileId::new(), owner)
            .await
            .unwrap();
        (island, owner)
    }

    /// A public island with the default guest limit.
    pub async fn public_island(&self) -> (SharedIsland, PlayerId) {
        let (island, owner) = self.island().await;
        self.registry
            .set_public(island.profile_id(), owner, true)
            .await
            .unwrap();
        (island, owner)
    }

    /// Invite and accept `player` onto `island`.
    pub async fn join(&self, island: &SharedIsland, inviter: PlayerId, player: PlayerId) {
        self.coop.send_invite(inviter, player, island).await.unwrap();
        self.coop.accept_invite(player).await.unwrap();
    }

    /// An island owned by the first returned player with `extra` co-op members.
    pub async fn crew(&self, extra: usize) -> (SharedIsland, PlayerId, Vec<PlayerId>) {
        let (island, owner) = self.island().await;
        let mut members = Vec::new();
        for _ in 0..extra {
            let p = PlayerId::new();
            self.join(&island, owner, p).await;
            members.push(p);
        }
        (island, owner, members)
    }
}
