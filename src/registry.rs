//! IslandRegistry – owns island aggregates: create, resolve, teleport, reset,
//! administration and write-back orchestration.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::bus::EventBus;
use crate::cache::{IslandCache, SharedIsland};
use crate::clock::Clock;
use crate::config::{RegistryConfig, VisitorConfig};
use crate::error::{IslandError, Result, ValidationError};
use crate::hooks::{HookEvent, HookRegistry};
use crate::host::PlayerHost;
use crate::island::{Ban, Island};
use crate::protocol::{subjects, IslandCreated, IslandReset, Notice, VisitEnded, VisitStarted};
use crate::store::IslandStore;
use crate::types::{IslandId, IslandStats, PlayerId, Pose, ProfileId};
use crate::visitors::{FinishedVisit, VisitorTracker};
use crate::world::WorldProvider;

/// How a player arrived on an island.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    Member,
    Visitor,
}

pub struct IslandRegistry {
    config: RegistryConfig,
    cache: IslandCache,
    store: Arc<dyn IslandStore>,
    worlds: Arc<dyn WorldProvider>,
    host: Arc<dyn PlayerHost>,
    hooks: Arc<HookRegistry>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
    visits: VisitorTracker,
    creating: Mutex<HashSet<ProfileId>>,
    resetting: Mutex<HashSet<ProfileId>>,
}

/// Marks a profile as mid-creation or mid-reset for the lifetime of the guard.
struct ProfileGuard<'a> {
    set: &'a Mutex<HashSet<ProfileId>>,
    profile: ProfileId,
}

impl<'a> ProfileGuard<'a> {
    /// `None` if the profile is already claimed.
    fn claim(set: &'a Mutex<HashSet<ProfileId>>, profile: ProfileId) -> Option<Self> {
        if !set.lock().insert(profile) {
            return None;
        }
        Some(Self { set, profile })
    }
}

impl Drop for ProfileGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.profile);
    }
}

impl IslandRegistry {
    pub fn new(
        config: RegistryConfig,
        visitors: VisitorConfig,
        store: Arc<dyn IslandStore>,
        worlds: Arc<dyn WorldProvider>,
        host: Arc<dyn PlayerHost>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = IslandCache::new(
            config.cache_capacity,
            config.cache_idle(),
            store.clone(),
            clock.clone(),
        );
        Self {
            config,
            cache,
            store,
            worlds,
            host,
            hooks: Arc::new(HookRegistry::new()),
            bus: EventBus::default(),
            clock,
            visits: VisitorTracker::new(visitors),
            creating: Mutex::new(HashSet::new()),
            resetting: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<HookRegistry>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    // -----------------------------------------------------------------------
    // Collaborators
    // -----------------------------------------------------------------------

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn host(&self) -> &Arc<dyn PlayerHost> {
        &self.host
    }

    pub fn worlds(&self) -> &Arc<dyn WorldProvider> {
        &self.worlds
    }

    pub fn store(&self) -> &Arc<dyn IslandStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn visits(&self) -> &VisitorTracker {
        &self.visits
    }

    pub fn cache(&self) -> &IslandCache {
        &self.cache
    }

    // -----------------------------------------------------------------------
    // Create + resolve
    // -----------------------------------------------------------------------

    /// Provision a new island owned by `owner` for `profile`.
    ///
    /// Nothing is persisted or cached unless provisioning succeeds.
    pub async fn create_island(&self, profile: ProfileId, owner: PlayerId) -> Result<SharedIsland> {
        let Some(_guard) = ProfileGuard::claim(&self.creating, profile) else {
            return Err(IslandError::AlreadyExists(profile));
        };

        if self.cache.contains(profile) || self.store.island_exists(profile).await? {
            return Err(IslandError::AlreadyExists(profile));
        }

        self.hooks.dispatch(&HookEvent::IslandCreate { profile, owner })?;

        let id = IslandId::new();
        let name = id.resource_name();
        if self.worlds.provision(&name, owner).await.is_none() {
            return Err(IslandError::ProvisionFailed(name));
        }

        let now = self.clock.now();
        let island = SharedIsland::new(Island::new(
            id,
            profile,
            owner,
            self.config.default_size,
            self.config.default_guest_limit,
            now,
        ));

        if let Err(e) = island.write_back(self.store.as_ref()).await {
            log::error!("Failed to persist new island {}: {}", id, e);
        }
        let island = self.cache.insert(island).await;

        log::info!("Created island {} ('{}') for profile {}", id, name, profile);
        self.bus.publish(
            subjects::ISLAND_CREATED,
            now,
            IslandCreated {
                island_id: id,
                profile_id: profile,
                owner_id: owner,
                resource_name: name,
            },
        );
        Ok(island)
    }

    fn is_resetting(&self, profile: ProfileId) -> bool {
        self.resetting.lock().contains(&profile)
    }

    /// Cache first, then one fan-out load from the store.
    ///
    /// A profile being reset resolves to `None`. A cached island caught
    /// mid-eviction is waited out and loaded again.
    pub async fn get_island(&self, profile: ProfileId) -> Result<Option<SharedIsland>> {
        loop {
            if self.is_resetting(profile) {
                return Ok(None);
            }
            let island = match self.cache.get(profile) {
                Some(island) => island,
                None => {
                    let Some(mut loaded) = self.store.load_island(profile).await? else {
                        return Ok(None);
                    };
                    if self.is_resetting(profile) {
                        return Ok(None);
                    }
                    // Visitors are not persisted; open sessions still count.
                    loaded
                        .current_visitors
                        .extend(self.visits.visitors_on(loaded.id));
                    log::debug!("Loaded island {} from store", loaded.id);
                    self.cache.insert(SharedIsland::new(loaded)).await
                }
            };
            if !island.is_retired() {
                return Ok(Some(island));
            }
            island.settled().await;
            tokio::task::yield_now().await;
        }
    }

    pub async fn get_island_by_id(&self, id: IslandId) -> Result<Option<SharedIsland>> {
        let profile = match self.cache.find_by_id(id) {
            Some(island) if !island.is_retired() => return Ok(Some(island)),
            Some(island) => island.profile_id(),
            None => match self.store.find_profile(id).await? {
                Some(profile) => profile,
                None => return Ok(None),
            },
        };
        Ok(self
            .get_island(profile)
            .await?
            .filter(|island| island.id() == id))
    }

    /// The live handle for `island`: itself, or the copy loaded after it was
    /// evicted. Fails with [`IslandError::NotFound`] if the island is gone.
    pub async fn current(&self, island: &SharedIsland) -> Result<SharedIsland> {
        if !island.is_retired() {
            return Ok(island.clone());
        }
        self.get_island_by_id(island.id())
            .await?
            .ok_or_else(|| IslandError::not_found("island"))
    }

    // -----------------------------------------------------------------------
    // Teleport + visits
    // -----------------------------------------------------------------------

    /// Move `player` onto `island`.
    ///
    /// The entry gate runs before any world I/O. Non-members are registered
    /// as visitors and get an open [`VisitorSession`](crate::visitors::VisitorSession).
    pub async fn teleport(&self, player: PlayerId, island: &SharedIsland) -> Result<Arrival> {
        island.ensure_live()?;
        let (as_member, name, spawn) = {
            let state = island.read();
            state.check_entry(&player)?;
            let as_member = state.is_member(&player);
            self.hooks.dispatch(&HookEvent::IslandTeleport {
                player,
                island: &state,
                as_member,
            })?;
            (as_member, state.resource_name.clone(), state.spawn)
        };

        if self.worlds.load(&name).await.is_none() {
            return Err(IslandError::ProvisionFailed(name));
        }

        if let Some(previous) = self.host.current_world(&player) {
            if previous != name {
                self.player_left(player).await;
            }
        }

        let now = self.clock.now();
        {
            let mut state = island.write_live()?;
            // Visitors may have arrived while the world was loading.
            state.check_entry(&player)?;
            state.last_accessed = now;
            if !as_member {
                state.add_visitor(player, now);
            }
        }

        self.host.move_to(&player, &name, spawn);
        self.worlds.enter(&name, player);

        if as_member {
            return Ok(Arrival::Member);
        }

        if let Some(previous) = self.visits.start(island.id(), player, now) {
            let done = self.visits.finish(previous, now);
            self.close_visit(done).await;
        }
        self.bus.publish(
            subjects::VISIT_STARTED,
            now,
            VisitStarted {
                island_id: island.id(),
                visitor_id: player,
            },
        );
        Ok(Arrival::Visitor)
    }

    /// The player disconnected or moved to a different world.
    pub async fn player_left(&self, player: PlayerId) -> Option<FinishedVisit> {
        if let Some(world) = self.host.current_world(&player) {
            self.worlds.exit(&world, &player);
        }
        self.end_visit(player).await
    }

    /// Close the player's visitor session, crediting the owner.
    pub async fn end_visit(&self, player: PlayerId) -> Option<FinishedVisit> {
        let done = self.visits.end(&player, self.clock.now())?;
        self.close_visit(done).await;
        Some(done)
    }

    async fn close_visit(&self, done: FinishedVisit) {
        let island = match self.get_island_by_id(done.session.island_id).await {
            Ok(Some(island)) => island,
            Ok(None) => return,
            Err(e) => {
                log::error!("Failed to resolve island for finished visit: {}", e);
                return;
            }
        };
        self.credit_visit(&island, done);
        self.save_island(&island);
    }

    /// Record the finished visit on `island`, reward its owner and announce it.
    fn credit_visit(&self, island: &SharedIsland, done: FinishedVisit) {
        let owner = match island.write_live() {
            Ok(mut state) => {
                state.remove_visitor(&done.session.visitor_id, done.seconds);
                state.owner()
            }
            Err(_) => island.read().owner(),
        };

        if let (Some(owner), true) = (owner, done.owner_xp > 0.0) {
            self.host.award_social_xp(&owner, done.owner_xp);
            self.host.notify(
                &owner,
                &Notice::VisitReward {
                    visitor: done.session.visitor_id,
                    xp: done.owner_xp,
                },
            );
        }

        log::debug!(
            "Visit of {} to {} ended after {}s ({:.1} XP)",
            done.session.visitor_id,
            done.session.island_id,
            done.seconds,
            done.owner_xp
        );
        self.bus.publish(
            subjects::VISIT_ENDED,
            self.clock.now(),
            VisitEnded {
                island_id: done.session.island_id,
                visitor_id: done.session.visitor_id,
                seconds: done.seconds,
                owner_xp: done.owner_xp,
            },
        );
    }

    /// Send `player` to the hub if they are inside `island`'s world.
    pub async fn evict_player(&self, player: PlayerId, island: &SharedIsland) -> bool {
        let name = island.read().resource_name.clone();
        if self.host.current_world(&player).as_deref() != Some(name.as_str()) {
            return false;
        }
        self.worlds.exit(&name, &player);
        self.host.send_to_hub(&player);
        self.end_visit(player).await;
        true
    }

    // -----------------------------------------------------------------------
    // Reset
    // -----------------------------------------------------------------------

    /// Destroy the island: world, cache entry and every persisted row.
    ///
    /// Returns `false` with no side effects if the island is missing or the
    /// requester is not the owner.
    pub async fn reset_island(&self, profile: ProfileId, requester: PlayerId) -> bool {
        let island = match self.get_island(profile).await {
            Ok(Some(island)) => island,
            Ok(None) => return false,
            Err(e) => {
                log::error!("Failed to resolve island for reset: {}", e);
                return false;
            }
        };

        let (name, members) = {
            let state = island.read();
            if !state.is_owner(&requester) {
                return false;
            }
            let members: Vec<PlayerId> = state.members.keys().copied().collect();
            (state.resource_name.clone(), members)
        };
        // Resolves of this profile see nothing until the reset is complete.
        let Some(_guard) = ProfileGuard::claim(&self.resetting, profile) else {
            return false;
        };

        let now = self.clock.now();
        for done in self.visits.end_island(island.id(), now) {
            self.credit_visit(&island, done);
        }

        if !self.worlds.delete(&name).await {
            log::warn!("World '{}' could not be fully deleted during reset", name);
        }
        if let Err(e) = island.delete_from(self.store.as_ref()).await {
            log::error!("Failed to delete rows of island {}: {}", island.id(), e);
        }
        if let Some(other) = self.cache.invalidate(profile) {
            if !other.ptr_eq(&island) {
                // A copy loaded before the reset began; retire it too.
                if let Err(e) = other.delete_from(self.store.as_ref()).await {
                    log::error!("Failed to retire stale copy of island {}: {}", other.id(), e);
                }
            }
        }

        for member in &members {
            self.host.notify(
                member,
                &Notice::IslandReset {
                    island_id: island.id(),
                },
            );
        }
        log::info!("Reset island {} of profile {}", island.id(), profile);
        self.bus.publish(
            subjects::ISLAND_RESET,
            now,
            IslandReset {
                island_id: island.id(),
                profile_id: profile,
            },
        );
        true
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Fire-and-forget full-aggregate write-back. Failures are logged; the
    /// in-memory state is kept either way.
    pub fn save_island(&self, island: &SharedIsland) -> JoinHandle<()> {
        let island = island.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = island.write_back(store.as_ref()).await {
                log::error!("Failed to save island {}: {}", island.id(), e);
            }
        })
    }

    /// Awaited write-back.
    pub async fn flush_island(&self, island: &SharedIsland) -> Result<()> {
        island.write_back(self.store.as_ref()).await?;
        Ok(())
    }

    pub async fn sweep_cache(&self) -> usize {
        let evicted = self.cache.sweep_idle().await;
        if evicted > 0 {
            log::debug!("Cache sweep evicted {} island(s)", evicted);
        }
        evicted
    }

    /// End every open visit (with partial reward) and flush every island.
    pub async fn shutdown(&self) {
        let now = self.clock.now();
        let open = self.visits.drain(now);
        let ended = open.len();
        for done in open {
            self.close_visit(done).await;
        }
        let flushed = self.cache.flush_all().await;
        log::info!(
            "Island registry shut down ({} visit(s) closed, {} island(s) flushed)",
            ended,
            flushed
        );
    }

    // -----------------------------------------------------------------------
    // Administration (owner only)
    // -----------------------------------------------------------------------

    async fn administer<F>(
        &self,
        profile: ProfileId,
        requester: PlayerId,
        apply: F,
    ) -> Result<SharedIsland>
    where
        F: FnOnce(&mut Island) -> std::result::Result<(), ValidationError>,
    {
        let island = self
            .get_island(profile)
            .await?
            .ok_or_else(|| IslandError::not_found("island"))?;
        {
            let mut state = island.write_live()?;
            if !state.is_owner(&requester) {
                return Err(ValidationError::NotOwner.into());
            }
            apply(&mut state)?;
        }
        self.save_island(&island);
        Ok(island)
    }

    pub async fn set_public(
        &self,
        profile: ProfileId,
        requester: PlayerId,
        public: bool,
    ) -> Result<()> {
        self.administer(profile, requester, |island| {
            island.is_public = public;
            Ok(())
        })
        .await
        .map(|_| ())
    }

    pub async fn set_pvp(
        &self,
        profile: ProfileId,
        requester: PlayerId,
        enabled: bool,
    ) -> Result<()> {
        self.administer(profile, requester, |island| {
            island.pvp_enabled = enabled;
            Ok(())
        })
        .await
        .map(|_| ())
    }

    pub async fn set_guest_limit(
        &self,
        profile: ProfileId,
        requester: PlayerId,
        limit: u32,
    ) -> Result<()> {
        self.administer(profile, requester, |island| {
            island.guest_limit = limit;
            Ok(())
        })
        .await
        .map(|_| ())
    }

    pub async fn set_spawn(
        &self,
        profile: ProfileId,
        requester: PlayerId,
        spawn: Pose,
    ) -> Result<()> {
        self.administer(profile, requester, |island| {
            island.spawn = spawn;
            Ok(())
        })
        .await
        .map(|_| ())
    }

    pub async fn set_setting(
        &self,
        profile: ProfileId,
        requester: PlayerId,
        key: &str,
        value: &str,
    ) -> Result<()> {
        self.administer(profile, requester, |island| {
            island.set_setting(key, value);
            Ok(())
        })
        .await
        .map(|_| ())
    }

    /// Ban a non-member and eject them if they are on the island.
    pub async fn ban_player(
        &self,
        profile: ProfileId,
        requester: PlayerId,
        target: PlayerId,
        reason: Option<String>,
    ) -> Result<()> {
        let now = self.clock.now();
        let island = self
            .administer(profile, requester, |island| {
                if island.is_member(&target) {
                    return Err(ValidationError::CannotBanMember);
                }
                island.banned_players.insert(
                    target,
                    Ban {
                        banned_by: requester,
                        banned_at: now,
                        reason,
                    },
                );
                Ok(())
            })
            .await?;

        if self.evict_player(target, &island).await {
            self.host.notify(
                &target,
                &Notice::BannedFromIsland {
                    island_id: island.id(),
                },
            );
        }
        Ok(())
    }

    /// Returns whether a ban was lifted.
    pub async fn unban_player(
        &self,
        profile: ProfileId,
        requester: PlayerId,
        target: PlayerId,
    ) -> Result<bool> {
        let mut lifted = false;
        self.administer(profile, requester, |island| {
            lifted = island.banned_players.remove(&target).is_some();
            Ok(())
        })
        .await?;
        Ok(lifted)
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    pub fn stats(&self) -> IslandStats {
        IslandStats {
            cached_islands: self.cache.len(),
            resident_worlds: self.worlds.residency().len(),
            open_visits: self.visits.len(),
            ..Default::default()
        }
    }
}
