//! Write-back island cache.
//!
//! An explicit arena of [`SharedIsland`]s keyed by profile. Capacity pressure
//! and idle expiry both go through [`IslandCache::evict_and_flush`], which
//! writes the island back to the store **before** the slot is released.

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{IslandError, Result, StoreResult};
use crate::island::Island;
use crate::store::IslandStore;
use crate::types::{IslandId, ProfileId};

// ---------------------------------------------------------------------------
// SharedIsland
// ---------------------------------------------------------------------------

struct IslandCell {
    id: IslandId,
    profile_id: ProfileId,
    state: RwLock<Island>,
    /// Serialises write-backs: each holder snapshots the state it writes, so
    /// the last write to finish carries the newest state.
    write_gate: tokio::sync::Mutex<()>,
    /// Set once the island is evicted or deleted. A retired handle is stale:
    /// write-backs through it are dropped and [`SharedIsland::write_live`]
    /// refuses it.
    retired: AtomicBool,
}

/// A cached island. Cloning shares the same aggregate.
///
/// The inner lock is the per-island mutex for membership and settings; it
/// must never be held across an `.await`.
#[derive(Clone)]
pub struct SharedIsland(Arc<IslandCell>);

impl SharedIsland {
    pub fn new(island: Island) -> Self {
        Self(Arc::new(IslandCell {
            id: island.id,
            profile_id: island.profile_id,
            state: RwLock::new(island),
            write_gate: tokio::sync::Mutex::new(()),
            retired: AtomicBool::new(false),
        }))
    }

    pub fn is_retired(&self) -> bool {
        self.0.retired.load(Ordering::SeqCst)
    }

    pub fn id(&self) -> IslandId {
        self.0.id
    }

    pub fn profile_id(&self) -> ProfileId {
        self.0.profile_id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Island> {
        self.0.state.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Island> {
        self.0.state.write()
    }

    /// Write access for a mutation that must reach the store. Retirement is
    /// checked under the lock, so a mutation either lands before the final
    /// snapshot or fails with [`IslandError::NotFound`].
    pub fn write_live(&self) -> Result<RwLockWriteGuard<'_, Island>> {
        let state = self.0.state.write();
        if self.is_retired() {
            return Err(IslandError::not_found("island"));
        }
        Ok(state)
    }

    pub fn ensure_live(&self) -> Result<()> {
        if self.is_retired() {
            return Err(IslandError::not_found("island"));
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Island {
        self.0.state.read().clone()
    }

    pub fn ptr_eq(&self, other: &SharedIsland) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Persist the full aggregate.
    pub async fn write_back(&self, store: &dyn IslandStore) -> StoreResult<()> {
        let _gate = self.0.write_gate.lock().await;
        if self.is_retired() {
            return Ok(());
        }
        let snapshot = self.snapshot();
        store.save_island(&snapshot).await
    }

    /// Take a final snapshot, retire the handle and persist the snapshot.
    /// Does nothing if the handle is already retired.
    pub async fn retire_and_flush(&self, store: &dyn IslandStore) -> StoreResult<()> {
        let _gate = self.0.write_gate.lock().await;
        let snapshot = {
            let state = self.0.state.write();
            if self.0.retired.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            state.clone()
        };
        store.save_island(&snapshot).await
    }

    /// Retire the island and delete its rows. No write-back queued before or
    /// after this call can resurrect them.
    pub async fn delete_from(&self, store: &dyn IslandStore) -> StoreResult<()> {
        let _gate = self.0.write_gate.lock().await;
        {
            let _state = self.0.state.write();
            self.0.retired.store(true, Ordering::SeqCst);
        }
        store.delete_island(self.0.id).await
    }

    /// Wait until no write-back is in flight.
    pub async fn settled(&self) {
        drop(self.0.write_gate.lock().await);
    }
}

impl std::fmt::Debug for SharedIsland {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedIsland")
            .field("id", &self.0.id)
            .field("profile_id", &self.0.profile_id)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// IslandCache
// ---------------------------------------------------------------------------

struct Slot {
    island: SharedIsland,
    last_access: DateTime<Utc>,
}

pub struct IslandCache {
    slots: Mutex<HashMap<ProfileId, Slot>>,
    capacity: usize,
    idle: Duration,
    store: Arc<dyn IslandStore>,
    clock: Arc<dyn Clock>,
}

impl IslandCache {
    pub fn new(
        capacity: usize,
        idle: Duration,
        store: Arc<dyn IslandStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            idle,
            store,
            clock,
        }
    }

    /// Cached island for `profile`, refreshing its idle timer.
    pub fn get(&self, profile: ProfileId) -> Option<SharedIsland> {
        let now = self.clock.now();
        self.slots.lock().get_mut(&profile).map(|slot| {
            slot.last_access = now;
            slot.island.clone()
        })
    }

    pub fn find_by_id(&self, id: IslandId) -> Option<SharedIsland> {
        let now = self.clock.now();
        self.slots
            .lock()
            .values_mut()
            .find(|slot| slot.island.id() == id)
            .map(|slot| {
                slot.last_access = now;
                slot.island.clone()
            })
    }

    pub fn contains(&self, profile: ProfileId) -> bool {
        self.slots.lock().contains_key(&profile)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn islands(&self) -> Vec<SharedIsland> {
        self.slots
            .lock()
            .values()
            .map(|slot| slot.island.clone())
            .collect()
    }

    /// Insert, making room first. If another task cached the same profile in
    /// the meantime, that entry wins and is returned.
    pub async fn insert(&self, island: SharedIsland) -> SharedIsland {
        let profile = island.profile_id();
        loop {
            let victim = {
                let mut slots = self.slots.lock();
                if let Some(existing) = slots.get(&profile) {
                    return existing.island.clone();
                }
                if slots.len() < self.capacity {
                    slots.insert(
                        profile,
                        Slot {
                            island: island.clone(),
                            last_access: self.clock.now(),
                        },
                    );
                    return island;
                }
                slots
                    .iter()
                    .min_by_key(|(_, slot)| slot.last_access)
                    .map(|(p, _)| *p)
            };

            match victim {
                Some(victim) => {
                    log::debug!("Cache full, evicting island of profile {}", victim);
                    self.evict_and_flush(victim).await;
                }
                None => return island,
            }
        }
    }

    /// Retire the island and write it back, then release its slot.
    ///
    /// Handles to the evicted island go stale; the next resolve loads a
    /// fresh copy. The slot is only released if it still holds the island
    /// that was flushed. Returns whether a slot was released.
    pub async fn evict_and_flush(&self, profile: ProfileId) -> bool {
        let Some(island) = self
            .slots
            .lock()
            .get(&profile)
            .map(|slot| slot.island.clone())
        else {
            return false;
        };

        if let Err(e) = island.retire_and_flush(self.store.as_ref()).await {
            log::error!(
                "Write-back of island {} failed during eviction: {}",
                island.id(),
                e
            );
        }

        let mut slots = self.slots.lock();
        match slots.get(&profile) {
            Some(slot) if slot.island.ptr_eq(&island) => {
                slots.remove(&profile);
                log::debug!("Evicted island {} (profile {})", island.id(), profile);
                true
            }
            _ => false,
        }
    }

    /// Evict every island idle longer than the configured threshold.
    pub async fn sweep_idle(&self) -> usize {
        let now = self.clock.now();
        let idle: Vec<ProfileId> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| now - slot.last_access > self.idle)
            .map(|(p, _)| *p)
            .collect();

        let mut evicted = 0;
        for profile in idle {
            if self.evict_and_flush(profile).await {
                evicted += 1;
            }
        }
        evicted
    }

    /// Drop without writing back. Used when the island itself is deleted.
    pub fn invalidate(&self, profile: ProfileId) -> Option<SharedIsland> {
        self.slots.lock().remove(&profile).map(|slot| slot.island)
    }

    /// Write back and release every slot.
    pub async fn flush_all(&self) -> usize {
        let profiles: Vec<ProfileId> = self.slots.lock().keys().copied().collect();
        let mut flushed = 0;
        for profile in profiles {
            if self.evict_and_flush(profile).await {
                flushed += 1;
            }
        }
        flushed
    }
}
