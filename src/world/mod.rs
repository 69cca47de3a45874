//! World providers: materialise, load, unload and delete the opaque backing
//! resource behind each island.
//!
//! Two strategies implement [`WorldProvider`] and one is picked once at
//! construction from [`WorldBackend`]:
//!
//! ```text
//! WorldProvider
//!   ├── DirectoryWorldProvider  (directory.rs) ← template copy on disk
//!   └── InMemoryWorldProvider   (memory.rs)    ← process-local
//! ```
//!
//! Both share [`Residency`] for loaded-handle bookkeeping: last access time
//! and the set of occupants. An occupied world is never unloaded.

mod directory;
mod memory;

pub use directory::DirectoryWorldProvider;
pub use memory::InMemoryWorldProvider;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::{WorldBackend, WorldConfig};
use crate::host::PlayerHost;
use crate::types::PlayerId;

/// Snapshot of a resident world. The core never looks past the name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldHandle {
    pub resource_name: String,
    pub last_access: DateTime<Utc>,
    pub occupants: usize,
}

/// Failures are logged inside the provider and surface only as `None`/`false`.
#[async_trait]
pub trait WorldProvider: Send + Sync {
    fn backend(&self) -> WorldBackend;

    /// Create a fresh world from the template and load it.
    async fn provision(&self, name: &str, owner: PlayerId) -> Option<WorldHandle>;

    /// Resident handle, or load from backing storage. `None` if storage is absent.
    async fn load(&self, name: &str) -> Option<WorldHandle>;

    /// Release an unoccupied world. Returns `false` (and does nothing) while
    /// anyone is inside.
    async fn unload(&self, name: &str) -> bool;

    /// Evacuate, release and destroy backing storage. Irreversible.
    async fn delete(&self, name: &str) -> bool;

    fn residency(&self) -> &Residency;

    fn update_access(&self, name: &str) {
        self.residency().touch(name);
    }

    fn enter(&self, name: &str, player: PlayerId) {
        self.residency().enter(name, player);
    }

    fn exit(&self, name: &str, player: &PlayerId) {
        self.residency().exit(name, player);
    }

    fn is_loaded(&self, name: &str) -> bool {
        self.residency().get(name).is_some()
    }

    /// Unload every unoccupied world idle for longer than `threshold`.
    async fn sweep_idle(&self, threshold: Duration) -> Vec<String> {
        let mut unloaded = Vec::new();
        for name in self.residency().idle(threshold) {
            if self.unload(&name).await {
                unloaded.push(name);
            }
        }
        if !unloaded.is_empty() {
            log::info!("Idle sweep unloaded {} world(s)", unloaded.len());
        }
        unloaded
    }

    /// Unload everything that can be unloaded.
    async fn unload_all(&self) -> usize {
        let mut count = 0;
        for name in self.residency().names() {
            if self.unload(&name).await {
                count += 1;
            }
        }
        count
    }
}

/// Build the provider selected by `config.backend`.
pub fn build_provider(
    config: &WorldConfig,
    host: Arc<dyn PlayerHost>,
    clock: Arc<dyn Clock>,
) -> Arc<dyn WorldProvider> {
    match config.backend {
        WorldBackend::Directory => Arc::new(DirectoryWorldProvider::new(
            config.worlds_dir.clone(),
            config.template_dir.clone(),
            config.default_pvp,
            host,
            clock,
        )),
        WorldBackend::Memory => {
            Arc::new(InMemoryWorldProvider::new(config.default_pvp, host, clock))
        }
    }
}

// ---------------------------------------------------------------------------
// Residency
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Resident {
    last_access: DateTime<Utc>,
    occupants: HashSet<PlayerId>,
}

/// Loaded-world bookkeeping shared by every provider.
pub struct Residency {
    worlds: Mutex<HashMap<String, Resident>>,
    clock: Arc<dyn Clock>,
}

impl Residency {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            worlds: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn handle(name: &str, resident: &Resident) -> WorldHandle {
        WorldHandle {
            resource_name: name.to_string(),
            last_access: resident.last_access,
            occupants: resident.occupants.len(),
        }
    }

    pub fn get(&self, name: &str) -> Option<WorldHandle> {
        self.worlds.lock().get(name).map(|r| Self::handle(name, r))
    }

    /// Mark loaded (or refresh) and return the handle.
    pub fn admit(&self, name: &str) -> WorldHandle {
        let now = self.clock.now();
        let mut worlds = self.worlds.lock();
        let resident = worlds.entry(name.to_string()).or_insert_with(|| Resident {
            last_access: now,
            occupants: HashSet::new(),
        });
        resident.last_access = now;
        Self::handle(name, resident)
    }

    /// Refresh the idle timer. No-op for a world that is not loaded.
    pub fn touch(&self, name: &str) -> bool {
        let now = self.clock.now();
        match self.worlds.lock().get_mut(name) {
            Some(resident) => {
                resident.last_access = now;
                true
            }
            None => false,
        }
    }

    pub fn enter(&self, name: &str, player: PlayerId) {
        let now = self.clock.now();
        let mut worlds = self.worlds.lock();
        let resident = worlds.entry(name.to_string()).or_insert_with(|| Resident {
            last_access: now,
            occupants: HashSet::new(),
        });
        resident.occupants.insert(player);
        resident.last_access = now;
    }

    pub fn exit(&self, name: &str, player: &PlayerId) {
        let now = self.clock.now();
        if let Some(resident) = self.worlds.lock().get_mut(name) {
            resident.occupants.remove(player);
            resident.last_access = now;
        }
    }

    pub fn occupants(&self, name: &str) -> Vec<PlayerId> {
        self.worlds
            .lock()
            .get(name)
            .map(|r| r.occupants.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Remove the resident entry if it is unoccupied.
    pub fn release_if_empty(&self, name: &str) -> bool {
        let mut worlds = self.worlds.lock();
        match worlds.get(name) {
            Some(r) if !r.occupants.is_empty() => false,
            Some(_) => {
                worlds.remove(name);
                true
            }
            None => true,
        }
    }

    /// Remove the resident entry unconditionally, returning who was inside.
    pub fn evict(&self, name: &str) -> Vec<PlayerId> {
        self.worlds
            .lock()
            .remove(name)
            .map(|r| r.occupants.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn idle(&self, threshold: Duration) -> Vec<String> {
        let now = self.clock.now();
        self.worlds
            .lock()
            .iter()
            .filter(|(_, r)| r.occupants.is_empty() && now - r.last_access > threshold)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.worlds.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.worlds.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
