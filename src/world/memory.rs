//! Process-local worlds. Nothing touches the disk; storage is a name set.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::{Residency, WorldHandle, WorldProvider};
use crate::clock::Clock;
use crate::config::WorldBackend;
use crate::host::PlayerHost;
use crate::types::{PlayerId, WorldRules};

pub struct InMemoryWorldProvider {
    stored: Mutex<HashSet<String>>,
    rules: WorldRules,
    host: Arc<dyn PlayerHost>,
    residency: Residency,
    fail_provision: AtomicBool,
    provision_calls: AtomicUsize,
    load_calls: AtomicUsize,
}

impl InMemoryWorldProvider {
    pub fn new(default_pvp: bool, host: Arc<dyn PlayerHost>, clock: Arc<dyn Clock>) -> Self {
        Self {
            stored: Mutex::new(HashSet::new()),
            rules: WorldRules::with_pvp(default_pvp),
            host,
            residency: Residency::new(clock),
            fail_provision: AtomicBool::new(false),
            provision_calls: AtomicUsize::new(0),
            load_calls: AtomicUsize::new(0),
        }
    }

    pub fn rules(&self) -> WorldRules {
        self.rules
    }

    /// Make subsequent provisioning attempts fail.
    pub fn set_fail_provision(&self, fail: bool) {
        self.fail_provision.store(fail, Ordering::SeqCst);
    }

    pub fn provision_calls(&self) -> usize {
        self.provision_calls.load(Ordering::SeqCst)
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.stored.lock().contains(name)
    }

    pub fn stored_count(&self) -> usize {
        self.stored.lock().len()
    }
}

#[async_trait]
impl WorldProvider for InMemoryWorldProvider {
    fn backend(&self) -> WorldBackend {
        WorldBackend::Memory
    }

    async fn provision(&self, name: &str, owner: PlayerId) -> Option<WorldHandle> {
        self.provision_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_provision.load(Ordering::SeqCst) {
            log::error!("Failed to provision world '{}' for {}: injected failure", name, owner);
            return None;
        }
        if !self.stored.lock().insert(name.to_string()) {
            log::warn!("Refusing to provision '{}': already exists", name);
            return None;
        }
        log::info!("Provisioned in-memory world '{}' for {}", name, owner);
        Some(self.residency.admit(name))
    }

    async fn load(&self, name: &str) -> Option<WorldHandle> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if self.residency.touch(name) {
            return self.residency.get(name);
        }
        if !self.exists(name) {
            log::debug!("World '{}' not found", name);
            return None;
        }
        Some(self.residency.admit(name))
    }

    async fn unload(&self, name: &str) -> bool {
        self.residency.release_if_empty(name)
    }

    async fn delete(&self, name: &str) -> bool {
        for player in self.residency.evict(name) {
            self.host.send_to_hub(&player);
        }
        self.stored.lock().remove(name);
        true
    }

    fn residency(&self) -> &Residency {
        &self.residency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::host::RecordingHost;
    use chrono::Duration;

    fn provider() -> (InMemoryWorldProvider, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (
            InMemoryWorldProvider::new(false, Arc::new(RecordingHost::new()), clock.clone()),
            clock,
        )
    }

    #[tokio::test]
    async fn unload_never_evicts_occupied() {
        let (provider, _) = provider();
        let p = PlayerId::new();
        provider.provision("w", p).await.unwrap();
        provider.enter("w", p);

        assert!(!provider.unload("w").await);
        assert!(provider.is_loaded("w"));

        provider.exit("w", &p);
        assert!(provider.unload("w").await);
        assert!(!provider.is_loaded("w"));
        // Storage survives an unload.
        assert!(provider.load("w").await.is_some());
    }

    #[tokio::test]
    async fn idle_sweep_unloads_only_idle_unoccupied() {
        let (provider, clock) = provider();
        let p = PlayerId::new();
        provider.provision("idle", p).await.unwrap();
        provider.provision("busy", p).await.unwrap();
        provider.provision("fresh", p).await.unwrap();
        provider.enter("busy", p);

        clock.advance(Duration::minutes(11));
        provider.update_access("fresh");

        let unloaded = provider.sweep_idle(Duration::minutes(10)).await;
        assert_eq!(unloaded, vec!["idle".to_string()]);
        assert!(provider.is_loaded("busy"));
        assert!(provider.is_loaded("fresh"));
    }

    #[tokio::test]
    async fn injected_failure_returns_none() {
        let (provider, _) = provider();
        provider.set_fail_provision(true);
        assert!(provider.provision("w", PlayerId::new()).await.is_none());
        assert!(!provider.exists("w"));
        assert_eq!(provider.provision_calls(), 1);
    }

    #[test]
    fn default_rules_profile() {
        let (provider, _) = provider();
        assert_eq!(provider.rules(), WorldRules::default());
        assert_eq!(provider.backend(), WorldBackend::Memory);
    }
}
