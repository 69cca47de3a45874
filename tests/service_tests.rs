//! IslandService tests: backend wiring, stats, maintenance and shutdown.

#[cfg(test)]
mod tests {
    use island_coop::clock::ManualClock;
    use island_coop::config::{IslandsConfig, WorldBackend};
    use island_coop::host::RecordingHost;
    use island_coop::{IslandService, IslandStore, PlayerId, ProfileId, TableStore};
    use std::path::Path;
    use std::sync::Arc;

    async fn make_service(config: IslandsConfig) -> IslandService {
        IslandService::build(
            config,
            Arc::new(RecordingHost::new()),
            Arc::new(ManualClock::default()),
        )
        .await
        .unwrap()
    }

    fn memory_config() -> IslandsConfig {
        let mut config = IslandsConfig::default();
        config.world.backend = WorldBackend::Memory;
        config
    }

    fn directory_config(root: &Path) -> IslandsConfig {
        let template = root.join("template");
        std::fs::create_dir_all(template.join("region")).unwrap();
        std::fs::write(template.join("level.dat"), b"level").unwrap();
        std::fs::write(template.join("region").join("r.0.0.mca"), b"chunk").unwrap();
        std::fs::write(template.join("session.lock"), b"lock").unwrap();

        let mut config = IslandsConfig::default();
        config.world.backend = WorldBackend::Directory;
        config.world.template_dir = template;
        config.world.worlds_dir = root.join("worlds");
        config
    }

    // -----------------------------------------------------------------------
    // Wiring
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn memory_backend_is_selected_from_config() {
        let service = make_service(memory_config()).await;
        assert_eq!(service.worlds().backend(), WorldBackend::Memory);
    }

    #[tokio::test]
    async fn stats_combine_registry_and_coop() {
        let service = make_service(memory_config()).await;
        let owner = PlayerId::new();
        let island = service
            .registry()
            .create_island(ProfileId::new(), owner)
            .await
            .unwrap();
        service
            .coop()
            .send_invite(owner, PlayerId::new(), &island)
            .await
            .unwrap();

        let stats = service.stats();
        assert_eq!(stats.cached_islands, 1);
        assert_eq!(stats.resident_worlds, 1);
        assert_eq!(stats.pending_invites, 1);
        assert_eq!(stats.active_votes, 0);
        assert_eq!(stats.open_visits, 0);
    }

    // -----------------------------------------------------------------------
    // Directory backend
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn directory_backend_copies_template_and_reset_removes_it() {
        let root = tempfile::tempdir().unwrap();
        let config = directory_config(root.path());
        let worlds_dir = config.world.worlds_dir.clone();
        let service = make_service(config).await;
        assert_eq!(service.worlds().backend(), WorldBackend::Directory);

        let profile = ProfileId::new();
        let owner = PlayerId::new();
        let island = service
            .registry()
            .create_island(profile, owner)
            .await
            .unwrap();
        let world = worlds_dir.join(island.read().resource_name.clone());

        assert!(world.join("level.dat").is_file());
        assert!(world.join("region").join("r.0.0.mca").is_file());
        assert!(world.join("island_rules.json").is_file());
        assert!(!world.join("session.lock").exists());

        assert!(service.reset_island(profile, owner).await);
        assert!(!world.exists());
    }

    #[tokio::test]
    async fn missing_template_fails_creation_cleanly() {
        let root = tempfile::tempdir().unwrap();
        let mut config = directory_config(root.path());
        config.world.template_dir = root.path().join("absent");
        let service = make_service(config).await;

        let profile = ProfileId::new();
        assert!(service
            .registry()
            .create_island(profile, PlayerId::new())
            .await
            .is_err());
        assert!(service
            .registry()
            .get_island(profile)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn reset_drops_invites_and_votes_of_the_island() {
        let service = make_service(memory_config()).await;
        let profile = ProfileId::new();
        let owner = PlayerId::new();
        let island = service
            .registry()
            .create_island(profile, owner)
            .await
            .unwrap();
        let friend = PlayerId::new();
        service.coop().send_invite(owner, friend, &island).await.unwrap();
        assert_eq!(service.stats().pending_invites, 1);

        assert!(service.reset_island(profile, owner).await);
        assert_eq!(service.stats().pending_invites, 0);
        assert!(service.coop().pending_invite(&friend).is_none());

        let other_owner = PlayerId::new();
        let other = service
            .registry()
            .create_island(ProfileId::new(), other_owner)
            .await
            .unwrap();
        service
            .coop()
            .send_invite(other_owner, friend, &other)
            .await
            .unwrap();
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn shutdown_stops_sweeps_and_persists_state() {
        let root = tempfile::tempdir().unwrap();
        let store_path = root.path().join("islands.json");
        let mut config = memory_config();
        config.store.path = Some(store_path.clone());
        let service = make_service(config).await;

        let profile = ProfileId::new();
        let owner = PlayerId::new();
        let island = service
            .registry()
            .create_island(profile, owner)
            .await
            .unwrap();
        island.write().set_setting("visitor_interact", "true");
        service
            .coop()
            .send_invite(owner, PlayerId::new(), &island)
            .await
            .unwrap();

        let sweeps = service.spawn_maintenance();
        assert_eq!(sweeps.len(), 3);
        service.shutdown().await;
        for sweep in sweeps {
            sweep.await.unwrap();
        }

        assert_eq!(service.stats().pending_invites, 0);
        assert!(!service.worlds().is_loaded(&island.read().resource_name));

        let reopened = TableStore::open(&store_path).await.unwrap();
        let stored = reopened.load_island(profile).await.unwrap().unwrap();
        assert_eq!(stored.setting("visitor_interact"), Some("true"));
        assert!(reopened.load_invites().await.unwrap().is_empty());
    }
}
