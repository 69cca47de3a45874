//! Directory-backed worlds: each island is a directory copied from a template.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{Residency, WorldHandle, WorldProvider};
use crate::clock::Clock;
use crate::config::WorldBackend;
use crate::host::PlayerHost;
use crate::types::{PlayerId, WorldRules};

/// Files that identify a world instance; stripped so the copy is treated as new.
const IDENTITY_MARKERS: &[&str] = &["uid.dat", "session.lock"];

/// Rule profile written next to the world data.
pub const RULES_FILE: &str = "island_rules.json";

pub struct DirectoryWorldProvider {
    worlds_dir: PathBuf,
    template_dir: PathBuf,
    rules: WorldRules,
    host: Arc<dyn PlayerHost>,
    residency: Residency,
}

impl DirectoryWorldProvider {
    pub fn new(
        worlds_dir: PathBuf,
        template_dir: PathBuf,
        default_pvp: bool,
        host: Arc<dyn PlayerHost>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            worlds_dir,
            template_dir,
            rules: WorldRules::with_pvp(default_pvp),
            host,
            residency: Residency::new(clock),
        }
    }

    pub fn world_path(&self, name: &str) -> PathBuf {
        self.worlds_dir.join(name)
    }

    async fn materialise(&self, target: &Path) -> std::io::Result<()> {
        copy_dir(&self.template_dir, target).await?;
        for marker in IDENTITY_MARKERS {
            match tokio::fs::remove_file(target.join(marker)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        let rules = serde_json::to_vec_pretty(&self.rules)?;
        tokio::fs::write(target.join(RULES_FILE), rules).await
    }
}

#[async_trait]
impl WorldProvider for DirectoryWorldProvider {
    fn backend(&self) -> WorldBackend {
        WorldBackend::Directory
    }

    async fn provision(&self, name: &str, owner: PlayerId) -> Option<WorldHandle> {
        let target = self.world_path(name);
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            log::warn!("Refusing to provision '{}': directory already exists", name);
            return None;
        }

        if let Err(e) = self.materialise(&target).await {
            log::error!("Failed to provision world '{}' for {}: {}", name, owner, e);
            // Leave nothing half-copied behind.
            if let Err(e) = tokio::fs::remove_dir_all(&target).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Failed to clean up partial world '{}': {}", name, e);
                }
            }
            return None;
        }

        log::info!("Provisioned world '{}' for {}", name, owner);
        Some(self.residency.admit(name))
    }

    async fn load(&self, name: &str) -> Option<WorldHandle> {
        if self.residency.touch(name) {
            return self.residency.get(name);
        }

        let path = self.world_path(name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => {
                log::debug!("Loaded world '{}'", name);
                Some(self.residency.admit(name))
            }
            Ok(_) => {
                log::warn!("World path {} is not a directory", path.display());
                None
            }
            Err(e) => {
                log::debug!("World '{}' not found: {}", name, e);
                None
            }
        }
    }

    async fn unload(&self, name: &str) -> bool {
        if !self.residency.release_if_empty(name) {
            log::debug!("Not unloading occupied world '{}'", name);
            return false;
        }
        log::debug!("Unloaded world '{}'", name);
        true
    }

    async fn delete(&self, name: &str) -> bool {
        for player in self.residency.evict(name) {
            self.host.send_to_hub(&player);
        }

        match tokio::fs::remove_dir_all(self.world_path(name)).await {
            Ok(()) => {
                log::info!("Deleted world '{}'", name);
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                log::error!("Failed to delete world '{}': {}", name, e);
                false
            }
        }
    }

    fn residency(&self) -> &Residency {
        &self.residency
    }
}

/// Recursive directory copy.
async fn copy_dir(from: &Path, to: &Path) -> std::io::Result<()> {
    let mut stack = vec![(from.to_path_buf(), to.to_path_buf())];
    while let Some((src, dst)) = stack.pop() {
        tokio::fs::create_dir_all(&dst).await?;
        let mut entries = tokio::fs::read_dir(&src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let target = dst.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                stack.push((entry.path(), target));
            } else {
                tokio::fs::copy(entry.path(), target).await?;
            }
        }
    }
    Ok(())
}
