//! `TableStore`: relational tables held in memory, optionally mirrored to a
//! JSON file after every write.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use super::{BanRow, IslandRow, IslandRows, IslandStore, MemberRow, SettingRow, VisitorRow};
use crate::coop::CoopInvite;
use crate::error::{StoreError, StoreResult};
use crate::island::Island;
use crate::types::{IslandId, PlayerId, ProfileId};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Tables {
    islands: HashMap<IslandId, IslandRow>,
    members: Vec<MemberRow>,
    settings: Vec<SettingRow>,
    visitors: Vec<VisitorRow>,
    bans: Vec<BanRow>,
    invites: Vec<CoopInvite>,
}

impl Tables {
    fn island_for_profile(&self, profile: ProfileId) -> Option<&IslandRow> {
        self.islands
            .values()
            .find(|row| row.owner_profile_id == profile)
    }

    fn rows_for(&self, row: &IslandRow) -> IslandRows {
        let id = row.id;
        IslandRows {
            island: row.clone(),
            members: self
                .members
                .iter()
                .filter(|r| r.island_id == id)
                .cloned()
                .collect(),
            settings: self
                .settings
                .iter()
                .filter(|r| r.island_id == id)
                .cloned()
                .collect(),
            visitors: self
                .visitors
                .iter()
                .filter(|r| r.island_id == id)
                .cloned()
                .collect(),
            bans: self
                .bans
                .iter()
                .filter(|r| r.island_id == id)
                .cloned()
                .collect(),
        }
    }

    fn drop_children(&mut self, id: IslandId) {
        self.members.retain(|r| r.island_id != id);
        self.settings.retain(|r| r.island_id != id);
        self.visitors.retain(|r| r.island_id != id);
        self.bans.retain(|r| r.island_id != id);
    }

    fn upsert(&mut self, rows: IslandRows) -> StoreResult<()> {
        let id = rows.island.id;
        let profile = rows.island.owner_profile_id;
        if self
            .islands
            .values()
            .any(|row| row.owner_profile_id == profile && row.id != id)
        {
            return Err(StoreError::Unavailable(format!(
                "unique constraint: profile {} already owns an island",
                profile
            )));
        }

        self.islands.insert(id, rows.island);
        self.drop_children(id);
        self.members.extend(rows.members);
        self.settings.extend(rows.settings);
        self.visitors.extend(rows.visitors);
        self.bans.extend(rows.bans);
        Ok(())
    }
}

pub struct TableStore {
    tables: RwLock<Tables>,
    path: Option<PathBuf>,
    file_gate: tokio::sync::Mutex<()>,
    fail_writes: AtomicBool,
}

impl TableStore {
    pub fn in_memory() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            path: None,
            file_gate: tokio::sync::Mutex::new(()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Open (or start) a JSON-backed store at `path`.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tables::default(),
            Err(e) => return Err(e.into()),
        };
        log::info!(
            "Opened island store at {} ({} islands)",
            path.display(),
            tables.islands.len()
        );
        Ok(Self {
            tables: RwLock::new(tables),
            path: Some(path),
            file_gate: tokio::sync::Mutex::new(()),
            fail_writes: AtomicBool::new(false),
        })
    }

    /// Make every subsequent write fail with [`StoreError::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn island_count(&self) -> usize {
        self.tables.read().islands.len()
    }

    pub fn invite_count(&self) -> usize {
        self.tables.read().invites.len()
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        Ok(())
    }

    async fn persist(&self) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _gate = self.file_gate.lock().await;
        let bytes = serde_json::to_vec_pretty(&*self.tables.read())?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

impl Default for TableStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[async_trait]
impl IslandStore for TableStore {
    async fn island_exists(&self, profile: ProfileId) -> StoreResult<bool> {
        Ok(self.tables.read().island_for_profile(profile).is_some())
    }

    async fn load_island(&self, profile: ProfileId) -> StoreResult<Option<Island>> {
        let tables = self.tables.read();
        Ok(tables
            .island_for_profile(profile)
            .map(|row| Island::from(tables.rows_for(row))))
    }

    async fn find_profile(&self, island: IslandId) -> StoreResult<Option<ProfileId>> {
        Ok(self
            .tables
            .read()
            .islands
            .get(&island)
            .map(|row| row.owner_profile_id))
    }

    async fn save_island(&self, island: &Island) -> StoreResult<()> {
        self.check_writable()?;
        self.tables.write().upsert(IslandRows::from(island))?;
        self.persist().await
    }

    async fn delete_island(&self, island: IslandId) -> StoreResult<()> {
        self.check_writable()?;
        {
            let mut tables = self.tables.write();
            tables.islands.remove(&island);
            tables.drop_children(island);
            tables.invites.retain(|i| i.island_id != island);
        }
        self.persist().await
    }

    async fn save_invite(&self, invite: &CoopInvite) -> StoreResult<()> {
        self.check_writable()?;
        {
            let mut tables = self.tables.write();
            tables.invites.retain(|i| i.invitee_id != invite.invitee_id);
            tables.invites.push(invite.clone());
        }
        self.persist().await
    }

    async fn delete_invite(&self, invitee: PlayerId) -> StoreResult<()> {
        self.check_writable()?;
        self.tables
            .write()
            .invites
            .retain(|i| i.invitee_id != invitee);
        self.persist().await
    }

    async fn load_invites(&self) -> StoreResult<Vec<CoopInvite>> {
        Ok(self.tables.read().invites.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::island::Ban;
    use chrono::{Duration, Utc};

    fn island() -> Island {
        let now = Utc::now();
        let mut island = Island::new(IslandId::new(), ProfileId::new(), PlayerId::new(), 100, 8, now);
        island.add_member(PlayerId::new(), now).unwrap();
        island.set_setting("visitor_interact", "true");
        island.banned_players.insert(
            PlayerId::new(),
            Ban {
                banned_by: island.owner().unwrap(),
                banned_at: now,
                reason: Some("griefing".into()),
            },
        );
        island
    }

    #[tokio::test]
    async fn save_and_load_round_trip_children() {
        let store = TableStore::in_memory();
        let island = island();
        store.save_island(&island).await.unwrap();

        let loaded = store.load_island(island.profile_id).await.unwrap().unwrap();
        assert_eq!(loaded, island);
        assert_eq!(
            store.find_profile(island.id).await.unwrap(),
            Some(island.profile_id)
        );
    }

    #[tokio::test]
    async fn save_replaces_children() {
        let store = TableStore::in_memory();
        let mut island = island();
        store.save_island(&island).await.unwrap();

        island.settings.clear();
        island.members.retain(|_, m| m.role == crate::island::Role::Owner);
        store.save_island(&island).await.unwrap();

        let loaded = store.load_island(island.profile_id).await.unwrap().unwrap();
        assert!(loaded.settings.is_empty());
        assert_eq!(loaded.member_count(), 1);
    }

    #[tokio::test]
    async fn profile_uniqueness_enforced() {
        let store = TableStore::in_memory();
        let first = island();
        store.save_island(&first).await.unwrap();

        let mut second = island();
        second.profile_id = first.profile_id;
        assert!(store.save_island(&second).await.is_err());
        assert_eq!(store.island_count(), 1);
    }

    #[tokio::test]
    async fn delete_cascades() {
        let store = TableStore::in_memory();
        let island = island();
        store.save_island(&island).await.unwrap();
        store
            .save_invite(&CoopInvite {
                island_id: island.id,
                inviter_id: island.owner().unwrap(),
                invitee_id: PlayerId::new(),
                created_at: Utc::now(),
                expires_at: Utc::now() + Duration::minutes(5),
            })
            .await
            .unwrap();

        store.delete_island(island.id).await.unwrap();
        assert!(!store.island_exists(island.profile_id).await.unwrap());
        assert_eq!(store.invite_count(), 0);
        assert!(store.tables.read().members.is_empty());
        assert!(store.tables.read().bans.is_empty());
    }

    #[tokio::test]
    async fn failed_writes_surface_as_errors() {
        let store = TableStore::in_memory();
        store.set_fail_writes(true);
        assert!(matches!(
            store.save_island(&island()).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("islands.json");
        let island = island();

        let store = TableStore::open(&path).await.unwrap();
        store.save_island(&island).await.unwrap();
        drop(store);

        let reopened = TableStore::open(&path).await.unwrap();
        let loaded = reopened.load_island(island.profile_id).await.unwrap().unwrap();
        assert_eq!(loaded.members, island.members);
        assert_eq!(loaded.banned_players, island.banned_players);
    }
}
