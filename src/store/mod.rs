//! Persistent store boundary.
//!
//! The core talks to persistence only through [`IslandStore`]. The rows mirror
//! the relational schema:
//!
//! ```text
//! islands        (id PK, owner_profile_id UNIQUE, resource_name, spawn_pose, size,
//!                 created_at, last_accessed, is_public, pvp_enabled, guest_limit)
//! island_members (island_id, player_id, role, joined_at)        UNIQUE (island, player)
//! island_settings(island_id, key, value)                        UNIQUE (island, key)
//! island_visitors(island_id, visitor_id, visit_count, total_seconds, last_visit)
//! island_bans    (island_id, banned_id, banned_by, banned_at, reason)
//! coop_invites   (island_id, inviter_id, invitee_id, invited_at, expires_at)
//! ```
//!
//! Kick votes are never persisted.

mod table;

pub use table::TableStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coop::CoopInvite;
use crate::error::StoreResult;
use crate::island::{Ban, Island, Membership, Role, VisitorStat};
use crate::types::{IslandId, PlayerId, Pose, ProfileId};

#[async_trait]
pub trait IslandStore: Send + Sync {
    async fn island_exists(&self, profile: ProfileId) -> StoreResult<bool>;

    /// Island row plus all child rows, assembled into one aggregate.
    async fn load_island(&self, profile: ProfileId) -> StoreResult<Option<Island>>;

    async fn find_profile(&self, island: IslandId) -> StoreResult<Option<ProfileId>>;

    /// Upsert the island row and replace every child table for this island.
    async fn save_island(&self, island: &Island) -> StoreResult<()>;

    /// Delete the island row and cascade to all child rows.
    async fn delete_island(&self, island: IslandId) -> StoreResult<()>;

    async fn save_invite(&self, invite: &CoopInvite) -> StoreResult<()>;

    async fn delete_invite(&self, invitee: PlayerId) -> StoreResult<()>;

    async fn load_invites(&self) -> StoreResult<Vec<CoopInvite>>;
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IslandRow {
    pub id: IslandId,
    pub owner_profile_id: ProfileId,
    pub resource_name: String,
    pub spawn_pose: Pose,
    pub size: u32,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub is_public: bool,
    pub pvp_enabled: bool,
    pub guest_limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRow {
    pub island_id: IslandId,
    pub player_id: PlayerId,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingRow {
    pub island_id: IslandId,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorRow {
    pub island_id: IslandId,
    pub visitor_id: PlayerId,
    pub visit_count: u32,
    pub total_seconds: u64,
    pub last_visit: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRow {
    pub island_id: IslandId,
    pub banned_id: PlayerId,
    pub banned_by: PlayerId,
    pub banned_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// All rows belonging to one island.
#[derive(Debug, Clone, PartialEq)]
pub struct IslandRows {
    pub island: IslandRow,
    pub members: Vec<MemberRow>,
    pub settings: Vec<SettingRow>,
    pub visitors: Vec<VisitorRow>,
    pub bans: Vec<BanRow>,
}

impl From<&Island> for IslandRows {
    fn from(island: &Island) -> Self {
        let id = island.id;
        Self {
            island: IslandRow {
                id,
                owner_profile_id: island.profile_id,
                resource_name: island.resource_name.clone(),
                spawn_pose: island.spawn,
                size: island.size,
                created_at: island.created_at,
                last_accessed: island.last_accessed,
                is_public: island.is_public,
                pvp_enabled: island.pvp_enabled,
                guest_limit: island.guest_limit,
            },
            members: island
                .members
                .iter()
                .map(|(player, m)| MemberRow {
                    island_id: id,
                    player_id: *player,
                    role: m.role,
                    joined_at: m.joined_at,
                })
                .collect(),
            settings: island
                .settings
                .iter()
                .map(|(k, v)| SettingRow {
                    island_id: id,
                    key: k.clone(),
                    value: v.clone(),
                })
                .collect(),
            visitors: island
                .visitor_history
                .iter()
                .map(|(visitor, s)| VisitorRow {
                    island_id: id,
                    visitor_id: *visitor,
                    visit_count: s.visit_count,
                    total_seconds: s.total_seconds,
                    last_visit: s.last_visit,
                })
                .collect(),
            bans: island
                .banned_players
                .iter()
                .map(|(banned, b)| BanRow {
                    island_id: id,
                    banned_id: *banned,
                    banned_by: b.banned_by,
                    banned_at: b.banned_at,
                    reason: b.reason.clone(),
                })
                .collect(),
        }
    }
}

impl From<IslandRows> for Island {
    fn from(rows: IslandRows) -> Self {
        let row = rows.island;
        Island {
            id: row.id,
            profile_id: row.owner_profile_id,
            resource_name: row.resource_name,
            spawn: row.spawn_pose,
            size: row.size,
            is_public: row.is_public,
            pvp_enabled: row.pvp_enabled,
            guest_limit: row.guest_limit,
            created_at: row.created_at,
            last_accessed: row.last_accessed,
            members: rows
                .members
                .into_iter()
                .map(|m| {
                    (
                        m.player_id,
                        Membership {
                            role: m.role,
                            joined_at: m.joined_at,
                        },
                    )
                })
                .collect(),
            settings: rows
                .settings
                .into_iter()
                .map(|s| (s.key, s.value))
                .collect(),
            current_visitors: Default::default(),
            visitor_history: rows
                .visitors
                .into_iter()
                .map(|v| {
                    (
                        v.visitor_id,
                        VisitorStat {
                            visit_count: v.visit_count,
                            total_seconds: v.total_seconds,
                            last_visit: v.last_visit,
                        },
                    )
                })
                .collect(),
            banned_players: rows
                .bans
                .into_iter()
                .map(|b| {
                    (
                        b.banned_id,
                        Ban {
                            banned_by: b.banned_by,
                            banned_at: b.banned_at,
                            reason: b.reason,
                        },
                    )
                })
                .collect(),
        }
    }
}
