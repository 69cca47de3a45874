//! The island aggregate: identity, membership, settings, visitors and bans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::ValidationError;
use crate::types::{IslandId, PlayerId, Pose, ProfileId};

/// Well-known keys in [`Island::settings`].
pub mod settings {
    /// Visitors may use doors, buttons, levers.
    pub const VISITOR_INTERACT: &str = "visitor_interact";
    /// Visitors may open chests and other containers.
    pub const VISITOR_CONTAINERS: &str = "visitor_containers";
    /// Natural mob spawning on the island.
    pub const MOB_SPAWNING: &str = "mob_spawning";
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Membership role. Variants are declared lowest priority first so the derived
/// ordering gives `Owner > Member`.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Owner,
}

impl Role {
    pub fn priority(&self) -> u8 {
        match self {
            Role::Member => 10,
            Role::Owner => 100,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Owner => "owner",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(Role::Member),
            "owner" => Ok(Role::Owner),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Visitors + bans
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorStat {
    pub visit_count: u32,
    pub total_seconds: u64,
    pub last_visit: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ban {
    pub banned_by: PlayerId,
    pub banned_at: DateTime<Utc>,
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Island
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Island {
    pub id: IslandId,
    pub profile_id: ProfileId,
    pub resource_name: String,
    pub spawn: Pose,
    pub size: u32,
    pub is_public: bool,
    pub pvp_enabled: bool,
    pub guest_limit: u32,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub members: HashMap<PlayerId, Membership>,
    pub settings: HashMap<String, String>,
    /// Transient: never persisted.
    #[serde(skip)]
    pub current_visitors: HashSet<PlayerId>,
    pub visitor_history: HashMap<PlayerId, VisitorStat>,
    pub banned_players: HashMap<PlayerId, Ban>,
}

impl Island {
    /// A fresh island with `owner` as its only member.
    pub fn new(
        id: IslandId,
        profile_id: ProfileId,
        owner: PlayerId,
        size: u32,
        guest_limit: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let mut members = HashMap::new();
        members.insert(
            owner,
            Membership {
                role: Role::Owner,
                joined_at: now,
            },
        );

        Self {
            id,
            profile_id,
            resource_name: id.resource_name(),
            spawn: Pose::island_origin(),
            size,
            is_public: false,
            pvp_enabled: false,
            guest_limit,
            created_at: now,
            last_accessed: now,
            members,
            settings: HashMap::new(),
            current_visitors: HashSet::new(),
            visitor_history: HashMap::new(),
            banned_players: HashMap::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// The single owner. `None` only for a corrupted aggregate.
    pub fn owner(&self) -> Option<PlayerId> {
        self.members
            .iter()
            .find(|(_, m)| m.role == Role::Owner)
            .map(|(id, _)| *id)
    }

    pub fn role_of(&self, player: &PlayerId) -> Option<Role> {
        self.members.get(player).map(|m| m.role)
    }

    pub fn is_member(&self, player: &PlayerId) -> bool {
        self.members.contains_key(player)
    }

    pub fn is_owner(&self, player: &PlayerId) -> bool {
        self.role_of(player) == Some(Role::Owner)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Members ordered by role priority, owner first.
    pub fn members_by_role(&self) -> Vec<(PlayerId, Role)> {
        let mut out: Vec<_> = self.members.iter().map(|(id, m)| (*id, m.role)).collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        out
    }

    /// Grant the `Member` role. Never creates a second owner.
    pub fn add_member(
        &mut self,
        player: PlayerId,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        if self.is_member(&player) {
            return Err(ValidationError::AlreadyMember);
        }
        self.members.insert(
            player,
            Membership {
                role: Role::Member,
                joined_at: now,
            },
        );
        self.current_visitors.remove(&player);
        Ok(())
    }

    /// Remove a non-owner member.
    pub fn remove_member(&mut self, player: &PlayerId) -> Result<Membership, ValidationError> {
        match self.members.get(player) {
            None => Err(ValidationError::NotMember),
            Some(m) if m.role == Role::Owner => Err(ValidationError::OwnerCannotLeave),
            Some(_) => self
                .members
                .remove(player)
                .ok_or(ValidationError::NotMember),
        }
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    pub fn setting_bool(&self, key: &str, default: bool) -> bool {
        match self.setting(key) {
            Some("true") | Some("1") | Some("on") => true,
            Some("false") | Some("0") | Some("off") => false,
            _ => default,
        }
    }

    pub fn set_setting(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.settings.insert(key.into(), value.into());
    }

    // -----------------------------------------------------------------------
    // Visitors
    // -----------------------------------------------------------------------

    pub fn is_banned(&self, player: &PlayerId) -> bool {
        self.banned_players.contains_key(player)
    }

    pub fn has_guest_room(&self) -> bool {
        (self.current_visitors.len() as u32) < self.guest_limit
    }

    /// Permission gate for entering the island world.
    ///
    /// Members always pass. Non-members need a public island, no ban and a
    /// free guest slot.
    pub fn check_entry(&self, player: &PlayerId) -> Result<(), ValidationError> {
        if self.is_member(player) {
            return Ok(());
        }
        if !self.is_public {
            return Err(ValidationError::PrivateIsland);
        }
        if self.is_banned(player) {
            return Err(ValidationError::Banned);
        }
        if !self.current_visitors.contains(player) && !self.has_guest_room() {
            return Err(ValidationError::GuestLimitReached);
        }
        Ok(())
    }

    /// Record a visitor arrival. Only called for non-members.
    pub fn add_visitor(&mut self, player: PlayerId, now: DateTime<Utc>) {
        debug_assert!(!self.is_member(&player));
        if !self.current_visitors.insert(player) {
            return;
        }
        let stat = self.visitor_history.entry(player).or_insert(VisitorStat {
            visit_count: 0,
            total_seconds: 0,
            last_visit: now,
        });
        stat.visit_count += 1;
        stat.last_visit = now;
    }

    /// Record a visitor departure, crediting `seconds` of presence.
    pub fn remove_visitor(&mut self, player: &PlayerId, seconds: u64) -> bool {
        let was_present = self.current_visitors.remove(player);
        if let Some(stat) = self.visitor_history.get_mut(player) {
            stat.total_seconds += seconds;
        }
        was_present
    }
}
