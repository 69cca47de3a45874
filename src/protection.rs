//! Read-side permission checks evaluated at the interaction boundary.
//!
//! Every check is a pure function of the resolved [`Island`]; nothing here
//! holds state of its own.

use serde::{Deserialize, Serialize};

use crate::island::{settings, Island};
use crate::types::PlayerId;

/// An action a player attempts inside an island world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interaction {
    Build,
    Break,
    Use,
    OpenContainer,
    Attack,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProtectionGuard;

impl ProtectionGuard {
    pub fn can_build(island: &Island, actor: &PlayerId) -> bool {
        island.is_member(actor)
    }

    pub fn can_interact(island: &Island, actor: &PlayerId) -> bool {
        island.is_member(actor) || island.setting_bool(settings::VISITOR_INTERACT, false)
    }

    pub fn can_open_container(island: &Island, actor: &PlayerId) -> bool {
        island.is_member(actor) || island.setting_bool(settings::VISITOR_CONTAINERS, false)
    }

    pub fn can_pvp(island: &Island) -> bool {
        island.pvp_enabled
    }

    pub fn can_mob_spawn(island: &Island) -> bool {
        island.setting_bool(settings::MOB_SPAWNING, true)
    }

    /// Dispatch on [`Interaction`].
    pub fn allows(island: &Island, actor: &PlayerId, interaction: Interaction) -> bool {
        match interaction {
            Interaction::Build | Interaction::Break => Self::can_build(island, actor),
            Interaction::Use => Self::can_interact(island, actor),
            Interaction::OpenContainer => Self::can_open_container(island, actor),
            Interaction::Attack => Self::can_pvp(island),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IslandId, ProfileId};
    use chrono::Utc;

    fn island_with_member() -> (Island, PlayerId, PlayerId) {
        let owner = PlayerId::new();
        let member = PlayerId::new();
        let mut island = Island::new(IslandId::new(), ProfileId::new(), owner, 100, 4, Utc::now());
        island.add_member(member, Utc::now()).unwrap();
        (island, owner, member)
    }

    #[test]
    fn only_members_build() {
        let (island, owner, member) = island_with_member();
        let visitor = PlayerId::new();
        assert!(ProtectionGuard::can_build(&island, &owner));
        assert!(ProtectionGuard::can_build(&island, &member));
        assert!(!ProtectionGuard::can_build(&island, &visitor));
        assert!(!ProtectionGuard::allows(&island, &visitor, Interaction::Break));
    }

    #[test]
    fn visitor_interaction_follows_settings() {
        let (mut island, _, _) = island_with_member();
        let visitor = PlayerId::new();
        assert!(!ProtectionGuard::can_interact(&island, &visitor));
        assert!(!ProtectionGuard::can_open_container(&island, &visitor));

        island.set_setting(settings::VISITOR_INTERACT, "true");
        assert!(ProtectionGuard::can_interact(&island, &visitor));
        // Containers have their own switch.
        assert!(!ProtectionGuard::can_open_container(&island, &visitor));

        island.set_setting(settings::VISITOR_CONTAINERS, "true");
        assert!(ProtectionGuard::allows(&island, &visitor, Interaction::OpenContainer));
    }

    #[test]
    fn pvp_and_mobs_follow_island_flags() {
        let (mut island, owner, _) = island_with_member();
        assert!(!ProtectionGuard::allows(&island, &owner, Interaction::Attack));
        island.pvp_enabled = true;
        assert!(ProtectionGuard::can_pvp(&island));

        assert!(ProtectionGuard::can_mob_spawn(&island));
        island.set_setting(settings::MOB_SPAWNING, "false");
        assert!(!ProtectionGuard::can_mob_spawn(&island));
    }
}
