//! Player notices and `island.*` / `coop.*` lifecycle events.
//!
//! This module owns **every message that leaves the core**: notices delivered
//! to individual players through the [`PlayerHost`](crate::host::PlayerHost)
//! and lifecycle events published on the [`EventBus`](crate::bus::EventBus).
//!
//! ## Subjects
//!
//! | Subject                 | Payload              |
//! |-------------------------|----------------------|
//! | `island.created`        | [`IslandCreated`]    |
//! | `island.reset`          | [`IslandReset`]      |
//! | `island.visit.started`  | [`VisitStarted`]     |
//! | `island.visit.ended`    | [`VisitEnded`]       |
//! | `coop.member.joined`    | [`MemberChanged`]    |
//! | `coop.member.left`      | [`MemberChanged`]    |
//! | `coop.member.kicked`    | [`MemberChanged`]    |
//!
//! Every event is wrapped in [`IslandEvent`] and serialised as snake_case JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{IslandId, PlayerId, ProfileId};

pub mod subjects {
    pub const ISLAND_CREATED: &str = "island.created";
    pub const ISLAND_RESET: &str = "island.reset";
    pub const VISIT_STARTED: &str = "island.visit.started";
    pub const VISIT_ENDED: &str = "island.visit.ended";
    pub const MEMBER_JOINED: &str = "coop.member.joined";
    pub const MEMBER_LEFT: &str = "coop.member.left";
    pub const MEMBER_KICKED: &str = "coop.member.kicked";
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IslandEvent<T> {
    pub at: DateTime<Utc>,
    pub payload: T,
}

impl<T> IslandEvent<T> {
    pub fn new(at: DateTime<Utc>, payload: T) -> Self {
        Self { at, payload }
    }
}

// ---------------------------------------------------------------------------
// Lifecycle payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IslandCreated {
    pub island_id: IslandId,
    pub profile_id: ProfileId,
    pub owner_id: PlayerId,
    pub resource_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IslandReset {
    pub island_id: IslandId,
    pub profile_id: ProfileId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisitStarted {
    pub island_id: IslandId,
    pub visitor_id: PlayerId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisitEnded {
    pub island_id: IslandId,
    pub visitor_id: PlayerId,
    pub seconds: u64,
    pub owner_xp: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberChanged {
    pub island_id: IslandId,
    pub player_id: PlayerId,
    pub member_count: usize,
}

// ---------------------------------------------------------------------------
// Player notices
// ---------------------------------------------------------------------------

/// A message shown to a single player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    InviteSent { invitee: PlayerId, expires_in_secs: i64 },
    InviteReceived { inviter: PlayerId, island_id: IslandId, expires_in_secs: i64 },
    InviteAccepted { player: PlayerId },
    InviteDenied { player: PlayerId },
    InviteExpired { island_id: IslandId },
    JoinedIsland { island_id: IslandId },
    MemberJoined { player: PlayerId },
    MemberLeft { player: PlayerId },
    LeftIsland { island_id: IslandId },
    KickVoteStarted { target: PlayerId, votes: usize, needed: usize },
    KickVoteCast { target: PlayerId, votes: usize, needed: usize },
    KickVoteExpired { target: PlayerId },
    MemberKicked { player: PlayerId },
    KickedFromIsland { island_id: IslandId },
    BannedFromIsland { island_id: IslandId },
    VisitReward { visitor: PlayerId, xp: f64 },
    IslandReset { island_id: IslandId },
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::InviteSent { invitee, expires_in_secs } => write!(
                f,
                "Invited {} to your island (expires in {}s)",
                invitee, expires_in_secs
            ),
            Notice::InviteReceived { inviter, expires_in_secs, .. } => write!(
                f,
                "{} invited you to their island. Accept within {}s",
                inviter, expires_in_secs
            ),
            Notice::InviteAccepted { player } => write!(f, "{} accepted your invite", player),
            Notice::InviteDenied { player } => write!(f, "{} declined your invite", player),
            Notice::InviteExpired { .. } => write!(f, "Your island invite expired"),
            Notice::JoinedIsland { .. } => write!(f, "You joined the island"),
            Notice::MemberJoined { player } => write!(f, "{} joined the island", player),
            Notice::MemberLeft { player } => write!(f, "{} left the island", player),
            Notice::LeftIsland { .. } => write!(f, "You left the island"),
            Notice::KickVoteStarted { target, votes, needed } => write!(
                f,
                "A vote to kick {} has started ({}/{})",
                target, votes, needed
            ),
            Notice::KickVoteCast { target, votes, needed } => {
                write!(f, "Vote to kick {}: {}/{}", target, votes, needed)
            }
            Notice::KickVoteExpired { target } => {
                write!(f, "The vote to kick {} expired", target)
            }
            Notice::MemberKicked { player } => {
                write!(f, "{} was voted off the island", player)
            }
            Notice::KickedFromIsland { .. } => write!(f, "You were voted off the island"),
            Notice::BannedFromIsland { .. } => write!(f, "You were banned from this island"),
            Notice::VisitReward { visitor, xp } => {
                write!(f, "+{:.1} social XP from {}'s visit", xp, visitor)
            }
            Notice::IslandReset { .. } => write!(f, "Your island was reset"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_serialises_with_kind_tag() {
        let notice = Notice::MemberKicked {
            player: PlayerId::new(),
        };
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["kind"], "member_kicked");
    }

    #[test]
    fn envelope_wraps_payload() {
        let ev = IslandEvent::new(
            Utc::now(),
            IslandReset {
                island_id: IslandId::new(),
                profile_id: ProfileId::new(),
            },
        );
        let json = serde_json::to_value(&ev).unwrap();
        assert!(json["payload"]["island_id"].is_string());
        assert!(json["at"].is_string());
    }
}
