//! Co-op membership protocols: invites and majority kick votes.
//!
//! ```text
//! Invite:    Pending ──► Accepted | Denied | Expired
//! KickVote:  Collecting ──► Passed (kick executes) | Expired
//!               ▲   │
//!               └───┘ each further distinct vote
//! ```
//!
//! Both are ephemeral. Invites are mirrored to the store so they survive a
//! crash; kick votes live only in memory and are lost on restart.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::cache::SharedIsland;
use crate::config::CoopConfig;
use crate::error::{IslandError, Result, ValidationError};
use crate::island::Role;
use crate::protocol::{subjects, MemberChanged, Notice};
use crate::registry::IslandRegistry;
use crate::types::{IslandId, PlayerId, ProfileId};

// ---------------------------------------------------------------------------
// Protocol state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoopInvite {
    pub island_id: IslandId,
    pub inviter_id: PlayerId,
    pub invitee_id: PlayerId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CoopInvite {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    fn expires_in_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KickVote {
    pub island_id: IslandId,
    pub target_id: PlayerId,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub voters: HashSet<PlayerId>,
}

impl KickVote {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteStatus {
    Collecting { votes: usize, needed: usize },
    Passed,
}

/// Majority of the members other than the target. `member_count` includes
/// the target.
pub fn votes_needed(member_count: usize) -> usize {
    member_count.saturating_sub(1) / 2 + 1
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_invites: usize,
    pub expired_votes: usize,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct CoopInviteService {
    config: CoopConfig,
    registry: Arc<IslandRegistry>,
    invites: Mutex<HashMap<PlayerId, CoopInvite>>,
    votes: Mutex<HashMap<IslandId, KickVote>>,
}

impl CoopInviteService {
    pub fn new(config: CoopConfig, registry: Arc<IslandRegistry>) -> Self {
        Self {
            config,
            registry,
            invites: Mutex::new(HashMap::new()),
            votes: Mutex::new(HashMap::new()),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.registry.clock().now()
    }

    fn notify(&self, player: &PlayerId, notice: Notice) {
        self.registry.host().notify(player, &notice);
    }

    fn notify_all<'a>(&self, players: impl IntoIterator<Item = &'a PlayerId>, notice: Notice) {
        for player in players {
            self.registry.host().notify(player, &notice);
        }
    }

    /// Invite rows are written inline so a later delete can never be
    /// overtaken by an earlier save. Failures are logged only.
    async fn persist_invite(&self, invite: &CoopInvite) {
        if let Err(e) = self.registry.store().save_invite(invite).await {
            log::error!("Failed to save co-op invite for {}: {}", invite.invitee_id, e);
        }
    }

    async fn delete_invite_row(&self, invitee: PlayerId) {
        if let Err(e) = self.registry.store().delete_invite(invitee).await {
            log::error!("Failed to delete co-op invite for {}: {}", invitee, e);
        }
    }

    fn member_changed(&self, subject: &'static str, island: &SharedIsland, player: PlayerId) {
        let member_count = island.read().member_count();
        self.registry.bus().publish(
            subject,
            self.now(),
            MemberChanged {
                island_id: island.id(),
                player_id: player,
                member_count,
            },
        );
    }

    // -----------------------------------------------------------------------
    // Invites
    // -----------------------------------------------------------------------

    pub async fn send_invite(
        &self,
        inviter: PlayerId,
        invitee: PlayerId,
        island: &SharedIsland,
    ) -> Result<CoopInvite> {
        if inviter == invitee {
            return Err(ValidationError::SelfInvite.into());
        }
        let island = &self.registry.current(island).await?;
        {
            let state = island.read();
            if !state.is_member(&inviter) {
                return Err(ValidationError::NotMember.into());
            }
            if state.is_member(&invitee) {
                return Err(ValidationError::AlreadyMember.into());
            }
            if state.member_count() >= self.config.max_members {
                return Err(ValidationError::IslandFull.into());
            }
        }

        let now = self.now();
        let invite = CoopInvite {
            island_id: island.id(),
            inviter_id: inviter,
            invitee_id: invitee,
            created_at: now,
            expires_at: now + self.config.invite_ttl(),
        };

        {
            let mut invites = self.invites.lock();
            if invites
                .get(&invitee)
                .is_some_and(|pending| !pending.is_expired(now))
            {
                return Err(ValidationError::InvitePending.into());
            }
            invites.insert(invitee, invite.clone());
        }
        self.persist_invite(&invite).await;

        let expires_in_secs = invite.expires_in_secs(now);
        self.notify(
            &inviter,
            Notice::InviteSent {
                invitee,
                expires_in_secs,
            },
        );
        self.notify(
            &invitee,
            Notice::InviteReceived {
                inviter,
                island_id: invite.island_id,
                expires_in_secs,
            },
        );
        log::info!("{} invited {} to island {}", inviter, invitee, invite.island_id);
        Ok(invite)
    }

    /// Consume the invitee's pending invite and join the island.
    ///
    /// A missing or expired invite fails with [`IslandError::Expired`]. The
    /// member cap is checked again here because it may have filled up since
    /// the invite was sent.
    pub async fn accept_invite(&self, invitee: PlayerId) -> Result<SharedIsland> {
        let Some(invite) = self.invites.lock().remove(&invitee) else {
            return Err(IslandError::Expired);
        };
        self.delete_invite_row(invitee).await;

        let now = self.now();
        if invite.is_expired(now) {
            log::debug!("Invite for {} expired at {}", invitee, invite.expires_at);
            return Err(IslandError::Expired);
        }

        let island = self
            .registry
            .get_island_by_id(invite.island_id)
            .await?
            .ok_or_else(|| IslandError::not_found("island"))?;

        let others: Vec<PlayerId> = {
            let mut state = island.write_live()?;
            if state.member_count() >= self.config.max_members {
                return Err(ValidationError::IslandFull.into());
            }
            state.add_member(invitee, now)?;
            state
                .members
                .keys()
                .filter(|p| **p != invitee)
                .copied()
                .collect()
        };
        self.registry.save_island(&island);
        // A visitor who joins stops being a visitor.
        self.registry.end_visit(invitee).await;

        self.notify(
            &invitee,
            Notice::JoinedIsland {
                island_id: island.id(),
            },
        );
        self.notify(&invite.inviter_id, Notice::InviteAccepted { player: invitee });
        self.notify_all(
            others.iter().filter(|p| **p != invite.inviter_id),
            Notice::MemberJoined { player: invitee },
        );
        log::info!("{} joined island {}", invitee, island.id());
        self.member_changed(subjects::MEMBER_JOINED, &island, invitee);
        Ok(island)
    }

    pub async fn deny_invite(&self, invitee: PlayerId) -> Result<CoopInvite> {
        let now = self.now();
        let invite = self
            .invites
            .lock()
            .remove(&invitee)
            .ok_or_else(|| IslandError::not_found("invite"))?;
        self.delete_invite_row(invitee).await;

        if invite.is_expired(now) {
            return Err(IslandError::not_found("invite"));
        }
        self.notify(&invite.inviter_id, Notice::InviteDenied { player: invitee });
        Ok(invite)
    }

    /// The invitee's unexpired invite, if any.
    pub fn pending_invite(&self, invitee: &PlayerId) -> Option<CoopInvite> {
        let now = self.now();
        self.invites
            .lock()
            .get(invitee)
            .filter(|i| !i.is_expired(now))
            .cloned()
    }

    // -----------------------------------------------------------------------
    // Kick votes
    // -----------------------------------------------------------------------

    /// Start a vote to kick `target`, or join the running vote against them.
    pub async fn start_kick_vote(
        &self,
        initiator: PlayerId,
        target: PlayerId,
        island: &SharedIsland,
    ) -> Result<VoteStatus> {
        let island = &self.registry.current(island).await?;
        let members: Vec<PlayerId> = {
            let state = island.read();
            if !state.is_member(&initiator) {
                return Err(ValidationError::NotMember.into());
            }
            if initiator == target {
                return Err(ValidationError::CannotVoteOnSelf.into());
            }
            if state.role_of(&target) != Some(Role::Member) {
                return Err(ValidationError::NotKickable.into());
            }
            state.members.keys().copied().collect()
        };

        let now = self.now();
        let started = {
            let mut votes = self.votes.lock();
            let running = votes
                .get(&island.id())
                .filter(|v| !v.is_expired(now))
                .map(|v| v.target_id);
            match running {
                Some(current) if current != target => {
                    return Err(ValidationError::VoteInProgress.into());
                }
                Some(_) => {
                    if let Some(vote) = votes.get_mut(&island.id()) {
                        vote.voters.insert(initiator);
                    }
                    false
                }
                None => {
                    votes.insert(
                        island.id(),
                        KickVote {
                            island_id: island.id(),
                            target_id: target,
                            started_at: now,
                            expires_at: now + self.config.vote_ttl(),
                            voters: HashSet::from([initiator]),
                        },
                    );
                    true
                }
            }
        };

        if started {
            log::info!("{} started a kick vote against {} on {}", initiator, target, island.id());
            let status = self.evaluate(island, target).await;
            if let VoteStatus::Collecting { votes, needed } = status {
                self.notify_all(
                    members.iter().filter(|p| **p != target),
                    Notice::KickVoteStarted {
                        target,
                        votes,
                        needed,
                    },
                );
            }
            return Ok(status);
        }
        Ok(self.evaluate(island, target).await)
    }

    pub async fn cast_vote(&self, voter: PlayerId, island: &SharedIsland) -> Result<VoteStatus> {
        let island = &self.registry.current(island).await?;
        let members: Vec<PlayerId> = {
            let state = island.read();
            if !state.is_member(&voter) {
                return Err(ValidationError::NotMember.into());
            }
            state.members.keys().copied().collect()
        };

        let now = self.now();
        let target = {
            let mut votes = self.votes.lock();
            let Some(vote) = votes.get_mut(&island.id()) else {
                return Err(IslandError::not_found("kick vote"));
            };
            if vote.is_expired(now) {
                votes.remove(&island.id());
                return Err(IslandError::not_found("kick vote"));
            }
            if vote.target_id == voter {
                return Err(ValidationError::CannotVoteOnSelf.into());
            }
            if !vote.voters.insert(voter) {
                return Err(ValidationError::AlreadyVoted.into());
            }
            vote.target_id
        };

        let status = self.evaluate(island, target).await;
        if let VoteStatus::Collecting { votes, needed } = status {
            self.notify_all(
                members.iter().filter(|p| **p != target),
                Notice::KickVoteCast {
                    target,
                    votes,
                    needed,
                },
            );
        }
        Ok(status)
    }

    /// Check quorum on the vote against `target`; execute the kick if reached.
    ///
    /// Only votes from current members count. A vote whose target has
    /// already left is dropped. If another voter already closed the vote,
    /// the outcome is read from the membership: `target` gone means passed.
    /// The vote is removed and the target dropped in one step under both
    /// locks.
    async fn evaluate(&self, island: &SharedIsland, target: PlayerId) -> VoteStatus {
        let remaining: Vec<PlayerId> = {
            let mut votes = self.votes.lock();
            let Ok(mut state) = island.write_live() else {
                votes.remove(&island.id());
                return VoteStatus::Collecting { votes: 0, needed: 0 };
            };
            let needed = votes_needed(state.member_count());
            let open = votes
                .get(&island.id())
                .is_some_and(|v| v.target_id == target);
            if !state.is_member(&target) {
                if open {
                    votes.remove(&island.id());
                    return VoteStatus::Collecting { votes: 0, needed };
                }
                return VoteStatus::Passed;
            }
            let count = match votes.get(&island.id()) {
                Some(vote) if open => vote.voters.iter().filter(|v| state.is_member(v)).count(),
                _ => return VoteStatus::Collecting { votes: 0, needed },
            };
            if count < needed {
                return VoteStatus::Collecting {
                    votes: count,
                    needed,
                };
            }
            votes.remove(&island.id());
            if let Err(e) = state.remove_member(&target) {
                log::warn!("Kick of {} on {} not applied: {}", target, island.id(), e);
                return VoteStatus::Collecting { votes: 0, needed };
            }
            state.members.keys().copied().collect()
        };

        self.finish_kick(target, island, &remaining).await;
        VoteStatus::Passed
    }

    async fn finish_kick(&self, target: PlayerId, island: &SharedIsland, remaining: &[PlayerId]) {
        self.registry.save_island(island);

        log::info!("{} was voted off island {}", target, island.id());
        self.notify(
            &target,
            Notice::KickedFromIsland {
                island_id: island.id(),
            },
        );
        self.notify_all(remaining, Notice::MemberKicked { player: target });
        self.registry.evict_player(target, island).await;
        self.member_changed(subjects::MEMBER_KICKED, island, target);
    }

    pub fn active_vote(&self, island: IslandId) -> Option<KickVote> {
        let now = self.now();
        self.votes
            .lock()
            .get(&island)
            .filter(|v| !v.is_expired(now))
            .cloned()
    }

    // -----------------------------------------------------------------------
    // Leaving
    // -----------------------------------------------------------------------

    /// Leave the island. The owner is always refused.
    pub async fn leave_island(&self, player: PlayerId, island: &SharedIsland) -> Result<()> {
        let island = &self.registry.current(island).await?;
        let remaining: Vec<PlayerId> = {
            let mut state = island.write_live()?;
            state.remove_member(&player)?;
            state.members.keys().copied().collect()
        };
        self.registry.save_island(island);

        let open_vote = {
            let mut votes = self.votes.lock();
            match votes.get_mut(&island.id()) {
                Some(vote) if vote.target_id == player => {
                    votes.remove(&island.id());
                    None
                }
                Some(vote) => {
                    vote.voters.remove(&player);
                    Some(vote.target_id)
                }
                None => None,
            }
        };

        self.registry.evict_player(player, island).await;
        self.notify(
            &player,
            Notice::LeftIsland {
                island_id: island.id(),
            },
        );
        self.notify_all(&remaining, Notice::MemberLeft { player });
        log::info!("{} left island {}", player, island.id());
        self.member_changed(subjects::MEMBER_LEFT, island, player);

        // A smaller electorate may have just reached quorum.
        if let Some(target) = open_vote {
            self.evaluate(island, target).await;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Purge expired invites (and their rows) and expired votes.
    pub async fn sweep(&self) -> SweepReport {
        let now = self.now();

        let expired_invites: Vec<CoopInvite> = {
            let mut invites = self.invites.lock();
            let expired: Vec<PlayerId> = invites
                .values()
                .filter(|i| i.is_expired(now))
                .map(|i| i.invitee_id)
                .collect();
            expired.iter().filter_map(|p| invites.remove(p)).collect()
        };
        for invite in &expired_invites {
            self.delete_invite_row(invite.invitee_id).await;
            let notice = Notice::InviteExpired {
                island_id: invite.island_id,
            };
            self.notify(&invite.invitee_id, notice.clone());
            self.notify(&invite.inviter_id, notice);
        }

        let expired_votes: Vec<KickVote> = {
            let mut votes = self.votes.lock();
            let expired: Vec<IslandId> = votes
                .values()
                .filter(|v| v.is_expired(now))
                .map(|v| v.island_id)
                .collect();
            expired.iter().filter_map(|id| votes.remove(id)).collect()
        };
        for vote in &expired_votes {
            self.notify_all(
                &vote.voters,
                Notice::KickVoteExpired {
                    target: vote.target_id,
                },
            );
        }

        let report = SweepReport {
            expired_invites: expired_invites.len(),
            expired_votes: expired_votes.len(),
        };
        if report != SweepReport::default() {
            log::debug!(
                "Co-op sweep expired {} invite(s), {} vote(s)",
                report.expired_invites,
                report.expired_votes
            );
        }
        report
    }

    /// Drop every invite to `island` (and its rows) and its running vote.
    /// Called once the island is gone. Returns the number of invites dropped.
    pub async fn forget_island(&self, island: IslandId) -> usize {
        let dropped: Vec<CoopInvite> = {
            let mut invites = self.invites.lock();
            let invitees: Vec<PlayerId> = invites
                .values()
                .filter(|i| i.island_id == island)
                .map(|i| i.invitee_id)
                .collect();
            invitees.iter().filter_map(|p| invites.remove(p)).collect()
        };
        for invite in &dropped {
            self.delete_invite_row(invite.invitee_id).await;
        }
        let vote = self.votes.lock().remove(&island);
        if !dropped.is_empty() || vote.is_some() {
            log::debug!(
                "Dropped {} invite(s) and {} vote(s) of removed island {}",
                dropped.len(),
                usize::from(vote.is_some()),
                island
            );
        }
        dropped.len()
    }

    /// Reset the requester's island and forget its invites and vote.
    pub async fn reset_island(&self, profile: ProfileId, requester: PlayerId) -> bool {
        let island_id = match self.registry.get_island(profile).await {
            Ok(Some(island)) => island.id(),
            Ok(None) => return false,
            Err(e) => {
                log::error!("Failed to resolve island for reset: {}", e);
                return false;
            }
        };
        if !self.registry.reset_island(profile, requester).await {
            return false;
        }
        self.forget_island(island_id).await;
        true
    }

    /// Reload persisted invites after a restart, dropping expired rows.
    pub async fn restore(&self) -> Result<usize> {
        let now = self.now();
        let stored = self.registry.store().load_invites().await?;
        let mut restored = 0;
        for invite in stored {
            if invite.is_expired(now) {
                if let Err(e) = self.registry.store().delete_invite(invite.invitee_id).await {
                    log::error!("Failed to delete expired invite row: {}", e);
                }
                continue;
            }
            self.invites.lock().insert(invite.invitee_id, invite);
            restored += 1;
        }
        log::info!("Restored {} pending co-op invite(s)", restored);
        Ok(restored)
    }

    /// Delete every outstanding invite row; abandon running votes.
    pub async fn shutdown(&self) {
        let invites: Vec<CoopInvite> = self.invites.lock().drain().map(|(_, i)| i).collect();
        for invite in &invites {
            if let Err(e) = self.registry.store().delete_invite(invite.invitee_id).await {
                log::warn!("Failed to delete invite row for {}: {}", invite.invitee_id, e);
            }
        }
        let votes = {
            let mut votes = self.votes.lock();
            let n = votes.len();
            votes.clear();
            n
        };
        log::info!(
            "Co-op service shut down ({} invite(s) dropped, {} vote(s) abandoned)",
            invites.len(),
            votes
        );
    }

    pub fn pending_invite_count(&self) -> usize {
        self.invites.lock().len()
    }

    pub fn active_vote_count(&self) -> usize {
        self.votes.lock().len()
    }
}
