//! Error types for island, co-op and persistence operations.

use thiserror::Error;

use crate::types::ProfileId;

/// A user-facing rejection. Nothing was mutated when one of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("you are not a member of this island")]
    NotMember,
    #[error("only the island owner can do that")]
    NotOwner,
    #[error("this island is private")]
    PrivateIsland,
    #[error("you are banned from this island")]
    Banned,
    #[error("this island has reached its guest limit")]
    GuestLimitReached,
    #[error("that player is already a member of this island")]
    AlreadyMember,
    #[error("that player already has a pending invite")]
    InvitePending,
    #[error("you cannot invite yourself")]
    SelfInvite,
    #[error("this island has no free co-op slots")]
    IslandFull,
    #[error("that player cannot be kicked")]
    NotKickable,
    #[error("the island owner cannot leave their own island")]
    OwnerCannotLeave,
    #[error("you have already voted")]
    AlreadyVoted,
    #[error("you cannot vote on your own kick")]
    CannotVoteOnSelf,
    #[error("another kick vote is already running on this island")]
    VoteInProgress,
    #[error("members cannot be banned; remove them first")]
    CannotBanMember,
}

/// Failure in the persistent store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store encoding error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum IslandError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("an island already exists for profile {0}")]
    AlreadyExists(ProfileId),

    #[error("{0} not found")]
    NotFound(String),

    #[error("the invite has expired")]
    Expired,

    #[error("failed to prepare island world '{0}'")]
    ProvisionFailed(String),

    #[error("blocked by {hook}: {reason}")]
    Vetoed { hook: String, reason: String },

    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl IslandError {
    pub fn not_found(what: impl Into<String>) -> Self {
        IslandError::NotFound(what.into())
    }

    /// The validation kind, if this is a user-facing rejection.
    pub fn validation(&self) -> Option<ValidationError> {
        match self {
            IslandError::Validation(v) => Some(*v),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, IslandError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_transparent() {
        let err: IslandError = ValidationError::OwnerCannotLeave.into();
        assert_eq!(
            err.to_string(),
            "the island owner cannot leave their own island"
        );
        assert_eq!(err.validation(), Some(ValidationError::OwnerCannotLeave));
        assert_eq!(IslandError::Expired.validation(), None);
    }
}
