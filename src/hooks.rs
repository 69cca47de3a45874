//! Vetoable pre-commit hooks.
//!
//! Hooks run synchronously, in priority order (lowest first), before the
//! guarded state change commits. The first [`HookVerdict::Veto`] stops the
//! chain and aborts the operation.

use std::sync::{Arc, RwLock};

use crate::error::IslandError;
use crate::island::Island;
use crate::types::{PlayerId, ProfileId};

#[derive(Debug, Clone, Copy)]
pub enum HookEvent<'a> {
    /// A new island is about to be provisioned.
    IslandCreate { profile: ProfileId, owner: PlayerId },
    /// A player is about to be moved onto an island.
    IslandTeleport {
        player: PlayerId,
        island: &'a Island,
        as_member: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookVerdict {
    Accept,
    Veto(String),
}

pub trait PreCommitHook: Send + Sync {
    fn id(&self) -> &str;

    fn priority(&self) -> i32 {
        100
    }

    fn check(&self, event: &HookEvent<'_>) -> HookVerdict;
}

#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<Vec<Arc<dyn PreCommitHook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook. Equal priorities keep registration order.
    pub fn register(&self, hook: Arc<dyn PreCommitHook>) {
        let mut hooks = self.hooks.write().unwrap_or_else(|e| e.into_inner());
        hooks.push(hook);
        hooks.sort_by_key(|h| h.priority());
    }

    pub fn unregister(&self, id: &str) -> bool {
        let mut hooks = self.hooks.write().unwrap_or_else(|e| e.into_inner());
        let before = hooks.len();
        hooks.retain(|h| h.id() != id);
        hooks.len() != before
    }

    pub fn len(&self) -> usize {
        self.hooks.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the chain. Returns [`IslandError::Vetoed`] on the first veto.
    pub fn dispatch(&self, event: &HookEvent<'_>) -> Result<(), IslandError> {
        let hooks = self.hooks.read().unwrap_or_else(|e| e.into_inner()).clone();
        for hook in hooks {
            if let HookVerdict::Veto(reason) = hook.check(event) {
                log::debug!("Hook '{}' vetoed {:?}: {}", hook.id(), kind(event), reason);
                return Err(IslandError::Vetoed {
                    hook: hook.id().to_string(),
                    reason,
                });
            }
        }
        Ok(())
    }
}

fn kind(event: &HookEvent<'_>) -> &'static str {
    match event {
        HookEvent::IslandCreate { .. } => "island-create",
        HookEvent::IslandTeleport { .. } => "island-teleport",
    }
}
