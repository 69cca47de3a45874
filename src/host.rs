//! The game host as seen from the core: where players are, moving them,
//! messaging them and crediting rewards.

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::protocol::Notice;
use crate::types::{PlayerId, Pose};

/// Implemented by the embedding game server.
///
/// Calls are fire-and-forget from the core's point of view and must not block.
pub trait PlayerHost: Send + Sync {
    /// Backing resource the player is currently in, if online.
    fn current_world(&self, player: &PlayerId) -> Option<String>;

    /// Move a player into `world` at `pose`.
    fn move_to(&self, player: &PlayerId, world: &str, pose: Pose);

    /// Relocate a player to the neutral hub.
    fn send_to_hub(&self, player: &PlayerId);

    fn notify(&self, player: &PlayerId, notice: &Notice);

    fn award_social_xp(&self, player: &PlayerId, xp: f64);
}

// ---------------------------------------------------------------------------
// LoggingHost
// ---------------------------------------------------------------------------

/// Host for headless deployments: tracks positions in memory and logs
/// everything else.
#[derive(Default)]
pub struct LoggingHost {
    positions: Mutex<HashMap<PlayerId, String>>,
}

impl LoggingHost {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlayerHost for LoggingHost {
    fn current_world(&self, player: &PlayerId) -> Option<String> {
        self.positions.lock().get(player).cloned()
    }

    fn move_to(&self, player: &PlayerId, world: &str, pose: Pose) {
        log::info!("Moving {} to {} at {}", player, world, pose);
        self.positions.lock().insert(*player, world.to_string());
    }

    fn send_to_hub(&self, player: &PlayerId) {
        log::info!("Sending {} to hub", player);
        self.positions.lock().remove(player);
    }

    fn notify(&self, player: &PlayerId, notice: &Notice) {
        log::info!("[{}] {}", player, notice);
    }

    fn award_social_xp(&self, player: &PlayerId, xp: f64) {
        log::info!("Awarding {:.1} social XP to {}", xp, player);
    }
}

// ---------------------------------------------------------------------------
// RecordingHost
// ---------------------------------------------------------------------------

/// Host that records every call, for tests and embedders that poll.
#[derive(Default)]
pub struct RecordingHost {
    positions: Mutex<HashMap<PlayerId, String>>,
    notices: Mutex<Vec<(PlayerId, Notice)>>,
    xp: Mutex<HashMap<PlayerId, f64>>,
    moves: Mutex<Vec<(PlayerId, String, Pose)>>,
    hub_sends: Mutex<Vec<PlayerId>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a player without going through [`PlayerHost::move_to`].
    pub fn place(&self, player: PlayerId, world: impl Into<String>) {
        self.positions.lock().insert(player, world.into());
    }

    pub fn notices_for(&self, player: &PlayerId) -> Vec<Notice> {
        self.notices
            .lock()
            .iter()
            .filter(|(p, _)| p == player)
            .map(|(_, n)| n.clone())
            .collect()
    }

    pub fn xp_for(&self, player: &PlayerId) -> f64 {
        self.xp.lock().get(player).copied().unwrap_or(0.0)
    }

    pub fn moves(&self) -> Vec<(PlayerId, String, Pose)> {
        self.moves.lock().clone()
    }

    pub fn hub_sends(&self) -> Vec<PlayerId> {
        self.hub_sends.lock().clone()
    }
}

impl PlayerHost for RecordingHost {
    fn current_world(&self, player: &PlayerId) -> Option<String> {
        self.positions.lock().get(player).cloned()
    }

    fn move_to(&self, player: &PlayerId, world: &str, pose: Pose) {
        self.positions.lock().insert(*player, world.to_string());
        self.moves.lock().push((*player, world.to_string(), pose));
    }

    fn send_to_hub(&self, player: &PlayerId) {
        self.positions.lock().remove(player);
        self.hub_sends.lock().push(*player);
    }

    fn notify(&self, player: &PlayerId, notice: &Notice) {
        self.notices.lock().push((*player, notice.clone()));
    }

    fn award_social_xp(&self, player: &PlayerId, xp: f64) {
        *self.xp.lock().entry(*player).or_insert(0.0) += xp;
    }
}
