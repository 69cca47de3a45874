//! Core identity and value types shared across all modules.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// A connected (or offline) player.
    PlayerId
);
id_type!(
    /// A progression profile. Owns at most one island.
    ProfileId
);
id_type!(
    /// Primary key of an island row.
    IslandId
);

impl IslandId {
    /// Backing resource name derived from the island id.
    ///
    /// Stable for the life of the island; never reused after a reset because
    /// a reset island gets a fresh id.
    pub fn resource_name(&self) -> String {
        format!("island_{}", self.0.simple())
    }
}

// ---------------------------------------------------------------------------
// Spatial
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

impl Pose {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    pub fn facing(mut self, yaw: f32, pitch: f32) -> Self {
        self.yaw = yaw;
        self.pitch = pitch;
        self
    }

    /// Centre of a freshly provisioned island template.
    pub fn island_origin() -> Self {
        Self::new(0.5, 100.0, 0.5)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::island_origin()
    }
}

impl std::fmt::Display for Pose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:.2}, {:.2}, {:.2} | {:.1}/{:.1})",
            self.x, self.y, self.z, self.yaw, self.pitch
        )
    }
}

// ---------------------------------------------------------------------------
// World rule profile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Peaceful,
    Easy,
    Normal,
    Hard,
}

/// Game rules applied to every freshly provisioned island world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldRules {
    pub pvp: bool,
    pub mob_spawning: bool,
    pub weather_cycle: bool,
    pub keep_inventory: bool,
    pub difficulty: Difficulty,
}

impl WorldRules {
    pub fn with_pvp(pvp: bool) -> Self {
        Self {
            pvp,
            ..Self::default()
        }
    }
}

impl Default for WorldRules {
    fn default() -> Self {
        Self {
            pvp: false,
            mob_spawning: true,
            weather_cycle: false,
            keep_inventory: true,
            difficulty: Difficulty::Hard,
        }
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IslandStats {
    pub cached_islands: usize,
    pub resident_worlds: usize,
    pub open_visits: usize,
    pub pending_invites: usize,
    pub active_votes: usize,
}
