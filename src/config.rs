//! Service configuration.
//!
//! Loaded with the `config` crate from an optional TOML file, then
//! environment variables prefixed `ISLANDS` with `__` between sections:
//!
//! | Key                                   | Default | Description                         |
//! |---------------------------------------|---------|-------------------------------------|
//! | `ISLANDS__REGISTRY__CACHE_CAPACITY`   | `256`   | Islands held in the write-back cache|
//! | `ISLANDS__REGISTRY__CACHE_IDLE_SECS`  | `1800`  | Idle time before cache eviction     |
//! | `ISLANDS__WORLD__BACKEND`             | `directory` | `directory` or `memory`         |
//! | `ISLANDS__WORLD__IDLE_SECS`           | `600`   | Unoccupied world unload threshold   |
//! | `ISLANDS__COOP__INVITE_TTL_SECS`      | `300`   | Co-op invite lifetime               |
//! | `ISLANDS__COOP__VOTE_TTL_SECS`        | `600`   | Kick vote lifetime                  |
//! | `ISLANDS__COOP__MAX_MEMBERS`          | `5`     | Members per island, owner included  |
//! | `ISLANDS__STORE__PATH`                | *(none)*| JSON store file; in-memory if unset |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn chrono_secs(s: u64) -> chrono::Duration {
    chrono::Duration::seconds(s as i64)
}

// ---------------------------------------------------------------------------
// Registry + cache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum islands resident in the cache.
    pub cache_capacity: usize,
    /// Idle time after which a cached island is written back and dropped.
    pub cache_idle_secs: u64,
    /// How often the cache idle sweep runs.
    pub cache_sweep_secs: u64,
    /// Side length of a new island.
    pub default_size: u32,
    /// Concurrent visitor cap for a new island.
    pub default_guest_limit: u32,
}

impl RegistryConfig {
    pub fn cache_idle(&self) -> chrono::Duration {
        chrono_secs(self.cache_idle_secs)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        secs(self.cache_sweep_secs)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 256,
            cache_idle_secs: 30 * 60,
            cache_sweep_secs: 60,
            default_size: 100,
            default_guest_limit: 8,
        }
    }
}

// ---------------------------------------------------------------------------
// Visitor rewards
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VisitorConfig {
    /// Social XP awarded to the owner per minute a visitor stays.
    pub xp_per_minute: f64,
    /// Cap on social XP from a single visit.
    pub max_xp_per_visit: f64,
    /// Visits shorter than this earn nothing.
    pub min_visit_secs: u64,
}

impl Default for VisitorConfig {
    fn default() -> Self {
        Self {
            xp_per_minute: 2.0,
            max_xp_per_visit: 50.0,
            min_visit_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// World provider
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WorldBackend {
    /// Worlds are directories copied from a template.
    Directory,
    /// Worlds exist only in process memory.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldConfig {
    pub backend: WorldBackend,
    /// Directory holding one sub-directory per island world.
    pub worlds_dir: PathBuf,
    /// Template copied for each new island.
    pub template_dir: PathBuf,
    /// Unoccupied worlds idle longer than this are unloaded.
    pub idle_secs: u64,
    /// How often the idle sweep runs.
    pub sweep_secs: u64,
    /// PvP rule applied to freshly provisioned worlds.
    pub default_pvp: bool,
}

impl WorldConfig {
    pub fn idle_threshold(&self) -> chrono::Duration {
        chrono_secs(self.idle_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        secs(self.sweep_secs)
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            backend: WorldBackend::Directory,
            worlds_dir: PathBuf::from("data/islands"),
            template_dir: PathBuf::from("data/templates/island"),
            idle_secs: 10 * 60,
            sweep_secs: 10 * 60,
            default_pvp: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Co-op
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoopConfig {
    pub invite_ttl_secs: u64,
    pub vote_ttl_secs: u64,
    pub sweep_secs: u64,
    /// Members per island, owner included.
    pub max_members: usize,
}

impl CoopConfig {
    pub fn invite_ttl(&self) -> chrono::Duration {
        chrono_secs(self.invite_ttl_secs)
    }

    pub fn vote_ttl(&self) -> chrono::Duration {
        chrono_secs(self.vote_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        secs(self.sweep_secs)
    }
}

impl Default for CoopConfig {
    fn default() -> Self {
        Self {
            invite_ttl_secs: 5 * 60,
            vote_ttl_secs: 10 * 60,
            sweep_secs: 60,
            max_members: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON file backing the tables. `None` keeps everything in memory.
    pub path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IslandsConfig {
    pub registry: RegistryConfig,
    pub visitors: VisitorConfig,
    pub world: WorldConfig,
    pub coop: CoopConfig,
    pub store: StoreConfig,
}

impl IslandsConfig {
    /// Layer an optional file under `ISLANDS__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix("ISLANDS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = IslandsConfig::default();
        assert_eq!(cfg.registry.cache_idle(), chrono::Duration::minutes(30));
        assert_eq!(cfg.world.sweep_interval(), Duration::from_secs(600));
        assert_eq!(cfg.coop.invite_ttl(), chrono::Duration::minutes(5));
        assert_eq!(cfg.coop.vote_ttl(), chrono::Duration::minutes(10));
        assert_eq!(cfg.coop.sweep_interval(), Duration::from_secs(60));
        assert_eq!(cfg.world.backend, WorldBackend::Directory);
        assert!(!cfg.world.default_pvp);
    }

    #[test]
    fn file_overrides_selected_keys() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[coop]\ninvite_ttl_secs = 120\nmax_members = 3\n\n[world]\nbackend = \"memory\""
        )
        .unwrap();

        let cfg = IslandsConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.coop.invite_ttl_secs, 120);
        assert_eq!(cfg.coop.max_members, 3);
        assert_eq!(cfg.coop.vote_ttl_secs, 600);
        assert_eq!(cfg.world.backend, WorldBackend::Memory);
        assert_eq!(cfg.registry, RegistryConfig::default());
    }
}
