//! Island Co-op Service
//!
//! Per-profile island worlds with shared co-op ownership, invites and
//! majority kick votes, on top of an asynchronous write-back cache.
//!
//! ## Architecture
//!
//! ```text
//! IslandService  (service.rs)  ← wiring + periodic sweeps
//!   ├── CoopInviteService (coop.rs)      ← invites, kick votes, leaving
//!   └── IslandRegistry    (registry.rs)  ← create, resolve, teleport, reset
//!         ├── IslandCache   (cache.rs)   ← write-back arena of SharedIsland
//!         ├── IslandStore   (store/)     ← persistence boundary
//!         ├── WorldProvider (world/)     ← backing resource lifecycle
//!         └── PlayerHost    (host.rs)    ← game host boundary
//! ProtectionGuard (protection.rs)       ← read-only permission checks
//! ```
//!
//! Pre-commit [`hooks`] can veto island creation and teleports. Lifecycle
//! events are published on the [`bus`].

// Model, protocol and config are always available (no server feature needed).
pub mod clock;
pub mod config;
pub mod error;
pub mod hooks;
pub mod island;
pub mod protection;
pub mod protocol;
pub mod types;

// Server-side modules require the `server` feature.
#[cfg(feature = "server")]
pub mod bus;
#[cfg(feature = "server")]
pub mod cache;
#[cfg(feature = "server")]
pub mod coop;
#[cfg(feature = "server")]
pub mod host;
#[cfg(feature = "server")]
pub mod registry;
#[cfg(feature = "server")]
pub mod service;
#[cfg(feature = "server")]
pub mod store;
#[cfg(feature = "server")]
pub mod visitors;
#[cfg(feature = "server")]
pub mod world;

// Convenience re-exports (server only)
#[cfg(feature = "server")]
pub use cache::SharedIsland;
#[cfg(feature = "server")]
pub use coop::{CoopInvite, CoopInviteService, KickVote, VoteStatus};
#[cfg(feature = "server")]
pub use registry::{Arrival, IslandRegistry};
#[cfg(feature = "server")]
pub use service::IslandService;
#[cfg(feature = "server")]
pub use store::{IslandStore, TableStore};
#[cfg(feature = "server")]
pub use world::{DirectoryWorldProvider, InMemoryWorldProvider, WorldHandle, WorldProvider};
pub use crate::config::IslandsConfig;
pub use error::{IslandError, StoreError, ValidationError};
pub use island::{Island, Role};
pub use protection::{Interaction, ProtectionGuard};
pub use types::{IslandId, PlayerId, Pose, ProfileId};
