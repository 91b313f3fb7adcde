//! # King of the Hill Server
//!
//! Tournament engine for King of the Hill ladders, with real-time
//! WebSocket synchronization for viewers and admin controls.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  KING OF THE HILL SERVER                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared primitives                         │
//! │  ├── ids.rs      - Player, map and tournament identifiers    │
//! │  └── hash.rs     - Log record digests                        │
//! │                                                              │
//! │  tournament/     - Ladder logic (pure, synchronous)          │
//! │  ├── types.rs    - Players, maps, games, results             │
//! │  ├── state.rs    - Tournament state machine                  │
//! │  ├── matchmaker.rs - Challenger and map selection            │
//! │  ├── streak.rs   - Streak bookkeeping                        │
//! │  ├── roster.rs   - Roster access                             │
//! │  └── snapshot.rs - Viewer read model                         │
//! │                                                              │
//! │  archive/        - Finished tournament logs                  │
//! │  service.rs      - Serialized commands, commit, broadcast    │
//! │                                                              │
//! │  network/        - Sync layer (async)                        │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── client.rs   - Reconnecting sync client                  │
//! │  ├── publisher.rs- Event fan-out                             │
//! │  ├── protocol.rs - Message types                             │
//! │  └── auth.rs     - Admin token validation                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! Every admin command either commits a whole transition or changes
//! nothing. Broadcasts go out only after commit, in commit order, and
//! carry a revision shared by all messages of one transition. Delivery is
//! at-most-once; clients re-fetch snapshots on refresh and on reconnect.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod tournament;
pub mod archive;
pub mod service;
pub mod network;

// Re-export commonly used types
pub use crate::core::ids::{PlayerId, MapId, TournamentId};
pub use tournament::{
    Player, GameMap, Race, Tournament, TournamentError, TournamentStatus, TournamentSnapshot,
    Viewer, Roster, InMemoryRoster,
};
pub use archive::{LogRecord, LogSummary, LogStore, InMemoryLogStore};
pub use service::{TournamentService, ServiceConfig, AdminIdentity};
pub use network::{SyncServer, SyncClient, SyncClientConfig, Topic, RefreshKind};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
