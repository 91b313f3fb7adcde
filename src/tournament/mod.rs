//! Tournament Progression Engine
//!
//! All ladder logic. Pure and synchronous; the service layer adds
//! locking and broadcasting on top.
//!
//! ## Module Structure
//!
//! - `types`: Players, maps, games, status and result records
//! - `state`: The tournament state machine
//! - `matchmaker`: Challenger and map selection
//! - `streak`: Streak and result bookkeeping
//! - `roster`: Roster access consumed by the engine
//! - `snapshot`: Viewer-facing read model

pub mod types;
pub mod state;
pub mod matchmaker;
pub mod streak;
pub mod roster;
pub mod snapshot;

// Re-export key types
pub use types::{Player, GameMap, Race, CurrentGame, PreviousGame, TournamentStatus, TournamentResult};
pub use state::{Tournament, TournamentError, GameOutcome};
pub use matchmaker::Matchmaker;
pub use roster::{Roster, InMemoryRoster, RosterError, RosterSeed, PlayerSeed};
pub use snapshot::{project, TournamentSnapshot, TournamentView, Viewer, DEFAULT_RECENT_GAMES};
