//! Core primitives.
//!
//! Identifier newtypes shared by every layer and the digest hasher used
//! to fingerprint archived tournament logs.

pub mod ids;
pub mod hash;

// Re-export core types
pub use ids::{PlayerId, MapId, TournamentId};
pub use hash::{LogDigest, LogHasher, digest_hex};
