//! Network Layer
//!
//! WebSocket sync between the tournament service and its viewers.
//! Delivery is at-most-once; clients recover by re-fetching snapshots
//! when told to refresh or after reconnecting.

pub mod auth;
pub mod protocol;
pub mod publisher;
pub mod server;
pub mod client;

pub use auth::{AuthConfig, TokenClaims, AuthError, validate_token, authorize_admin};
pub use protocol::{
    ClientMessage, ServerMessage, ServerError, ErrorCode, Topic, RefreshKind, TournamentEvent,
};
pub use publisher::{EventPublisher, Published};
pub use server::{SyncServer, ServerConfig, SyncServerError};
pub use client::{SyncClient, SyncClientConfig, SyncClientError, Payload, TopicMessage};
