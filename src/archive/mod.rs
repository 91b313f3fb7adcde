//! Tournament Log Archive
//!
//! Finished tournaments are frozen into [`LogRecord`]s: the shape that
//! log listing and download collaborators serve.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    LOG ARCHIVE                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  record.rs  - Log record, summary, digest, text rendering   │
//! │  store.rs   - Storage seam and in-memory store              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod record;
pub mod store;

// Re-export key types
pub use record::{LogRecord, LogSummary, LOG_VERSION};
pub use store::{LogStore, InMemoryLogStore};
