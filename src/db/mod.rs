//! Persistent store: classified posts and per-channel outbox queues.

mod outbox;
mod posts;
mod schema;
mod sqlite;

pub use outbox::{ChannelKind, ClaimedItem, FailureOutcome, OutboxCounts, OutboxRow, OutboxStatus};
pub use schema::SCHEMA;
pub use sqlite::Database;
