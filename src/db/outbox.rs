//! Outbox queue operations.
//!
//! Every state change is a single conditional UPDATE, so concurrent workers
//! on the same table never both move a row out of `pending`, and a worker
//! whose lease has expired cannot overwrite the outcome of a newer claim.

use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::Database;
use crate::post::PostKey;

/// Delivery channel; each has its own outbox table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Telegram,
    VkRepost,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 2] = [ChannelKind::Telegram, ChannelKind::VkRepost];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Telegram => "telegram",
            ChannelKind::VkRepost => "vk_repost",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            ChannelKind::Telegram => "outbox_telegram",
            ChannelKind::VkRepost => "outbox_vk",
        }
    }

    /// Column holding the id the remote side assigned on success.
    pub fn remote_id_column(&self) -> &'static str {
        match self {
            ChannelKind::Telegram => "tg_message_id",
            ChannelKind::VkRepost => "vk_post_id",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Sending,
    Sent,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Sending => "sending",
            OutboxStatus::Sent => "sent",
            OutboxStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OutboxStatus::Pending),
            "sending" => Some(OutboxStatus::Sending),
            "sent" => Some(OutboxStatus::Sent),
            "failed" => Some(OutboxStatus::Failed),
            _ => None,
        }
    }
}

/// A row moved to `sending` by [`Database::claim_outbox`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedItem {
    pub id: i64,
    pub key: PostKey,
    pub retries: i64,
    /// Lease stamped by the claim; terminal updates must present it.
    pub leased_until: i64,
    pub created_at: i64,
}

/// Result of recording a failed delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back to `pending` for another attempt.
    Requeued { retries: i64 },
    /// Retry ceiling reached (or permanent error); never claimed again.
    Failed { retries: i64 },
    /// The lease was lost to a reap or another claim; nothing was written.
    LeaseLost,
}

/// Full outbox row, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxRow {
    pub id: i64,
    pub key: PostKey,
    pub status: OutboxStatus,
    pub leased_until: Option<i64>,
    pub retries: i64,
    pub last_error: Option<String>,
    pub remote_id: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboxCounts {
    pub pending: i64,
    pub sending: i64,
    pub sent: i64,
    pub failed: i64,
}

impl Database {
    /// Queue a post for a channel. Returns false if it was already queued.
    pub fn enqueue(&self, channel: ChannelKind, key: PostKey, now: i64) -> Result<bool> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            INSERT INTO {} (owner_id, post_id, status, retries, created_at, updated_at)
            VALUES (?1, ?2, 'pending', 0, ?3, ?3)
            ON CONFLICT(owner_id, post_id) DO NOTHING
            "#,
            channel.table()
        );
        let inserted = conn
            .execute(&sql, params![key.owner_id, key.post_id, now])
            .with_context(|| format!("Failed to enqueue {} for {}", key, channel))?;
        Ok(inserted > 0)
    }

    /// Return expired `sending` rows to `pending`. Retries are untouched.
    pub fn reap_expired(&self, channel: ChannelKind, now: i64) -> Result<usize> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            UPDATE {}
            SET status = 'pending', leased_until = NULL, updated_at = ?1
            WHERE status = 'sending' AND leased_until < ?1
            "#,
            channel.table()
        );
        Ok(conn.execute(&sql, params![now])?)
    }

    /// Atomically lease up to `batch` of the oldest pending rows.
    ///
    /// Returned items are in enqueue order.
    pub fn claim_outbox(
        &self,
        channel: ChannelKind,
        now: i64,
        lease_ttl: i64,
        batch: usize,
    ) -> Result<Vec<ClaimedItem>> {
        let conn = self.conn()?;
        let table = channel.table();
        let sql = format!(
            r#"
            UPDATE {table}
            SET status = 'sending', leased_until = ?1, updated_at = ?2
            WHERE id IN (
                SELECT id FROM {table}
                WHERE status = 'pending' AND (leased_until IS NULL OR leased_until < ?2)
                ORDER BY created_at, id
                LIMIT ?3
            )
            RETURNING id, owner_id, post_id, retries, leased_until, created_at
            "#
        );
        let lease = now + lease_ttl;
        let mut stmt = conn.prepare(&sql)?;
        let mut items = stmt
            .query_map(params![lease, now, batch as i64], |row| {
                Ok(ClaimedItem {
                    id: row.get(0)?,
                    key: PostKey::new(row.get(1)?, row.get(2)?),
                    retries: row.get(3)?,
                    leased_until: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Failed to claim {} outbox", channel))?;
        items.sort_by_key(|item| (item.created_at, item.id));
        Ok(items)
    }

    /// Record a successful delivery. Returns false if the lease was lost.
    pub fn mark_sent(
        &self,
        channel: ChannelKind,
        item: &ClaimedItem,
        remote_id: Option<i64>,
        now: i64,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            UPDATE {}
            SET status = 'sent', {} = ?1, leased_until = NULL, last_error = NULL, updated_at = ?2
            WHERE id = ?3 AND status = 'sending' AND leased_until = ?4
            "#,
            channel.table(),
            channel.remote_id_column()
        );
        let updated = conn.execute(&sql, params![remote_id, now, item.id, item.leased_until])?;
        Ok(updated > 0)
    }

    /// Record a failed attempt: back to `pending`, or `failed` once
    /// `retries + 1` reaches `max_retries`.
    pub fn mark_retry(
        &self,
        channel: ChannelKind,
        item: &ClaimedItem,
        error: &str,
        max_retries: u32,
        now: i64,
    ) -> Result<FailureOutcome> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            UPDATE {}
            SET status = CASE WHEN retries + 1 >= ?1 THEN 'failed' ELSE 'pending' END,
                retries = retries + 1,
                last_error = ?2,
                leased_until = NULL,
                updated_at = ?3
            WHERE id = ?4 AND status = 'sending' AND leased_until = ?5
            RETURNING status, retries
            "#,
            channel.table()
        );
        let row: Option<(String, i64)> = conn
            .query_row(
                &sql,
                params![max_retries, error, now, item.id, item.leased_until],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(match row {
            Some((status, retries)) if status == OutboxStatus::Failed.as_str() => {
                FailureOutcome::Failed { retries }
            }
            Some((_, retries)) => FailureOutcome::Requeued { retries },
            None => FailureOutcome::LeaseLost,
        })
    }

    /// Mark an item `failed` without retrying it.
    pub fn mark_failed(
        &self,
        channel: ChannelKind,
        item: &ClaimedItem,
        error: &str,
        now: i64,
    ) -> Result<FailureOutcome> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            UPDATE {}
            SET status = 'failed', last_error = ?1, leased_until = NULL, updated_at = ?2
            WHERE id = ?3 AND status = 'sending' AND leased_until = ?4
            "#,
            channel.table()
        );
        let updated = conn.execute(&sql, params![error, now, item.id, item.leased_until])?;
        Ok(if updated > 0 {
            FailureOutcome::Failed {
                retries: item.retries,
            }
        } else {
            FailureOutcome::LeaseLost
        })
    }

    pub fn outbox_counts(&self, channel: ChannelKind) -> Result<OutboxCounts> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT status, COUNT(*) FROM {} GROUP BY status",
            channel.table()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut counts = OutboxCounts::default();
        for row in rows {
            let (status, count) = row?;
            match OutboxStatus::from_str(&status) {
                Some(OutboxStatus::Pending) => counts.pending = count,
                Some(OutboxStatus::Sending) => counts.sending = count,
                Some(OutboxStatus::Sent) => counts.sent = count,
                Some(OutboxStatus::Failed) => counts.failed = count,
                None => tracing::warn!(channel = %channel, status = %status, "Unknown outbox status"),
            }
        }
        Ok(counts)
    }

    pub fn outbox_row(&self, channel: ChannelKind, key: PostKey) -> Result<Option<OutboxRow>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT id, owner_id, post_id, status, leased_until, retries, last_error, {},
                   created_at, updated_at
            FROM {}
            WHERE owner_id = ? AND post_id = ?
            "#,
            channel.remote_id_column(),
            channel.table()
        );
        let row = conn
            .query_row(&sql, params![key.owner_id, key.post_id], |row| {
                let status: String = row.get(3)?;
                Ok(OutboxRow {
                    id: row.get(0)?,
                    key: PostKey::new(row.get(1)?, row.get(2)?),
                    status: OutboxStatus::from_str(&status).unwrap_or(OutboxStatus::Pending),
                    leased_until: row.get(4)?,
                    retries: row.get(5)?,
                    last_error: row.get(6)?,
                    remote_id: row.get(7)?,
                    created_at: row.get(8)?,
                    updated_at: row.get(9)?,
                })
            })
            .optional()?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CH: ChannelKind = ChannelKind::Telegram;

    fn db_with(keys: &[(i64, i64)]) -> Database {
        let db = Database::open_in_memory().unwrap();
        for (i, &(owner, post)) in keys.iter().enumerate() {
            db.enqueue(CH, PostKey::new(owner, post), 1_000 + i as i64).unwrap();
        }
        db
    }

    fn status(db: &Database, post: i64) -> OutboxStatus {
        db.outbox_row(CH, PostKey::new(-1, post)).unwrap().unwrap().status
    }

    #[test]
    fn test_enqueue_is_deduplicated() {
        let db = Database::open_in_memory().unwrap();
        let key = PostKey::new(-1, 10);
        assert!(db.enqueue(CH, key, 1).unwrap());
        for now in 2..10 {
            assert!(!db.enqueue(CH, key, now).unwrap());
        }
        assert_eq!(db.outbox_counts(CH).unwrap().pending, 1);
    }

    #[test]
    fn test_channels_are_independent() {
        let db = Database::open_in_memory().unwrap();
        let key = PostKey::new(-1, 10);
        assert!(db.enqueue(ChannelKind::Telegram, key, 1).unwrap());
        assert!(db.enqueue(ChannelKind::VkRepost, key, 1).unwrap());
        assert_eq!(db.outbox_counts(ChannelKind::VkRepost).unwrap().pending, 1);
    }

    #[test]
    fn test_claim_is_fifo_and_bounded() {
        let db = db_with(&[(-1, 3), (-1, 1), (-1, 2)]);
        let claimed = db.claim_outbox(CH, 2_000, 30, 2).unwrap();
        let posts: Vec<i64> = claimed.iter().map(|c| c.key.post_id).collect();
        assert_eq!(posts, [3, 1]);
        assert!(claimed.iter().all(|c| c.leased_until == 2_030));
        assert_eq!(status(&db, 2), OutboxStatus::Pending);
        assert_eq!(status(&db, 3), OutboxStatus::Sending);
    }

    #[test]
    fn test_claimed_rows_are_not_claimed_twice() {
        let db = db_with(&[(-1, 1), (-1, 2)]);
        let first = db.claim_outbox(CH, 2_000, 30, 10).unwrap();
        let second = db.claim_outbox(CH, 2_001, 30, 10).unwrap();
        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
    }

    #[test]
    fn test_concurrent_claims_from_two_connections_are_disjoint() {
        use std::collections::HashSet;
        use std::sync::{Arc, Barrier};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lostdogs.db");
        let first = Database::open(&path, std::time::Duration::from_secs(5)).unwrap();
        let second = Database::open(&path, std::time::Duration::from_secs(5)).unwrap();
        for post in 1..=40 {
            first.enqueue(CH, PostKey::new(-1, post), post).unwrap();
        }

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [first, second]
            .into_iter()
            .map(|db| {
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let mut ids = Vec::new();
                    loop {
                        let batch = db.claim_outbox(CH, 2_000, 30, 3).unwrap();
                        if batch.is_empty() {
                            break ids;
                        }
                        ids.extend(batch.into_iter().map(|item| item.id));
                    }
                })
            })
            .collect();

        let mut seen = HashSet::new();
        let mut total = 0;
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "row {id} claimed twice");
                total += 1;
            }
        }
        assert_eq!(total, 40);
    }

    #[test]
    fn test_lease_becomes_reclaimable_only_after_expiry() {
        let db = db_with(&[(-1, 1)]);
        let claimed = db.claim_outbox(CH, 2_000, 30, 10).unwrap();
        assert_eq!(claimed[0].leased_until, 2_030);

        assert_eq!(db.reap_expired(CH, 2_030).unwrap(), 0);
        assert!(db.claim_outbox(CH, 2_030, 30, 10).unwrap().is_empty());

        assert_eq!(db.reap_expired(CH, 2_031).unwrap(), 1);
        let row = db.outbox_row(CH, PostKey::new(-1, 1)).unwrap().unwrap();
        assert_eq!(row.status, OutboxStatus::Pending);
        assert_eq!(row.leased_until, None);
        assert_eq!(row.retries, 0);

        let reclaimed = db.claim_outbox(CH, 2_031, 30, 10).unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].leased_until, 2_061);
    }

    #[test]
    fn test_mark_sent_stores_remote_id() {
        let db = db_with(&[(-1, 1)]);
        let item = db.claim_outbox(CH, 2_000, 30, 1).unwrap().remove(0);
        assert!(db.mark_sent(CH, &item, Some(555), 2_001).unwrap());

        let row = db.outbox_row(CH, item.key).unwrap().unwrap();
        assert_eq!(row.status, OutboxStatus::Sent);
        assert_eq!(row.remote_id, Some(555));
        assert_eq!(row.leased_until, None);
        assert!(db.claim_outbox(CH, 9_999, 30, 10).unwrap().is_empty());
    }

    #[test]
    fn test_mark_sent_without_remote_id() {
        let db = Database::open_in_memory().unwrap();
        db.enqueue(ChannelKind::VkRepost, PostKey::new(-1, 1), 1).unwrap();
        let item = db.claim_outbox(ChannelKind::VkRepost, 2, 30, 1).unwrap().remove(0);
        assert!(db.mark_sent(ChannelKind::VkRepost, &item, None, 3).unwrap());
        let row = db.outbox_row(ChannelKind::VkRepost, item.key).unwrap().unwrap();
        assert_eq!(row.status, OutboxStatus::Sent);
        assert_eq!(row.remote_id, None);
    }

    #[test]
    fn test_retry_ceiling() {
        let db = db_with(&[(-1, 1)]);
        let max_retries = 3;
        let mut now = 2_000;

        for attempt in 1..max_retries {
            let item = db.claim_outbox(CH, now, 30, 1).unwrap().remove(0);
            let outcome = db.mark_retry(CH, &item, "boom", max_retries, now).unwrap();
            assert_eq!(outcome, FailureOutcome::Requeued { retries: attempt as i64 });
            assert_eq!(status(&db, 1), OutboxStatus::Pending);
            now += 1;
        }

        let item = db.claim_outbox(CH, now, 30, 1).unwrap().remove(0);
        let outcome = db.mark_retry(CH, &item, "boom", max_retries, now).unwrap();
        assert_eq!(outcome, FailureOutcome::Failed { retries: 3 });

        let row = db.outbox_row(CH, item.key).unwrap().unwrap();
        assert_eq!(row.status, OutboxStatus::Failed);
        assert_eq!(row.last_error.as_deref(), Some("boom"));
        assert_eq!(row.leased_until, None);

        assert_eq!(db.reap_expired(CH, now + 1_000).unwrap(), 0);
        assert!(db.claim_outbox(CH, now + 1_000, 30, 10).unwrap().is_empty());
    }

    #[test]
    fn test_requeued_item_keeps_its_position() {
        let db = db_with(&[(-1, 1), (-1, 2)]);
        let first = db.claim_outbox(CH, 2_000, 30, 1).unwrap().remove(0);
        db.mark_retry(CH, &first, "boom", 5, 2_000).unwrap();

        let next = db.claim_outbox(CH, 2_001, 30, 1).unwrap();
        assert_eq!(next[0].key.post_id, 1);
    }

    #[test]
    fn test_stale_lease_cannot_resolve_reclaimed_row() {
        let db = db_with(&[(-1, 1)]);
        let stale = db.claim_outbox(CH, 2_000, 30, 1).unwrap().remove(0);
        db.reap_expired(CH, 2_031).unwrap();
        let fresh = db.claim_outbox(CH, 2_031, 30, 1).unwrap().remove(0);

        assert!(!db.mark_sent(CH, &stale, Some(1), 2_032).unwrap());
        assert_eq!(
            db.mark_retry(CH, &stale, "late", 5, 2_032).unwrap(),
            FailureOutcome::LeaseLost
        );
        assert_eq!(status(&db, 1), OutboxStatus::Sending);

        assert!(db.mark_sent(CH, &fresh, Some(2), 2_033).unwrap());
        assert_eq!(status(&db, 1), OutboxStatus::Sent);
    }

    #[test]
    fn test_mark_failed_is_terminal() {
        let db = db_with(&[(-1, 1)]);
        let item = db.claim_outbox(CH, 2_000, 30, 1).unwrap().remove(0);
        let outcome = db.mark_failed(CH, &item, "post missing", 2_000).unwrap();
        assert_eq!(outcome, FailureOutcome::Failed { retries: 0 });
        assert_eq!(status(&db, 1), OutboxStatus::Failed);
        assert!(db.claim_outbox(CH, 9_999, 30, 10).unwrap().is_empty());
    }

    #[test]
    fn test_outbox_counts() {
        let db = db_with(&[(-1, 1), (-1, 2), (-1, 3), (-1, 4)]);
        let claimed = db.claim_outbox(CH, 2_000, 30, 3).unwrap();
        db.mark_sent(CH, &claimed[0], Some(1), 2_000).unwrap();
        db.mark_failed(CH, &claimed[1], "x", 2_000).unwrap();

        let counts = db.outbox_counts(CH).unwrap();
        assert_eq!(
            counts,
            OutboxCounts {
                pending: 1,
                sending: 1,
                sent: 1,
                failed: 1
            }
        );
    }
}
