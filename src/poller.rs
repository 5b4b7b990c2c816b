//! Wall poller: fetch, classify, store and queue new posts.
//!
//! Each configured community keeps an in-memory watermark (`last_ts`). Items
//! are walked oldest first so the watermark only moves forward. Store errors
//! are logged and absorbed; a post missed this pass is picked up on the next
//! one because upsert and enqueue are idempotent.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::blocking::run_blocking;
use crate::clock::{sleep_unless_shutdown, Clock};
use crate::config::PollerConfig;
use crate::db::{ChannelKind, Database};
use crate::extract::classify;
use crate::outbox::DeliveryRule;
use crate::post::PostKey;
use crate::vk::{WallFeed, WallItem};

/// Per-community scan position, kept for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCursor {
    pub screen_name: String,
    /// Positive community id.
    pub id: i64,
    pub last_ts: i64,
}

impl GroupCursor {
    pub fn new(screen_name: &str, id: i64) -> Self {
        Self {
            screen_name: screen_name.to_string(),
            id,
            last_ts: 0,
        }
    }

    /// Wall owner id; communities are negative.
    pub fn owner_id(&self) -> i64 {
        -self.id
    }
}

/// What one group scan did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub fetched: usize,
    pub skipped_old: usize,
    pub skipped_seen: usize,
    pub stored: usize,
    pub enqueued: usize,
}

impl ScanReport {
    fn add(&mut self, other: ScanReport) {
        self.fetched += other.fetched;
        self.skipped_old += other.skipped_old;
        self.skipped_seen += other.skipped_seen;
        self.stored += other.stored;
        self.enqueued += other.enqueued;
    }
}

pub struct Poller {
    db: Database,
    feed: Arc<dyn WallFeed>,
    clock: Arc<dyn Clock>,
    /// Delivery predicate per enabled channel.
    rules: Vec<(ChannelKind, DeliveryRule)>,
    settings: PollerConfig,
    cursors: Vec<GroupCursor>,
}

impl Poller {
    pub fn new(
        db: Database,
        feed: Arc<dyn WallFeed>,
        clock: Arc<dyn Clock>,
        rules: Vec<(ChannelKind, DeliveryRule)>,
        settings: PollerConfig,
    ) -> Self {
        Self {
            db,
            feed,
            clock,
            rules,
            settings,
            cursors: Vec::new(),
        }
    }

    pub fn cursors(&self) -> &[GroupCursor] {
        &self.cursors
    }

    /// Resolve every configured screen name to a community id.
    ///
    /// Names that are not communities, or that fail to resolve, are logged
    /// and dropped. Fails only if none resolve.
    pub async fn resolve_groups(&mut self) -> Result<()> {
        let timeout = self.http_timeout();
        for name in self.settings.groups.clone() {
            let name = name.trim().to_string();
            if name.is_empty() {
                continue;
            }
            let feed = Arc::clone(&self.feed);
            let lookup = name.clone();
            let resolved = run_blocking(timeout, "resolve group", move || {
                feed.resolve_group(&lookup).map_err(anyhow::Error::from)
            })
            .await;
            match resolved {
                Ok(id) => {
                    info!(group = %name, id, "Resolved group");
                    self.cursors.push(GroupCursor::new(&name, id));
                }
                Err(e) => error!(group = %name, err = %format!("{:#}", e), "Failed to resolve group"),
            }
        }

        if self.cursors.is_empty() {
            anyhow::bail!("None of the configured groups could be resolved");
        }
        Ok(())
    }

    /// Poll until shutdown is signalled. The first pass runs immediately.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(groups = self.cursors.len(), interval_secs = self.settings.interval_secs, "Poller started");

        let mut ticker = tokio::time::interval(Duration::from_secs(self.settings.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let scan_timeout = Duration::from_secs(self.settings.scan_timeout_secs);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => break,
                _ = ticker.tick() => {}
            }

            match tokio::time::timeout(scan_timeout, self.scan_all(&mut shutdown)).await {
                Ok(report) => {
                    if report.stored > 0 {
                        info!(
                            fetched = report.fetched,
                            stored = report.stored,
                            enqueued = report.enqueued,
                            "Poll pass finished"
                        );
                    } else {
                        debug!(fetched = report.fetched, "Poll pass finished, nothing new");
                    }
                }
                Err(_) => warn!(timeout = ?scan_timeout, "Poll pass timed out"),
            }
        }

        info!("Poller stopped");
    }

    /// One pass over every group with a pause between groups.
    ///
    /// A failing group is logged and skipped.
    pub async fn scan_all(&mut self, shutdown: &mut watch::Receiver<bool>) -> ScanReport {
        let mut total = ScanReport::default();
        let delay = Duration::from_millis(self.settings.group_delay_ms);

        for i in 0..self.cursors.len() {
            if i > 0 && !sleep_unless_shutdown(delay, shutdown).await {
                break;
            }
            match self.scan_group(i).await {
                Ok(report) => total.add(report),
                Err(e) => {
                    let cursor = &self.cursors[i];
                    warn!(group = %cursor.screen_name, err = %format!("{:#}", e), "Group scan failed");
                }
            }
        }
        total
    }

    async fn scan_group(&mut self, index: usize) -> Result<ScanReport> {
        let owner_id = self.cursors[index].owner_id();
        let feed = Arc::clone(&self.feed);
        let count = self.settings.page_size;
        let items = run_blocking(self.http_timeout(), "fetch wall", move || {
            feed.fetch_wall(owner_id, count).map_err(anyhow::Error::from)
        })
        .await
        .with_context(|| format!("Failed to fetch wall {}", owner_id))?;

        Ok(self.process_items(index, items).await)
    }

    /// Walk newest-first `items` oldest first, advancing the group watermark.
    pub(crate) async fn process_items(&mut self, index: usize, mut items: Vec<WallItem>) -> ScanReport {
        let mut report = ScanReport {
            fetched: items.len(),
            ..Default::default()
        };
        items.reverse();

        for item in items {
            if item.date < self.cursors[index].last_ts {
                report.skipped_old += 1;
                continue;
            }
            self.cursors[index].last_ts = item.date;

            let key = PostKey::new(item.owner_id, item.id);
            if self.exists(key).await {
                report.skipped_seen += 1;
                continue;
            }

            let mut post = classify(key, &item.text);
            post.date = item.date;
            post.photos = item.photo_urls();

            let now = self.clock.now();
            let stored = {
                let post = post.clone();
                self.store("upsert post", move |db| db.upsert_post(&post, now)).await
            };
            if let Err(e) = stored {
                error!(owner_id = key.owner_id, post_id = key.post_id, err = %format!("{:#}", e), "Failed to store post");
                continue;
            }
            report.stored += 1;
            debug!(
                owner_id = key.owner_id,
                post_id = key.post_id,
                kind = post.post_type.as_str(),
                animal = post.animal.as_str(),
                "Stored post"
            );

            for (channel, rule) in &self.rules {
                if !rule.matches(&post) {
                    continue;
                }
                let channel = *channel;
                match self.store("enqueue", move |db| db.enqueue(channel, key, now)).await {
                    Ok(true) => {
                        report.enqueued += 1;
                        info!(channel = %channel, owner_id = key.owner_id, post_id = key.post_id, "Queued for delivery");
                    }
                    Ok(false) => {}
                    Err(e) => error!(
                        channel = %channel,
                        owner_id = key.owner_id,
                        post_id = key.post_id,
                        err = %format!("{:#}", e),
                        "Failed to enqueue"
                    ),
                }
            }
        }

        report
    }

    /// Existence probe; an error or timeout counts as "not seen".
    async fn exists(&self, key: PostKey) -> bool {
        let db = self.db.clone();
        let limit = Duration::from_millis(self.settings.exists_timeout_ms);
        match run_blocking(limit, "post exists", move || db.post_exists(key)).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(owner_id = key.owner_id, post_id = key.post_id, err = %e, "Existence check failed, treating as new");
                false
            }
        }
    }

    async fn store<T, F>(&self, what: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let limit = Duration::from_secs(self.settings.store_timeout_secs);
        run_blocking(limit, what, move || f(&db)).await
    }

    fn http_timeout(&self) -> Duration {
        // The client has its own timeout; this only guards a hung pool thread.
        Duration::from_secs(self.settings.scan_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::post::{Animal, PostType};
    use crate::vk::VkError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const LOST_DOG: &str = "Пропала собака, кобель. Улица Ленина, 5. 8 922 405 26 12";
    const FOUND_CAT: &str = "Найдена кошка у подъезда";

    #[derive(Default)]
    struct FakeFeed {
        groups: HashMap<String, i64>,
        walls: Mutex<HashMap<i64, Vec<WallItem>>>,
        fetches: Mutex<Vec<i64>>,
    }

    impl FakeFeed {
        fn with_group(mut self, name: &str, id: i64) -> Self {
            self.groups.insert(name.to_string(), id);
            self
        }

        /// `posts` as (id, date, text), given newest first like the API.
        fn set_wall(&self, owner_id: i64, posts: &[(i64, i64, &str)]) {
            let items = posts
                .iter()
                .map(|&(id, date, text)| WallItem {
                    id,
                    owner_id,
                    date,
                    text: text.to_string(),
                    ..Default::default()
                })
                .collect();
            self.walls.lock().unwrap().insert(owner_id, items);
        }
    }

    impl WallFeed for FakeFeed {
        fn resolve_group(&self, screen_name: &str) -> Result<i64, VkError> {
            self.groups
                .get(screen_name)
                .copied()
                .ok_or_else(|| VkError::NotAGroup(screen_name.to_string()))
        }

        fn fetch_wall(&self, owner_id: i64, count: u32) -> Result<Vec<WallItem>, VkError> {
            self.fetches.lock().unwrap().push(owner_id);
            match self.walls.lock().unwrap().get(&owner_id) {
                Some(items) => Ok(items.iter().take(count as usize).cloned().collect()),
                None => Err(VkError::Api {
                    code: 15,
                    message: "Access denied: wall is disabled".to_string(),
                }),
            }
        }
    }

    fn settings(groups: &[&str]) -> PollerConfig {
        PollerConfig {
            groups: groups.iter().map(|g| g.to_string()).collect(),
            group_delay_ms: 0,
            ..Default::default()
        }
    }

    fn poller(db: &Database, feed: Arc<FakeFeed>, groups: &[&str]) -> Poller {
        Poller::new(
            db.clone(),
            feed,
            Arc::new(ManualClock::new(5_000)),
            vec![
                (ChannelKind::Telegram, DeliveryRule::default()),
                (ChannelKind::VkRepost, DeliveryRule::default()),
            ],
            settings(groups),
        )
    }

    #[tokio::test]
    async fn test_resolve_skips_unknown_groups() {
        let db = Database::open_in_memory().unwrap();
        let feed = Arc::new(FakeFeed::default().with_group("dogs", 100));
        let mut poller = poller(&db, feed, &["dogs", "  ", "nobody"]);

        poller.resolve_groups().await.unwrap();
        assert_eq!(poller.cursors(), [GroupCursor::new("dogs", 100)]);
        assert_eq!(poller.cursors()[0].owner_id(), -100);
    }

    #[tokio::test]
    async fn test_resolve_fails_when_nothing_resolves() {
        let db = Database::open_in_memory().unwrap();
        let mut poller = poller(&db, Arc::new(FakeFeed::default()), &["nobody"]);
        assert!(poller.resolve_groups().await.is_err());
    }

    #[tokio::test]
    async fn test_scan_stores_and_enqueues_matching_posts() {
        let db = Database::open_in_memory().unwrap();
        let feed = Arc::new(FakeFeed::default().with_group("dogs", 100));
        feed.set_wall(-100, &[(2, 200, FOUND_CAT), (1, 100, LOST_DOG)]);
        let mut poller = poller(&db, feed, &["dogs"]);
        poller.resolve_groups().await.unwrap();

        let (_tx, mut rx) = watch::channel(false);
        let report = poller.scan_all(&mut rx).await;

        assert_eq!(report.stored, 2);
        assert_eq!(report.enqueued, 2);
        assert_eq!(poller.cursors()[0].last_ts, 200);

        let dog = db.get_post(PostKey::new(-100, 1)).unwrap().unwrap();
        assert_eq!(dog.post_type, PostType::Lost);
        assert_eq!(dog.animal, Animal::Dog);
        assert_eq!(dog.date, 100);

        for channel in ChannelKind::ALL {
            assert!(db.outbox_row(channel, PostKey::new(-100, 1)).unwrap().is_some());
            assert!(db.outbox_row(channel, PostKey::new(-100, 2)).unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_watermark_is_monotonic_and_skips_older_posts() {
        let db = Database::open_in_memory().unwrap();
        let feed = Arc::new(FakeFeed::default().with_group("dogs", 100));
        let mut poller = poller(&db, Arc::clone(&feed), &["dogs"]);
        poller.resolve_groups().await.unwrap();
        let (_tx, mut rx) = watch::channel(false);

        feed.set_wall(-100, &[(3, 300, LOST_DOG), (2, 200, LOST_DOG), (1, 100, LOST_DOG)]);
        poller.scan_all(&mut rx).await;
        assert_eq!(poller.cursors()[0].last_ts, 300);

        // An older post that shows up late is below the watermark.
        feed.set_wall(-100, &[(4, 400, FOUND_CAT), (9, 250, LOST_DOG)]);
        let report = poller.scan_all(&mut rx).await;
        assert_eq!(report.skipped_old, 1);
        assert_eq!(report.stored, 1);
        assert_eq!(poller.cursors()[0].last_ts, 400);
        assert!(!db.post_exists(PostKey::new(-100, 9)).unwrap());
    }

    #[tokio::test]
    async fn test_seen_posts_are_not_reprocessed() {
        let db = Database::open_in_memory().unwrap();
        let feed = Arc::new(FakeFeed::default().with_group("dogs", 100));
        feed.set_wall(-100, &[(1, 100, LOST_DOG)]);
        let mut poller = poller(&db, Arc::clone(&feed), &["dogs"]);
        poller.resolve_groups().await.unwrap();
        let (_tx, mut rx) = watch::channel(false);

        assert_eq!(poller.scan_all(&mut rx).await.stored, 1);

        let second = poller.scan_all(&mut rx).await;
        assert_eq!(second.skipped_seen, 1);
        assert_eq!(second.stored, 0);
        assert_eq!(second.enqueued, 0);
        assert_eq!(db.outbox_counts(ChannelKind::Telegram).unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_restart_rescans_without_duplicates() {
        let db = Database::open_in_memory().unwrap();
        let feed = Arc::new(FakeFeed::default().with_group("dogs", 100));
        feed.set_wall(-100, &[(2, 200, LOST_DOG), (1, 100, LOST_DOG)]);
        let (_tx, mut rx) = watch::channel(false);

        for _ in 0..2 {
            let mut poller = poller(&db, Arc::clone(&feed), &["dogs"]);
            poller.resolve_groups().await.unwrap();
            poller.scan_all(&mut rx).await;
        }

        assert_eq!(db.outbox_counts(ChannelKind::Telegram).unwrap().pending, 2);
        assert_eq!(db.outbox_counts(ChannelKind::VkRepost).unwrap().pending, 2);
    }

    #[tokio::test]
    async fn test_failing_group_does_not_stop_others() {
        let db = Database::open_in_memory().unwrap();
        let feed = Arc::new(
            FakeFeed::default()
                .with_group("closed", 1)
                .with_group("dogs", 100),
        );
        feed.set_wall(-100, &[(1, 100, LOST_DOG)]);
        let mut poller = poller(&db, Arc::clone(&feed), &["closed", "dogs"]);
        poller.resolve_groups().await.unwrap();
        let (_tx, mut rx) = watch::channel(false);

        let report = poller.scan_all(&mut rx).await;
        assert_eq!(report.stored, 1);
        assert_eq!(*feed.fetches.lock().unwrap(), [-1, -100]);
        assert_eq!(poller.cursors()[0].last_ts, 0);
    }

    #[tokio::test]
    async fn test_photos_are_stored() {
        let db = Database::open_in_memory().unwrap();
        let feed = Arc::new(FakeFeed::default().with_group("dogs", 100));
        let item: WallItem = serde_json::from_str(
            r#"{
                "id": 5, "owner_id": -100, "date": 10, "text": "Пропала собака",
                "attachments": [{"type": "photo", "photo": {"id": 1, "owner_id": -100, "sizes": [
                    {"type": "s", "url": "https://img/s.jpg", "width": 75, "height": 75},
                    {"type": "x", "url": "https://img/x.jpg", "width": 604, "height": 604}
                ]}}]
            }"#,
        )
        .unwrap();
        let mut poller = poller(&db, feed, &["dogs"]);
        poller.resolve_groups().await.unwrap();

        poller.process_items(0, vec![item]).await;
        let post = db.get_post(PostKey::new(-100, 5)).unwrap().unwrap();
        assert_eq!(post.photos, ["https://img/x.jpg"]);
    }

    #[tokio::test]
    async fn test_shutdown_between_groups() {
        let db = Database::open_in_memory().unwrap();
        let feed = Arc::new(FakeFeed::default().with_group("a", 1).with_group("b", 2));
        feed.set_wall(-1, &[]);
        feed.set_wall(-2, &[]);
        let mut poller = poller(&db, Arc::clone(&feed), &["a", "b"]);
        poller.resolve_groups().await.unwrap();

        let (_tx, mut rx) = watch::channel(true);
        poller.scan_all(&mut rx).await;
        assert_eq!(*feed.fetches.lock().unwrap(), [-1]);
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown() {
        let db = Database::open_in_memory().unwrap();
        let feed = Arc::new(FakeFeed::default().with_group("dogs", 100));
        feed.set_wall(-100, &[(1, 100, LOST_DOG)]);
        let mut poller = poller(&db, Arc::clone(&feed), &["dogs"]);
        poller.resolve_groups().await.unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(poller.run(rx));
        for _ in 0..100 {
            if db.post_exists(PostKey::new(-100, 1)).unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("poller did not stop")
            .unwrap();
        assert!(db.post_exists(PostKey::new(-100, 1)).unwrap());
    }
}
