//! Generic lease-based outbox worker.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::Channel;
use crate::blocking::run_blocking;
use crate::clock::{sleep_unless_shutdown, Clock};
use crate::config::OutboxSettings;
use crate::db::{ClaimedItem, Database, FailureOutcome};

/// Timing and limits for one worker.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Pause between consecutive sends within a batch.
    pub send_interval: Duration,
    pub max_retries: u32,
    pub lease_ttl: Duration,
    pub batch: usize,
    pub tick_interval: Duration,
    pub tick_timeout: Duration,
    pub send_timeout: Duration,
    pub store_timeout: Duration,
}

impl WorkerOptions {
    /// Falls back to one send per tick timeout when the rate is unusable.
    pub fn from_settings(settings: &OutboxSettings) -> Self {
        let tick_timeout = Duration::from_secs(settings.tick_timeout_secs);
        Self {
            send_interval: settings.send_interval().unwrap_or(tick_timeout),
            max_retries: settings.max_retries,
            lease_ttl: Duration::from_secs(settings.lease_ttl_secs),
            batch: settings.batch,
            tick_interval: Duration::from_millis(settings.tick_interval_ms),
            tick_timeout,
            send_timeout: Duration::from_secs(settings.send_timeout_secs),
            store_timeout: Duration::from_secs(settings.store_timeout_secs),
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub reaped: usize,
    pub claimed: usize,
    pub sent: usize,
    pub requeued: usize,
    pub failed: usize,
}

pub struct OutboxWorker<C: Channel> {
    db: Database,
    channel: Arc<C>,
    clock: Arc<dyn Clock>,
    opts: WorkerOptions,
}

impl<C: Channel> OutboxWorker<C> {
    pub fn new(db: Database, channel: C, clock: Arc<dyn Clock>, opts: WorkerOptions) -> Self {
        Self {
            db,
            channel: Arc::new(channel),
            clock,
            opts,
        }
    }

    /// Tick until shutdown is signalled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let channel = self.channel.kind();
        info!(channel = %channel, batch = self.opts.batch, "Outbox worker started");

        let mut ticker = tokio::time::interval(self.opts.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => break,
                _ = ticker.tick() => {}
            }

            match self.tick_bounded(&mut shutdown).await {
                Ok(report) => {
                    if report.claimed > 0 || report.reaped > 0 {
                        info!(
                            channel = %channel,
                            reaped = report.reaped,
                            claimed = report.claimed,
                            sent = report.sent,
                            requeued = report.requeued,
                            failed = report.failed,
                            "Outbox tick finished"
                        );
                    }
                }
                Err(e) => warn!(channel = %channel, err = %e, "Outbox tick failed; leased items will be reaped"),
            }
        }

        info!(channel = %channel, "Outbox worker stopped");
    }

    /// [`tick`](Self::tick) cut off after `tick_timeout`.
    pub async fn tick_bounded(&self, shutdown: &mut watch::Receiver<bool>) -> Result<TickReport> {
        tokio::time::timeout(self.opts.tick_timeout, self.tick(shutdown))
            .await
            .map_err(|_| anyhow!("{} tick timed out after {:?}", self.channel.kind(), self.opts.tick_timeout))?
    }

    /// Reap expired leases, claim a batch and deliver it in order.
    ///
    /// Per-item failures are recorded on the row and never abort the batch.
    /// Items left unsent by a shutdown keep their lease and are reaped later.
    pub async fn tick(&self, shutdown: &mut watch::Receiver<bool>) -> Result<TickReport> {
        let channel = self.channel.kind();
        let mut report = TickReport::default();

        let now = self.clock.now();
        report.reaped = self
            .store("reap expired leases", move |db| db.reap_expired(channel, now))
            .await?;
        if report.reaped > 0 {
            warn!(channel = %channel, count = report.reaped, "Reaped expired leases");
        }

        let lease_ttl = self.opts.lease_ttl.as_secs() as i64;
        let batch = self.opts.batch;
        let now = self.clock.now();
        let items = self
            .store("claim outbox", move |db| db.claim_outbox(channel, now, lease_ttl, batch))
            .await?;
        report.claimed = items.len();

        for (i, item) in items.iter().enumerate() {
            if i > 0 && !sleep_unless_shutdown(self.opts.send_interval, shutdown).await {
                info!(channel = %channel, left = items.len() - i, "Shutdown during batch");
                break;
            }
            self.deliver(item, &mut report).await;
        }

        match self.store("count outbox", move |db| db.outbox_counts(channel)).await {
            Ok(counts) => debug!(
                channel = %channel,
                pending = counts.pending,
                sending = counts.sending,
                sent = counts.sent,
                failed = counts.failed,
                "Outbox counts"
            ),
            Err(e) => debug!(channel = %channel, err = %e, "Failed to count outbox"),
        }

        Ok(report)
    }

    async fn deliver(&self, item: &ClaimedItem, report: &mut TickReport) {
        let channel = self.channel.kind();
        let key = item.key;

        let post = match self.store("load post", move |db| db.get_post(key)).await {
            Ok(Some(post)) => post,
            Ok(None) => {
                let now = self.clock.now();
                let claimed = item.clone();
                let outcome = self
                    .store("mark failed", move |db| {
                        db.mark_failed(channel, &claimed, "post not found", now)
                    })
                    .await;
                self.record(item, outcome, "post not found", report);
                return;
            }
            Err(e) => {
                self.retry(item, &format!("{:#}", e), report).await;
                return;
            }
        };

        let text = self.channel.render(&post);
        let sender = Arc::clone(&self.channel);
        let sent = run_blocking(self.opts.send_timeout, "send", move || Ok(sender.send(&text)))
            .await
            .and_then(|result| result.map_err(anyhow::Error::from));

        match sent {
            Ok(remote_id) => {
                let now = self.clock.now();
                let claimed = item.clone();
                let marked = self
                    .store("mark sent", move |db| db.mark_sent(channel, &claimed, remote_id, now))
                    .await;
                match marked {
                    Ok(true) => {
                        report.sent += 1;
                        info!(
                            channel = %channel,
                            owner_id = key.owner_id,
                            post_id = key.post_id,
                            remote_id = ?remote_id,
                            "Delivered"
                        );
                    }
                    Ok(false) => warn!(
                        channel = %channel,
                        owner_id = key.owner_id,
                        post_id = key.post_id,
                        "Delivered but lease was lost; row left to its new owner"
                    ),
                    Err(e) => error!(
                        channel = %channel,
                        owner_id = key.owner_id,
                        post_id = key.post_id,
                        err = %e,
                        "Delivered but failed to record it"
                    ),
                }
            }
            Err(e) => self.retry(item, &format!("{:#}", e), report).await,
        }
    }

    async fn retry(&self, item: &ClaimedItem, err: &str, report: &mut TickReport) {
        let channel = self.channel.kind();
        let max_retries = self.opts.max_retries;
        let now = self.clock.now();
        let claimed = item.clone();
        let message = err.to_string();
        let outcome = self
            .store("mark retry", move |db| {
                db.mark_retry(channel, &claimed, &message, max_retries, now)
            })
            .await;
        self.record(item, outcome, err, report);
    }

    fn record(
        &self,
        item: &ClaimedItem,
        outcome: Result<FailureOutcome>,
        err: &str,
        report: &mut TickReport,
    ) {
        let channel = self.channel.kind();
        let (owner_id, post_id) = (item.key.owner_id, item.key.post_id);
        match outcome {
            Ok(FailureOutcome::Requeued { retries }) => {
                report.requeued += 1;
                warn!(channel = %channel, owner_id, post_id, retries, err, "Delivery failed; requeued");
            }
            Ok(FailureOutcome::Failed { retries }) => {
                report.failed += 1;
                error!(channel = %channel, owner_id, post_id, retries, err, "Delivery failed permanently");
            }
            Ok(FailureOutcome::LeaseLost) => {
                warn!(channel = %channel, owner_id, post_id, err, "Delivery failed after lease was lost");
            }
            Err(e) => error!(
                channel = %channel,
                owner_id,
                post_id,
                err = %e,
                "Failed to record delivery failure; lease will expire"
            ),
        }
    }

    async fn store<T, F>(&self, what: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        run_blocking(self.opts.store_timeout, what, move || f(&db)).await
    }
}
