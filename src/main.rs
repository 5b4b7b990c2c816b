//! lostdogs daemon.
//!
//! Polls the configured VK communities, classifies and stores every new post
//! and delivers matching ones through the enabled outbox channels.
//!
//! ## Usage
//!
//! ```bash
//! lostdogs              # Run until Ctrl-C / SIGTERM
//! lostdogs --once       # One poll pass and one delivery tick, then exit
//! lostdogs --status     # Print outbox counts and exit
//! ```

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use lostdogs::clock::{Clock, SystemClock};
use lostdogs::config::Config;
use lostdogs::db::{ChannelKind, Database};
use lostdogs::logging;
use lostdogs::outbox::{OutboxWorker, TelegramChannel, VkRepostChannel, WorkerOptions};
use lostdogs::poller::Poller;
use lostdogs::vk::VkApi;

#[derive(Debug, Default)]
struct Args {
    config_path: Option<PathBuf>,
    once: bool,
    status: bool,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--once" => parsed.once = true,
            "--status" => parsed.status = true,
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("lostdogs {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    parsed
}

fn print_help() {
    println!(
        r#"lostdogs - Lost and found pet post forwarder

USAGE:
    lostdogs [OPTIONS]

OPTIONS:
    --config, -c PATH   Path to config file
    --once              Run one poll pass and one delivery tick, then exit
    --status            Print outbox counts per channel and exit
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    LOSTDOGS_CONFIG     Path to config file (overrides default location)
    LOSTDOGS_LOG        Log filter (trace, debug, info, warn, error)
    VK_TOKEN            VK access token for reading walls
    TG_TOKEN            Telegram bot token
    TG_CHAT             Telegram chat id
    VK_OUT_TOKEN        VK access token for reposting (defaults to VK_TOKEN)
    VK_OUT_OWNER_ID     Destination wall for reposts (negative for a community)
"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    let config_path = Config::path(args.config_path.clone());
    let mut config = Config::load(&config_path)?;
    logging::init(config.logging.dir.clone())?;
    info!(path = %config_path.display(), "lostdogs {} starting", env!("CARGO_PKG_VERSION"));

    let db = Database::open(
        &config.database.sqlite_path,
        Duration::from_millis(config.database.busy_timeout_ms),
    )?;
    info!(path = %config.database.sqlite_path.display(), "Database opened");

    if args.status {
        print_status(&db)?;
        return Ok(());
    }

    config.apply_env()?;
    config.validate()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let feed_token = config.vk.token.as_deref().unwrap_or_default();
    let feed = Arc::new(VkApi::new(
        feed_token,
        &config.vk.api_version,
        Duration::from_secs(config.vk.http_timeout_secs),
    ));

    let telegram = telegram_worker(&config, &db, &clock)?;
    let vk_repost = vk_repost_worker(&config, &db, &clock)?;
    if telegram.is_none() && vk_repost.is_none() {
        warn!("No delivery channel enabled; posts will only be stored");
    }

    let mut rules = Vec::new();
    if config.telegram.enabled {
        rules.push((ChannelKind::Telegram, config.telegram.delivery.clone()));
    }
    if config.vk_repost.enabled {
        rules.push((ChannelKind::VkRepost, config.vk_repost.delivery.clone()));
    }

    let mut poller = Poller::new(db.clone(), feed, Arc::clone(&clock), rules, config.poller.clone());
    poller.resolve_groups().await?;

    if args.once {
        info!("Running in single-shot mode");
        let (_tx, mut rx) = watch::channel(false);
        let report = poller.scan_all(&mut rx).await;
        info!(fetched = report.fetched, stored = report.stored, enqueued = report.enqueued, "Poll pass finished");

        if let Some(worker) = &telegram {
            let report = worker.tick_bounded(&mut rx).await?;
            info!(channel = "telegram", sent = report.sent, failed = report.failed, "Delivery tick finished");
        }
        if let Some(worker) = &vk_repost {
            let report = worker.tick_bounded(&mut rx).await?;
            info!(channel = "vk_repost", sent = report.sent, failed = report.failed, "Delivery tick finished");
        }
        return Ok(());
    }

    let (tx, rx) = watch::channel(false);
    let mut tasks = JoinSet::new();
    tasks.spawn(poller.run(rx.clone()));
    if let Some(worker) = telegram {
        tasks.spawn(worker.run(rx.clone()));
    }
    if let Some(worker) = vk_repost {
        tasks.spawn(worker.run(rx.clone()));
    }

    tokio::select! {
        res = shutdown_signal() => {
            res?;
            info!("Shutdown requested");
        }
        Some(res) = tasks.join_next() => {
            if let Err(e) = res {
                error!(err = %e, "Task failed");
            }
            warn!("A task exited early, shutting down");
        }
    }

    let _ = tx.send(true);
    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            error!(err = %e, "Task failed during shutdown");
        }
    }

    info!("lostdogs stopped");
    Ok(())
}

fn telegram_worker(
    config: &Config,
    db: &Database,
    clock: &Arc<dyn Clock>,
) -> Result<Option<OutboxWorker<TelegramChannel>>> {
    let tg = &config.telegram;
    if !tg.enabled {
        return Ok(None);
    }
    let token = tg.token.as_deref().context("telegram.token is not set")?;
    let chat_id = tg.chat_id.context("telegram.chat_id is not set")?;
    let channel = TelegramChannel::new(token, chat_id, Duration::from_secs(tg.outbox.send_timeout_secs));
    info!(chat_id, "Telegram delivery enabled");
    Ok(Some(OutboxWorker::new(
        db.clone(),
        channel,
        Arc::clone(clock),
        WorkerOptions::from_settings(&tg.outbox),
    )))
}

fn vk_repost_worker(
    config: &Config,
    db: &Database,
    clock: &Arc<dyn Clock>,
) -> Result<Option<OutboxWorker<VkRepostChannel>>> {
    let repost = &config.vk_repost;
    if !repost.enabled {
        return Ok(None);
    }
    let token = repost
        .effective_token(&config.vk)
        .context("vk_repost token is not set")?;
    let owner_id = repost.owner_id.context("vk_repost.owner_id is not set")?;
    let api = VkApi::new(
        token,
        &config.vk.api_version,
        Duration::from_secs(repost.outbox.send_timeout_secs),
    );
    info!(owner_id, from_group = repost.from_group, "VK repost delivery enabled");
    Ok(Some(OutboxWorker::new(
        db.clone(),
        VkRepostChannel::new(api, owner_id, repost.from_group),
        Arc::clone(clock),
        WorkerOptions::from_settings(&repost.outbox),
    )))
}

fn print_status(db: &Database) -> Result<()> {
    println!("{:<10} {:>8} {:>8} {:>8} {:>8}", "channel", "pending", "sending", "sent", "failed");
    for channel in ChannelKind::ALL {
        let counts = db
            .outbox_counts(channel)
            .with_context(|| format!("Failed to count {} outbox", channel))?;
        println!(
            "{:<10} {:>8} {:>8} {:>8} {:>8}",
            channel.as_str(),
            counts.pending,
            counts.sending,
            counts.sent,
            counts.failed
        );
    }
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("Failed to listen for Ctrl-C")?,
            _ = term.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")
    }
}
