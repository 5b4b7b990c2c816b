//! Dump recent posts of a VK community wall as JSON fixtures.
//!
//! ```bash
//! VK_TOKEN=... lostdogs-dump-wall --group poteryashki --count 100 --out wall.json
//! ```

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use lostdogs::config::Config;
use lostdogs::logging;
use lostdogs::vk::{VkApi, WallItem};

struct Args {
    group: Option<String>,
    count: u32,
    out: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct DumpedPost {
    owner_id: i64,
    id: i64,
    date: i64,
    text: String,
    photos: Vec<String>,
}

impl From<WallItem> for DumpedPost {
    fn from(item: WallItem) -> Self {
        let photos = item.photo_urls();
        Self {
            owner_id: item.owner_id,
            id: item.id,
            date: item.date,
            text: item.text,
            photos,
        }
    }
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args {
        group: None,
        count: 100,
        out: None,
        config_path: None,
    };

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match args[i].as_str() {
            "--group" | "-g" => {
                parsed.group = Some(value.context("--group requires a screen name")?.clone());
                i += 1;
            }
            "--count" | "-n" => {
                let raw = value.context("--count requires a number")?;
                parsed.count = raw
                    .parse()
                    .with_context(|| format!("Invalid --count: {}", raw))?;
                i += 1;
            }
            "--out" | "-o" => {
                parsed.out = Some(PathBuf::from(value.context("--out requires a path")?));
                i += 1;
            }
            "--config" | "-c" => {
                parsed.config_path = Some(PathBuf::from(value.context("--config requires a path")?));
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => bail!("Unknown argument: {}", other),
        }
        i += 1;
    }

    Ok(parsed)
}

fn print_help() {
    println!(
        r#"lostdogs-dump-wall - Save a community wall as JSON

USAGE:
    lostdogs-dump-wall --group NAME [OPTIONS]

OPTIONS:
    --group, -g NAME    Community screen name
    --count, -n N       Number of posts to fetch (default: 100)
    --out, -o PATH      Output file (default: stdout)
    --config, -c PATH   Path to config file
    --help, -h          Show this help message

ENVIRONMENT:
    VK_TOKEN            VK access token (overrides the config file)
"#
    );
}

fn main() -> Result<()> {
    logging::init_stderr();
    let args = parse_args()?;
    let Some(group) = args.group else {
        print_help();
        bail!("--group is required");
    };

    let mut config = Config::load(&Config::path(args.config_path))?;
    config.apply_env()?;
    let token = config
        .vk
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .context("VK token is not set (VK_TOKEN or vk.token)")?;

    let api = VkApi::new(
        token,
        &config.vk.api_version,
        Duration::from_secs(config.vk.http_timeout_secs),
    );
    let id = api
        .resolve_screen_name(&group)
        .with_context(|| format!("Failed to resolve {}", group))?;
    let page = api
        .wall_get(-id, args.count)
        .with_context(|| format!("Failed to fetch wall of {}", group))?;
    info!(group = %group, total = page.count, fetched = page.items.len(), "Fetched wall");

    let posts: Vec<DumpedPost> = page.items.into_iter().map(DumpedPost::from).collect();
    let json = serde_json::to_string_pretty(&posts)?;

    match args.out {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), posts = posts.len(), "Wrote fixture");
        }
        None => println!("{}", json),
    }
    Ok(())
}
