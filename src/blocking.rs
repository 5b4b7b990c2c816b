//! Bounded execution of blocking work (SQLite, HTTP) from async tasks.

use anyhow::{anyhow, Context, Result};
use std::time::Duration;

/// Run `f` on the blocking pool, failing if it does not finish within `limit`.
///
/// On timeout the closure keeps running to completion in the background;
/// its result is discarded.
pub async fn run_blocking<T, F>(limit: Duration, what: &str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(f);
    match tokio::time::timeout(limit, handle).await {
        Ok(joined) => joined.with_context(|| format!("{} panicked", what))?,
        Err(_) => Err(anyhow!("{} timed out after {:?}", what, limit)),
    }
}
