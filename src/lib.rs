//! Lost-and-found pet post pipeline.
//!
//! VK community walls are polled, each new post is classified by a
//! rule-based Russian text extractor and stored in SQLite, and matching posts
//! are delivered to Telegram and to a VK wall through lease-based outboxes.

pub mod blocking;
pub mod clock;
pub mod config;
pub mod db;
pub mod extract;
pub mod logging;
pub mod outbox;
pub mod poller;
pub mod post;
pub mod vk;
