//! Reliable delivery of classified posts to outbound channels.
//!
//! Posts are queued per channel by the poller and delivered by one
//! [`OutboxWorker`] per channel. The worker owns the lease state machine;
//! a [`Channel`] only knows how to render a post and send the text.

pub mod telegram;
pub mod vk_repost;
pub mod worker;

pub use crate::db::ChannelKind;
pub use telegram::TelegramChannel;
pub use vk_repost::VkRepostChannel;
pub use worker::{OutboxWorker, TickReport, WorkerOptions};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::post::{Animal, Post, PostType};
use crate::vk::VkError;

/// Longest post body copied into an outbound message, in characters.
pub const MAX_BODY_CHARS: usize = 3500;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("http request failed: {0}")]
    Http(String),
    #[error("rejected by remote api ({code}): {message}")]
    Rejected { code: i64, message: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl From<VkError> for DeliveryError {
    fn from(err: VkError) -> Self {
        match err {
            VkError::Http(msg) => DeliveryError::Http(msg),
            VkError::Api { code, message } => DeliveryError::Rejected { code, message },
            VkError::Decode(msg) => DeliveryError::Decode(msg),
            VkError::NotAGroup(name) => DeliveryError::Rejected {
                code: 0,
                message: format!("{} is not a group", name),
            },
        }
    }
}

/// An outbound delivery target.
///
/// `send` is blocking; the worker runs it on the blocking pool under a
/// timeout.
pub trait Channel: Send + Sync + 'static {
    fn kind(&self) -> ChannelKind;

    /// Channel-specific message text for a post.
    fn render(&self, post: &Post) -> String;

    /// Deliver rendered text. Returns the remote id if the channel assigns one.
    fn send(&self, text: &str) -> Result<Option<i64>, DeliveryError>;
}

/// Which posts a channel receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRule {
    #[serde(default = "default_rule_types")]
    pub types: Vec<PostType>,
    #[serde(default = "default_rule_animals")]
    pub animals: Vec<Animal>,
}

fn default_rule_types() -> Vec<PostType> {
    vec![PostType::Lost, PostType::Found, PostType::Sighting]
}

fn default_rule_animals() -> Vec<Animal> {
    vec![Animal::Dog]
}

impl Default for DeliveryRule {
    fn default() -> Self {
        Self {
            types: default_rule_types(),
            animals: default_rule_animals(),
        }
    }
}

impl DeliveryRule {
    pub fn matches(&self, post: &Post) -> bool {
        self.types.contains(&post.post_type) && self.animals.contains(&post.animal)
    }
}

/// Post text cut to [`MAX_BODY_CHARS`] with an ellipsis marker.
pub fn truncate_body(text: &str) -> String {
    match text.char_indices().nth(MAX_BODY_CHARS) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

/// Title line (if any), body (if any), then the footer line.
pub(crate) fn compose(title: Option<&str>, body: &str, footer: &str) -> String {
    let mut out = String::new();
    if let Some(title) = title {
        out.push_str(title);
        out.push('\n');
    }
    if !body.is_empty() {
        out.push_str(body);
        out.push('\n');
    }
    out.push_str(footer);
    out
}
