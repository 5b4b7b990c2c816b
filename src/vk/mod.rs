//! VK community wall access.

pub mod api;
pub mod types;

pub use api::{mask_token, VkApi};
pub use types::{WallItem, WallPage};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VkError {
    #[error("http request failed: {0}")]
    Http(String),
    #[error("vk api error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("failed to decode vk response: {0}")]
    Decode(String),
    #[error("{0} is not a group")]
    NotAGroup(String),
}

/// Source of community wall posts.
pub trait WallFeed: Send + Sync {
    /// Numeric (positive) id of a community.
    fn resolve_group(&self, screen_name: &str) -> Result<i64, VkError>;

    /// Most recent `count` posts, newest first.
    fn fetch_wall(&self, owner_id: i64, count: u32) -> Result<Vec<WallItem>, VkError>;
}

impl WallFeed for VkApi {
    fn resolve_group(&self, screen_name: &str) -> Result<i64, VkError> {
        self.resolve_screen_name(screen_name)
    }

    fn fetch_wall(&self, owner_id: i64, count: u32) -> Result<Vec<WallItem>, VkError> {
        Ok(self.wall_get(owner_id, count)?.items)
    }
}
