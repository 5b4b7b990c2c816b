//! Republishing to a VK wall.

use super::{compose, truncate_body, Channel, ChannelKind, DeliveryError};
use crate::post::Post;
use crate::vk::VkApi;

pub struct VkRepostChannel {
    api: VkApi,
    owner_id: i64,
    from_group: bool,
}

impl VkRepostChannel {
    /// `owner_id` is the destination wall; negative for a community.
    pub fn new(api: VkApi, owner_id: i64, from_group: bool) -> Self {
        Self {
            api,
            owner_id,
            from_group,
        }
    }
}

impl Channel for VkRepostChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::VkRepost
    }

    fn render(&self, post: &Post) -> String {
        let link = format!("Источник VK: {}", post.key().wall_url());
        compose(post.post_type.title(), &truncate_body(&post.text), &link)
    }

    fn send(&self, text: &str) -> Result<Option<i64>, DeliveryError> {
        let post_id = self.api.wall_post(self.owner_id, text, self.from_group)?;
        Ok(Some(post_id))
    }
}
