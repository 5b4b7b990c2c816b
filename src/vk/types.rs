//! Wire types for the VK wall API.

use serde::{Deserialize, Serialize};

/// One wall post as returned by `wall.get`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WallItem {
    pub id: i64,
    pub owner_id: i64,
    pub date: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Original posts when this item is a repost.
    #[serde(default)]
    pub copy_history: Vec<WallItem>,
}

impl WallItem {
    /// All attached photos, own attachments first, then those of reposted items.
    pub fn photos(&self) -> Vec<&Photo> {
        self.attachments
            .iter()
            .chain(self.copy_history.iter().flat_map(|c| c.attachments.iter()))
            .filter(|a| a.kind == "photo")
            .filter_map(|a| a.photo.as_ref())
            .filter(|p| p.id != 0)
            .collect()
    }

    /// URLs of the largest rendition of each attached photo.
    pub fn photo_urls(&self) -> Vec<String> {
        self.photos()
            .into_iter()
            .filter_map(|p| p.largest())
            .filter(|s| !s.url.is_empty())
            .map(|s| s.url.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub photo: Option<Photo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: i64,
    pub owner_id: i64,
    #[serde(default)]
    pub sizes: Vec<PhotoSize>,
}

impl Photo {
    /// Largest size by pixel area. Legacy sizes without dimensions are
    /// ranked by their type letter.
    pub fn largest(&self) -> Option<&PhotoSize> {
        self.sizes
            .iter()
            .max_by_key(|s| (u64::from(s.width) * u64::from(s.height), size_rank(&s.kind)))
    }
}

fn size_rank(kind: &str) -> usize {
    const ORDER: &str = "smxopqryzw";
    kind.chars()
        .next()
        .and_then(|c| ORDER.find(c))
        .map_or(0, |i| i + 1)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhotoSize {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub url: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// `wall.get` response body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WallPage {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub items: Vec<WallItem>,
}

/// `utils.resolveScreenName` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolvedObject {
    #[serde(rename = "type")]
    pub kind: String,
    pub object_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WallPostResult {
    pub post_id: i64,
}
