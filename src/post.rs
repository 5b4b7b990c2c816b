//! Classified post record and its controlled vocabularies.

use serde::{Deserialize, Serialize};

/// Natural key of a wall post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostKey {
    pub owner_id: i64,
    pub post_id: i64,
}

impl PostKey {
    pub fn new(owner_id: i64, post_id: i64) -> Self {
        Self { owner_id, post_id }
    }

    /// Canonical link back to the source wall post.
    pub fn wall_url(&self) -> String {
        format!("https://vk.com/wall{}_{}", self.owner_id, self.post_id)
    }
}

impl std::fmt::Display for PostKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.owner_id, self.post_id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    #[default]
    Unknown,
    Lost,
    Found,
    Sighting,
    Adoption,
    Fundraising,
    News,
    Link,
    Empty,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::Unknown => "unknown",
            PostType::Lost => "lost",
            PostType::Found => "found",
            PostType::Sighting => "sighting",
            PostType::Adoption => "adoption",
            PostType::Fundraising => "fundraising",
            PostType::News => "news",
            PostType::Link => "link",
            PostType::Empty => "empty",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(PostType::Unknown),
            "lost" => Some(PostType::Lost),
            "found" => Some(PostType::Found),
            "sighting" => Some(PostType::Sighting),
            "adoption" => Some(PostType::Adoption),
            "fundraising" => Some(PostType::Fundraising),
            "news" => Some(PostType::News),
            "link" => Some(PostType::Link),
            "empty" => Some(PostType::Empty),
            _ => None,
        }
    }

    /// Human-readable headline used by the outbound channels.
    /// Types that are never announced have no title.
    pub fn title(&self) -> Option<&'static str> {
        match self {
            PostType::Lost => Some("🔎 Пропал питомец"),
            PostType::Found => Some("✅ Найден питомец"),
            PostType::Sighting => Some("👀 Замечен питомец"),
            PostType::Adoption => Some("🏠 Ищет дом"),
            PostType::Fundraising => Some("💳 Сбор помощи"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Animal {
    #[default]
    Unknown,
    Cat,
    Dog,
    Other,
}

impl Animal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Animal::Unknown => "unknown",
            Animal::Cat => "cat",
            Animal::Dog => "dog",
            Animal::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(Animal::Unknown),
            "cat" => Some(Animal::Cat),
            "dog" => Some(Animal::Dog),
            "other" => Some(Animal::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    #[default]
    Unknown,
    M,
    F,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Unknown => "unknown",
            Sex::M => "m",
            Sex::F => "f",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(Sex::Unknown),
            "m" => Some(Sex::M),
            "f" => Some(Sex::F),
            _ => None,
        }
    }
}

/// Independently detected care flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extras {
    pub sterilized: bool,
    pub vaccinated: bool,
    pub chipped: bool,
    pub litter_ok: bool,
}

/// A wall post after classification.
///
/// Optional facts are `None` when not detected, never an empty string.
/// List fields keep first-seen order and hold no duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub owner_id: i64,
    pub post_id: i64,
    pub date: i64,
    pub raw: String,
    pub text: String,
    #[serde(rename = "type")]
    pub post_type: PostType,
    pub animal: Animal,
    pub sex: Sex,
    pub breed: Option<String>,
    pub age: Option<String>,
    pub name: Option<String>,
    pub location: Option<String>,
    pub when: Option<String>,
    pub status_details: Option<String>,
    pub phones: Vec<String>,
    pub contact_names: Vec<String>,
    pub vk_accounts: Vec<String>,
    pub photos: Vec<String>,
    pub extras: Extras,
}

impl Post {
    pub fn key(&self) -> PostKey {
        PostKey::new(self.owner_id, self.post_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_type_round_trips_through_str() {
        for t in [
            PostType::Unknown,
            PostType::Lost,
            PostType::Found,
            PostType::Sighting,
            PostType::Adoption,
            PostType::Fundraising,
            PostType::News,
            PostType::Link,
            PostType::Empty,
        ] {
            assert_eq!(PostType::from_str(t.as_str()), Some(t));
        }
        assert_eq!(PostType::from_str("LOST"), None);
    }

    #[test]
    fn test_titles_only_for_announced_types() {
        assert_eq!(PostType::Lost.title(), Some("🔎 Пропал питомец"));
        assert_eq!(PostType::Fundraising.title(), Some("💳 Сбор помощи"));
        assert_eq!(PostType::News.title(), None);
        assert_eq!(PostType::Unknown.title(), None);
    }

    #[test]
    fn test_wall_url() {
        let key = PostKey::new(-107929440, 36);
        assert_eq!(key.wall_url(), "https://vk.com/wall-107929440_36");
        assert_eq!(key.to_string(), "-107929440_36");
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Animal::Dog).unwrap();
        assert_eq!(json, "\"dog\"");
        let sex: Sex = serde_json::from_str("\"f\"").unwrap();
        assert_eq!(sex, Sex::F);
    }
}
