//! Minimal blocking VK API client.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::types::{ResolvedObject, WallPage, WallPostResult};
use super::VkError;

const API_BASE: &str = "https://api.vk.com/method";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    response: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error_code: i64,
    #[serde(default)]
    error_msg: String,
}

pub struct VkApi {
    agent: ureq::Agent,
    token: String,
    version: String,
    base_url: String,
}

impl VkApi {
    pub fn new(token: &str, version: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        debug!(token = %mask_token(token), version, "VK client created");
        Self {
            agent,
            token: token.to_string(),
            version: version.to_string(),
            base_url: API_BASE.to_string(),
        }
    }

    /// Point the client at a different API root.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn call<T: DeserializeOwned>(&self, method: &str, params: &[(&str, &str)]) -> Result<T, VkError> {
        let url = format!("{}/{}", self.base_url, method);
        let mut form: Vec<(&str, &str)> = params.to_vec();
        form.push(("access_token", self.token.as_str()));
        form.push(("v", self.version.as_str()));

        let envelope: Envelope = self
            .agent
            .post(&url)
            .send_form(&form)
            .map_err(|e| VkError::Http(e.to_string()))?
            .into_json()
            .map_err(|e| VkError::Decode(e.to_string()))?;

        if let Some(err) = envelope.error {
            return Err(VkError::Api {
                code: err.error_code,
                message: err.error_msg,
            });
        }
        let response = envelope
            .response
            .ok_or_else(|| VkError::Decode(format!("{} returned no response", method)))?;
        serde_json::from_value(response).map_err(|e| VkError::Decode(e.to_string()))
    }

    /// Numeric id of a community by its screen name.
    pub fn resolve_screen_name(&self, screen_name: &str) -> Result<i64, VkError> {
        // Unknown names come back as an empty array rather than an object.
        let value: serde_json::Value =
            self.call("utils.resolveScreenName", &[("screen_name", screen_name)])?;
        if !value.is_object() {
            return Err(VkError::NotAGroup(screen_name.to_string()));
        }
        let resolved: ResolvedObject =
            serde_json::from_value(value).map_err(|e| VkError::Decode(e.to_string()))?;
        if resolved.kind != "group" {
            return Err(VkError::NotAGroup(screen_name.to_string()));
        }
        Ok(resolved.object_id)
    }

    /// Most recent `count` posts of a wall, newest first.
    pub fn wall_get(&self, owner_id: i64, count: u32) -> Result<WallPage, VkError> {
        let owner_id = owner_id.to_string();
        let count = count.to_string();
        self.call("wall.get", &[("owner_id", owner_id.as_str()), ("count", count.as_str())])
    }

    /// Publish a text post; returns the new post id.
    pub fn wall_post(&self, owner_id: i64, message: &str, from_group: bool) -> Result<i64, VkError> {
        let owner_id = owner_id.to_string();
        let from_group = if from_group { "1" } else { "0" };
        let result: WallPostResult = self.call(
            "wall.post",
            &[
                ("owner_id", owner_id.as_str()),
                ("message", message),
                ("from_group", from_group),
            ],
        )?;
        Ok(result.post_id)
    }
}

/// Token with all but the edges hidden, safe for logs.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() < 5 {
        return "******".to_string();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{}***{}", head, tail)
}
