//! Telegram Bot API channel.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{compose, truncate_body, Channel, ChannelKind, DeliveryError};
use crate::post::Post;

const API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct BotResponse {
    ok: bool,
    #[serde(default)]
    result: Option<SentMessage>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Posts HTML messages to one chat through a bot.
pub struct TelegramChannel {
    agent: ureq::Agent,
    token: String,
    chat_id: i64,
    base_url: String,
}

impl TelegramChannel {
    pub fn new(token: &str, chat_id: i64, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            token: token.to_string(),
            chat_id,
            base_url: API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn into_result(response: BotResponse) -> Result<Option<i64>, DeliveryError> {
        if !response.ok {
            return Err(DeliveryError::Rejected {
                code: response.error_code.unwrap_or_default(),
                message: response.description.unwrap_or_default(),
            });
        }
        Ok(response.result.map(|m| m.message_id))
    }
}

impl Channel for TelegramChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Telegram
    }

    fn render(&self, post: &Post) -> String {
        let body = html_escape(&truncate_body(&post.text));
        let link = format!(r#"<a href="{}">Источник VK</a>"#, post.key().wall_url());
        compose(post.post_type.title(), &body, &link)
    }

    fn send(&self, text: &str) -> Result<Option<i64>, DeliveryError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let request = SendMessageRequest {
            chat_id: self.chat_id,
            text,
            parse_mode: "HTML",
        };

        let response = match self.agent.post(&url).send_json(&request) {
            Ok(response) => response,
            // The Bot API reports rejections as 4xx with a JSON body.
            Err(ureq::Error::Status(code, response)) => {
                return match response.into_json::<BotResponse>() {
                    Ok(body) => Self::into_result(body),
                    Err(_) => Err(DeliveryError::Rejected {
                        code: i64::from(code),
                        message: format!("http status {}", code),
                    }),
                };
            }
            Err(e) => return Err(DeliveryError::Http(e.to_string())),
        };

        let body: BotResponse = response
            .into_json()
            .map_err(|e| DeliveryError::Decode(e.to_string()))?;
        Self::into_result(body)
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
