//! Comments microservice client and the chat thread it feeds.
//!
//! Fetch failures never reach the page: a listing that fails for any reason
//! is replaced with [`placeholder_messages`].

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::http::{get_json, post_json, post_unit};

/// Author used for locally generated notices.
pub const SYSTEM_USER: &str = "システム";
/// Name used when no username was stored at login.
pub const ANONYMOUS_USER: &str = "匿名";
pub const SEND_FAILED_TEXT: &str = "コメントの送信に失敗しました。";

const PLACEHOLDER_USER: &str = "ダミーユーザー";
const PLACEHOLDER_TEXT: &str = "ダミーメッセージ";

/// One chat message as the service sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub user: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liked_by_me: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liked_cnt: Option<u32>,
}

impl Message {
    pub fn new(user: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            message: message.into(),
            message_id: None,
            liked_by_me: None,
            liked_cnt: None,
        }
    }

    /// Key used where no id exists. Not unique: identical comments from the
    /// same user collide.
    pub fn content_key(&self) -> String {
        format!("{}{}", self.user, self.message)
    }
}

/// The fixed listing shown when comments cannot be fetched.
pub fn placeholder_messages() -> Vec<Message> {
    (0..3)
        .map(|_| Message::new(PLACEHOLDER_USER, PLACEHOLDER_TEXT))
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Listing {
    Bare(Vec<Message>),
    Wrapped { messages: Vec<Message> },
}

#[derive(Serialize)]
struct NewMessage<'a> {
    user: &'a str,
    message: &'a str,
}

#[derive(Debug, Clone)]
pub struct CommentClient {
    client: reqwest::Client,
    base_url: String,
}

impl CommentClient {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn list_url(&self, room: u64, user_id: Option<u64>) -> String {
        match user_id {
            Some(uid) => format!("{}/messages/{room}/?user_id={uid}", self.base_url),
            None => format!("{}/messages/{room}", self.base_url),
        }
    }

    /// Fetch a room's messages, propagating errors.
    pub async fn try_list(&self, room: u64, user_id: Option<u64>) -> Result<Vec<Message>> {
        let url = self.list_url(room, user_id);
        let listing: Listing = get_json(&self.client, &url).await?;
        Ok(match listing {
            Listing::Bare(messages) | Listing::Wrapped { messages } => messages,
        })
    }

    /// Fetch a room's messages. Any failure yields the placeholder list.
    pub async fn list(&self, room: u64, user_id: Option<u64>) -> Vec<Message> {
        match self.try_list(room, user_id).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(room, error = %e, "comment fetch failed, showing placeholders");
                placeholder_messages()
            }
        }
    }

    /// Create a message; returns the service's echo with its assigned id.
    pub async fn create(&self, room: u64, user: &str, text: &str) -> Result<Message> {
        let url = format!("{}/messages/make/{room}", self.base_url);
        post_json(&self.client, &url, &NewMessage { user, message: text }).await
    }

    pub async fn like(&self, message_id: u64, user_id: u64) -> Result<()> {
        self.reaction("like", message_id, user_id).await
    }

    pub async fn unlike(&self, message_id: u64, user_id: u64) -> Result<()> {
        self.reaction("unlike", message_id, user_id).await
    }

    async fn reaction(&self, verb: &str, message_id: u64, user_id: u64) -> Result<()> {
        let url = format!(
            "{}/messages/{verb}/{message_id}/?user_id={user_id}",
            self.base_url
        );
        post_unit(&self.client, &url, &serde_json::json!({})).await
    }
}

// ---------------------------------------------------------------------------
// CommentThread
// ---------------------------------------------------------------------------

/// Messages in service order plus the unsent draft.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentThread {
    pub messages: Vec<Message>,
    pub draft: String,
}

impl CommentThread {
    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            draft: String::new(),
        }
    }

    pub fn replace(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Submit the draft as `user`.
    ///
    /// Blank drafts are ignored. On success the echoed message is appended
    /// and the draft cleared; on failure a system notice is appended and
    /// the draft kept. Returns whether the send succeeded.
    pub async fn send(&mut self, client: &CommentClient, room: u64, user: &str) -> bool {
        if self.draft.trim().is_empty() {
            return false;
        }
        match client.create(room, user, &self.draft).await {
            Ok(saved) => {
                self.messages.push(saved);
                self.draft.clear();
                true
            }
            Err(e) => {
                warn!(room, error = %e, "comment send failed");
                self.messages.push(Message::new(SYSTEM_USER, SEND_FAILED_TEXT));
                false
            }
        }
    }

    /// Append the draft without a backend (the driver's own chat).
    pub fn post_local(&mut self, user: &str) -> bool {
        if self.draft.trim().is_empty() {
            return false;
        }
        let text = std::mem::take(&mut self.draft);
        self.messages.push(Message::new(user, text));
        true
    }
}
