//! Live-video card: accepts a YouTube `/live/` URL and remembers the video.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::error::{LiveError, Result};
use crate::store::SharedStore;

static LIVE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:https?://)?(?:www\.)?youtube\.com/live/([a-zA-Z0-9_-]{11})")
        .expect("static live url pattern")
});

/// The 11-character video id of a `/live/` URL, or `None` for any other
/// form (including `watch?v=`).
pub fn extract_live_video_id(url: &str) -> Option<String> {
    LIVE_URL
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Player URL. Browsers only autoplay muted embeds.
pub fn embed_url(video_id: &str) -> String {
    format!("https://www.youtube.com/embed/{video_id}?autoplay=1&mute=1")
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiveView {
    Player { video_id: String, embed_url: String },
    Placeholder,
}

pub struct LiveCard {
    store: SharedStore,
    video_id: Option<String>,
}

impl LiveCard {
    /// Restore the last video from the store.
    pub fn load(store: SharedStore) -> Self {
        let video_id = store.video_id();
        Self { store, video_id }
    }

    pub fn video_id(&self) -> Option<&str> {
        self.video_id.as_deref()
    }

    pub fn is_live(&self) -> bool {
        self.video_id.is_some()
    }

    /// Accept a pasted URL.
    ///
    /// # Errors
    /// [`LiveError::InvalidLiveUrl`] for anything but a `/live/` URL; the
    /// card is left untouched.
    pub fn submit(&mut self, url: &str) -> Result<String> {
        let id = extract_live_video_id(url).ok_or_else(|| LiveError::InvalidLiveUrl {
            url: url.to_string(),
        })?;
        self.store.set_video_id(&id)?;
        info!(video_id = %id, "live video set");
        self.video_id = Some(id.clone());
        Ok(id)
    }

    /// Stop streaming: forget the video and drop the stored key.
    pub fn stop(&mut self) -> Result<()> {
        self.video_id = None;
        self.store.clear_video_id()
    }

    pub fn view(&self) -> LiveView {
        match &self.video_id {
            Some(id) => LiveView::Player {
                video_id: id.clone(),
                embed_url: embed_url(id),
            },
            None => LiveView::Placeholder,
        }
    }
}
