//! Heart/like tracking.
//!
//! Two independent modes exist and are deliberately not merged:
//!
//! - [`ServerLikes`]: keyed by message id, confirmed by the comments
//!   service. Updates are applied optimistically and rolled back when the
//!   service rejects them.
//! - [`LocalLikes`]: keyed by `user + text`, persisted in the local store
//!   only and mirrored across sessions through store change notifications.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::comments::{CommentClient, Message};
use crate::error::Result;
use crate::store::{SharedStore, StoreChange, KEY_HEART_COUNTS, KEY_LIKED_COMMENTS};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeStatus {
    pub liked_by_me: bool,
    pub liked_cnt: u32,
}

impl LikeStatus {
    /// Flip the flag and move the count with it (never below zero).
    pub fn toggled(self) -> Self {
        if self.liked_by_me {
            Self {
                liked_by_me: false,
                liked_cnt: self.liked_cnt.saturating_sub(1),
            }
        } else {
            Self {
                liked_by_me: true,
                liked_cnt: self.liked_cnt.saturating_add(1),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Server-backed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ServerLikes {
    statuses: HashMap<u64, LikeStatus>,
}

impl ServerLikes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, message_id: u64) -> LikeStatus {
        self.statuses.get(&message_id).copied().unwrap_or_default()
    }

    /// Rebuild from a `?user_id=` listing. Messages without an id are skipped.
    pub fn sync_from(&mut self, messages: &[Message]) {
        self.statuses = messages
            .iter()
            .filter_map(|m| {
                let id = m.message_id?;
                Some((
                    id,
                    LikeStatus {
                        liked_by_me: m.liked_by_me.unwrap_or(false),
                        liked_cnt: m.liked_cnt.unwrap_or(0),
                    },
                ))
            })
            .collect();
    }

    /// Apply the optimistic flip only. Returns the new status.
    pub fn toggle_local(&mut self, message_id: u64) -> LikeStatus {
        let next = self.status(message_id).toggled();
        self.statuses.insert(message_id, next);
        next
    }

    /// Flip optimistically, then confirm with the service.
    ///
    /// On failure the previous status is restored and the error returned.
    pub async fn toggle(
        &mut self,
        client: &CommentClient,
        message_id: u64,
        user_id: u64,
    ) -> Result<LikeStatus> {
        let previous = self.status(message_id);
        let next = self.toggle_local(message_id);
        let confirmed = if next.liked_by_me {
            client.like(message_id, user_id).await
        } else {
            client.unlike(message_id, user_id).await
        };
        match confirmed {
            Ok(()) => Ok(next),
            Err(e) => {
                warn!(message_id, error = %e, "like update rejected, rolling back");
                self.statuses.insert(message_id, previous);
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Local-only
// ---------------------------------------------------------------------------

pub struct LocalLikes {
    store: SharedStore,
    liked: HashMap<String, bool>,
    counts: HashMap<String, u32>,
}

impl LocalLikes {
    /// Load both maps from `store`.
    pub fn load(store: SharedStore) -> Self {
        let liked = store.liked_comments();
        let counts = store.heart_counts();
        Self { store, liked, counts }
    }

    fn key(user: &str, text: &str) -> String {
        format!("{user}{text}")
    }

    pub fn status(&self, user: &str, text: &str) -> LikeStatus {
        let key = Self::key(user, text);
        LikeStatus {
            liked_by_me: self.liked.get(&key).copied().unwrap_or(false),
            liked_cnt: self.counts.get(&key).copied().unwrap_or(0),
        }
    }

    /// Flip the heart for `user + text` and persist both maps.
    ///
    /// When either write fails, both maps are restored in memory and in the
    /// store before the error is returned.
    pub fn toggle(&mut self, user: &str, text: &str) -> Result<LikeStatus> {
        let key = Self::key(user, text);
        let next = self.status(user, text).toggled();
        let prev_liked = self.liked.insert(key.clone(), next.liked_by_me);
        let prev_count = self.counts.insert(key.clone(), next.liked_cnt);

        let persisted = self
            .store
            .set_liked_comments(&self.liked)
            .and_then(|()| self.store.set_heart_counts(&self.counts));
        if let Err(e) = persisted {
            warn!(%key, error = %e, "heart not persisted, rolling back");
            restore(&mut self.liked, &key, prev_liked);
            restore(&mut self.counts, &key, prev_count);
            // Best effort: the store may refuse this too.
            let _ = self.store.set_liked_comments(&self.liked);
            let _ = self.store.set_heart_counts(&self.counts);
            return Err(e);
        }
        Ok(next)
    }

    /// Reload after a change made elsewhere. Returns whether anything was
    /// reloaded.
    pub fn apply_change(&mut self, change: &StoreChange) -> bool {
        match change.key.as_str() {
            KEY_LIKED_COMMENTS => {
                self.liked = self.store.liked_comments();
                true
            }
            KEY_HEART_COUNTS => {
                self.counts = self.store.heart_counts();
                true
            }
            _ => false,
        }
    }

    /// Wait for the next relevant change on `rx` and apply it.
    ///
    /// Returns `false` once the store is gone.
    pub async fn watch(
        &mut self,
        rx: &mut tokio::sync::broadcast::Receiver<StoreChange>,
    ) -> bool {
        loop {
            match rx.recv().await {
                Ok(change) => {
                    if self.apply_change(&change) {
                        return true;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "like watcher lagged, reloading everything");
                    self.liked = self.store.liked_comments();
                    self.counts = self.store.heart_counts();
                    return true;
                }
                Err(RecvError::Closed) => return false,
            }
        }
    }
}

fn restore<V>(map: &mut HashMap<String, V>, key: &str, previous: Option<V>) {
    match previous {
        Some(v) => {
            map.insert(key.to_string(), v);
        }
        None => {
            map.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalStore;

    fn message(id: u64, liked: bool, cnt: u32) -> Message {
        Message {
            message_id: Some(id),
            liked_by_me: Some(liked),
            liked_cnt: Some(cnt),
            ..Message::new("u", "t")
        }
    }

    #[test]
    fn toggling_twice_restores_status() {
        let mut likes = ServerLikes::new();
        likes.sync_from(&[message(42, false, 3)]);
        let once = likes.toggle_local(42);
        assert_eq!(once, LikeStatus { liked_by_me: true, liked_cnt: 4 });
        let twice = likes.toggle_local(42);
        assert_eq!(twice, LikeStatus { liked_by_me: false, liked_cnt: 3 });
    }

    #[test]
    fn unlike_never_goes_negative() {
        let s = LikeStatus { liked_by_me: true, liked_cnt: 0 }.toggled();
        assert_eq!(s, LikeStatus { liked_by_me: false, liked_cnt: 0 });
    }

    #[test]
    fn sync_skips_messages_without_id() {
        let mut likes = ServerLikes::new();
        likes.sync_from(&[Message::new("a", "b"), message(7, true, 1)]);
        assert_eq!(likes.status(7), LikeStatus { liked_by_me: true, liked_cnt: 1 });
        assert_eq!(likes.statuses.len(), 1);
    }

    #[tokio::test]
    async fn rejected_toggle_rolls_back() {
        let client = CommentClient::new(reqwest::Client::new(), "http://127.0.0.1:1");
        let mut likes = ServerLikes::new();
        likes.sync_from(&[message(42, false, 5)]);
        assert!(likes.toggle(&client, 42, 1).await.is_err());
        assert_eq!(likes.status(42), LikeStatus { liked_by_me: false, liked_cnt: 5 });
    }

    #[test]
    fn local_toggle_persists_to_store() {
        let store = LocalStore::in_memory().shared();
        let mut likes = LocalLikes::load(store.clone());
        let s = likes.toggle("bob", "nice").unwrap();
        assert_eq!(s, LikeStatus { liked_by_me: true, liked_cnt: 1 });
        assert_eq!(store.liked_comments().get("bobnice"), Some(&true));
        assert_eq!(store.heart_counts().get("bobnice"), Some(&1));
        let s = likes.toggle("bob", "nice").unwrap();
        assert_eq!(s, LikeStatus { liked_by_me: false, liked_cnt: 0 });
    }

    #[test]
    fn failed_persist_restores_hearts() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path().join("missing").join("store.json")).shared();
        let mut likes = LocalLikes::load(store.clone());
        assert!(likes.toggle("bob", "nice").is_err());
        assert_eq!(likes.status("bob", "nice"), LikeStatus::default());
        assert!(store.liked_comments().is_empty());
        assert!(store.heart_counts().is_empty());
    }

    #[tokio::test]
    async fn second_session_sees_changes() {
        let store = LocalStore::in_memory().shared();
        let mut tab_a = LocalLikes::load(store.clone());
        let mut tab_b = LocalLikes::load(store.clone());
        let mut rx = store.subscribe();
        tab_a.toggle("bob", "nice").unwrap();
        assert!(tab_b.watch(&mut rx).await);
        assert!(tab_b.watch(&mut rx).await);
        assert_eq!(
            tab_b.status("bob", "nice"),
            LikeStatus { liked_by_me: true, liked_cnt: 1 }
        );
    }
}
