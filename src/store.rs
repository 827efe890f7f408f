//! Client-persisted key-value state.
//!
//! A single JSON object on disk stands in for browser local storage. Every
//! mutation rewrites the file and is broadcast to subscribers, which is how
//! other sessions ("tabs") sharing the store pick up the change.
//!
//! ## Keys
//! - `username`: display name chosen at login
//! - `videoId`: current live video identifier
//! - `likedComments`: `{ "<user><text>": bool }`
//! - `heartCounts`: `{ "<user><text>": u32 }`

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::{LiveError, Result};

pub const KEY_USERNAME: &str = "username";
pub const KEY_VIDEO_ID: &str = "videoId";
pub const KEY_LIKED_COMMENTS: &str = "likedComments";
pub const KEY_HEART_COUNTS: &str = "heartCounts";

/// One key changed. `value` is `None` when the key was removed.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    pub key: String,
    pub value: Option<Value>,
}

pub type SharedStore = Arc<LocalStore>;

pub struct LocalStore {
    path: Option<PathBuf>,
    entries: Mutex<Map<String, Value>>,
    /// Bumped under the `entries` lock on every mutation.
    version: AtomicU64,
    /// Version of the snapshot last written to `path`.
    written: Mutex<u64>,
    changes: broadcast::Sender<StoreChange>,
}

impl LocalStore {
    /// Open (or lazily create) the store file at `path`.
    ///
    /// A missing file starts empty. An unreadable or corrupt file also
    /// starts empty and is overwritten on the next write.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Map<String, Value>>(&text) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "store file is corrupt, starting empty");
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "store file unreadable, starting empty");
                Map::new()
            }
        };
        Self::with_entries(Some(path), entries)
    }

    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self::with_entries(None, Map::new())
    }

    fn with_entries(path: Option<PathBuf>, entries: Map<String, Value>) -> Self {
        let (changes, _rx) = broadcast::channel(64);
        Self {
            path,
            entries: Mutex::new(entries),
            version: AtomicU64::new(0),
            written: Mutex::new(0),
            changes,
        }
    }

    pub fn shared(self) -> SharedStore {
        Arc::new(self)
    }

    /// Receive every subsequent change.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    pub fn get_raw(&self, key: &str) -> Option<Value> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    pub fn set_raw(&self, key: &str, value: Value) -> Result<()> {
        self.mutate(key, Some(value))
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.mutate(key, None)
    }

    /// Apply one change in memory, then write a snapshot to disk without
    /// holding the entries lock, so readers never wait on the file.
    fn mutate(&self, key: &str, value: Option<Value>) -> Result<()> {
        let (snapshot, version) = {
            let mut guard = self.entries.lock().map_err(|_| LiveError::Store {
                detail: "store lock poisoned".to_string(),
            })?;
            match &value {
                Some(v) => {
                    guard.insert(key.to_string(), v.clone());
                }
                None => {
                    guard.remove(key);
                }
            }
            let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
            (self.path.as_ref().map(|_| guard.clone()), version)
        };
        if let Some(snapshot) = snapshot {
            self.flush(&snapshot, version)?;
        }
        // No receivers is fine.
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    /// Write `entries` unless a newer snapshot already reached the disk.
    fn flush(&self, entries: &Map<String, Value>, version: u64) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut written = self.written.lock().map_err(|_| LiveError::Store {
            detail: "store file lock poisoned".to_string(),
        })?;
        if *written > version {
            return Ok(());
        }
        let text = serde_json::to_string_pretty(entries).map_err(|e| LiveError::Store {
            detail: e.to_string(),
        })?;
        std::fs::write(path, text).map_err(|e| LiveError::Store {
            detail: format!("{}: {e}", path.display()),
        })?;
        *written = version;
        Ok(())
    }

    fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_raw(key)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    fn set_typed<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let v = serde_json::to_value(value).map_err(|e| LiveError::Store {
            detail: e.to_string(),
        })?;
        self.set_raw(key, v)
    }

    // -- typed accessors ----------------------------------------------------

    pub fn username(&self) -> Option<String> {
        self.get_typed::<String>(KEY_USERNAME).filter(|s| !s.is_empty())
    }

    pub fn set_username(&self, name: &str) -> Result<()> {
        self.set_typed(KEY_USERNAME, &name)
    }

    /// The stored live video id. An empty string counts as absent.
    pub fn video_id(&self) -> Option<String> {
        self.get_typed::<String>(KEY_VIDEO_ID).filter(|s| !s.is_empty())
    }

    pub fn set_video_id(&self, id: &str) -> Result<()> {
        self.set_typed(KEY_VIDEO_ID, &id)
    }

    pub fn clear_video_id(&self) -> Result<()> {
        self.remove(KEY_VIDEO_ID)
    }

    pub fn liked_comments(&self) -> HashMap<String, bool> {
        self.get_typed(KEY_LIKED_COMMENTS).unwrap_or_default()
    }

    pub fn set_liked_comments(&self, liked: &HashMap<String, bool>) -> Result<()> {
        self.set_typed(KEY_LIKED_COMMENTS, liked)
    }

    pub fn heart_counts(&self) -> HashMap<String, u32> {
        self.get_typed(KEY_HEART_COUNTS).unwrap_or_default()
    }

    pub fn set_heart_counts(&self, counts: &HashMap<String, u32>) -> Result<()> {
        self.set_typed(KEY_HEART_COUNTS, counts)
    }
}
