//! Session-evidence marker.
//! An explicit, versioned record written by the kernel when a session is
//! established and removed on sign-out. Route guards read it to choose
//! between a loading indicator and an immediate redirect while the kernel
//! is still resolving; it is advisory only and never an authority on phase
//! or identity.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MARKER_KEY: &str = "sessium.session_marker";
pub const MARKER_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMarker {
    pub version: u32,
    pub marker_id: Uuid,
    #[serde(default)]
    pub user_id: Option<String>,
    pub written_at: DateTime<Utc>,
}

impl SessionMarker {
    pub fn for_user(user_id: Option<&str>) -> Self {
        Self {
            version: MARKER_VERSION,
            marker_id: Uuid::new_v4(),
            user_id: user_id.map(|s| s.to_string()),
            written_at: Utc::now(),
        }
    }
}

/// Small keyed string store standing in for whatever persistent storage the
/// host has (browser storage, a state dir). Synchronous on purpose: values
/// are tiny and local.
pub trait MarkerStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

pub fn write_marker(store: &dyn MarkerStore, user_id: Option<&str>) -> Result<()> {
    let marker = SessionMarker::for_user(user_id);
    let json = serde_json::to_string(&marker).context("serialize session marker")?;
    store.write(MARKER_KEY, &json)
}

pub fn clear_marker(store: &dyn MarkerStore) -> Result<()> {
    store.remove(MARKER_KEY)
}

/// True when a well-formed marker of the current version is present. A
/// missing, corrupt or version-mismatched marker all read as "no evidence";
/// this must stay lenient because the store is shared, user-writable space.
pub fn has_session_evidence(store: &dyn MarkerStore) -> bool {
    let raw = match store.read(MARKER_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return false,
        Err(e) => {
            tracing::debug!(target: "sessium::marker", "marker read failed: {}", e);
            return false;
        }
    };
    match serde_json::from_str::<SessionMarker>(&raw) {
        Ok(m) => m.version == MARKER_VERSION,
        Err(_) => false,
    }
}

/// In-memory store for tests and headless hosts.
#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    map: parking_lot::Mutex<HashMap<String, String>>,
}

impl MemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MarkerStore for MemoryMarkerStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.map.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.map.lock().remove(key);
        Ok(())
    }
}

/// File-backed store: one JSON file per key under a root directory,
/// filenames sanitized the same way other on-disk names are.
#[derive(Debug, Clone)]
pub struct FileMarkerStore {
    root: PathBuf,
}

impl FileMarkerStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("create marker store root: {}", root.display()))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.root.join(format!("{}.json", name))
    }
}

impl MarkerStore for FileMarkerStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read marker {}", path.display())),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        std::fs::write(&path, value).with_context(|| format!("write marker {}", path.display()))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove marker {}", path.display())),
        }
    }
}
