use log::{debug, info};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::{GalleryError, GalleryResult};

/// Small synchronous key-value store, scoped to one browser/admin.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> GalleryResult<()>;
    fn remove(&self, key: &str) -> GalleryResult<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryLocalStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> GalleryResult<()> {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> GalleryResult<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

/// One JSON object per file, rewritten on every change.
#[derive(Debug)]
pub struct JsonFileLocalStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileLocalStore {
    pub fn open(path: &Path) -> GalleryResult<Self> {
        let entries = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> GalleryResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl LocalStore for JsonFileLocalStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> GalleryResult<()> {
        let mut entries = lock(&self.entries);
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> GalleryResult<()> {
        let mut entries = lock(&self.entries);
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}

/// Disk-backed client stores kept open at once; older ones are reopened
/// from their file on next use.
pub const MAX_OPEN_CLIENT_STORES: usize = 256;

const CLIENT_PREFIX: &str = "client-";

#[derive(Default)]
struct OpenStores {
    by_name: HashMap<String, Arc<dyn LocalStore>>,
    clients: VecDeque<String>,
}

/// Hands out one local store per namespace (`admin`, `client-<id>`).
///
/// In-memory stores are the only copy of their data and are never evicted.
pub struct LocalStores {
    root: Option<PathBuf>,
    open: Mutex<OpenStores>,
}

impl LocalStores {
    pub fn on_disk(root: PathBuf) -> Self {
        info!("Local stores at {}", root.display());
        Self {
            root: Some(root),
            open: Mutex::new(OpenStores::default()),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            root: None,
            open: Mutex::new(OpenStores::default()),
        }
    }

    pub fn namespace(&self, name: &str) -> GalleryResult<Arc<dyn LocalStore>> {
        let valid = !name.is_empty()
            && name.len() <= 64
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(GalleryError::validation(format!(
                "Invalid local store name '{}'",
                name
            )));
        }

        let mut open = lock(&self.open);
        if let Some(store) = open.by_name.get(name) {
            return Ok(store.clone());
        }

        let store: Arc<dyn LocalStore> = match &self.root {
            Some(root) => Arc::new(JsonFileLocalStore::open(&root.join(format!("{}.json", name)))?),
            None => Arc::new(MemoryLocalStore::new()),
        };

        if self.root.is_some() && name.starts_with(CLIENT_PREFIX) {
            while open.clients.len() >= MAX_OPEN_CLIENT_STORES {
                if let Some(oldest) = open.clients.pop_front() {
                    open.by_name.remove(&oldest);
                    debug!("Closed local store {}", oldest);
                }
            }
            open.clients.push_back(name.to_string());
        }
        open.by_name.insert(name.to_string(), store.clone());
        Ok(store)
    }

    /// Store of the visitor identified by the `x-client-id` header.
    pub fn for_client(&self, client_id: &str) -> GalleryResult<Arc<dyn LocalStore>> {
        self.namespace(&format!("{}{}", CLIENT_PREFIX, client_id))
    }

    pub fn admin(&self) -> GalleryResult<Arc<dyn LocalStore>> {
        self.namespace("admin")
    }

    #[cfg(test)]
    fn open_count(&self) -> usize {
        lock(&self.open).by_name.len()
    }
}
