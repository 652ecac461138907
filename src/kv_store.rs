use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

pub const QIDS_KEY: &str = "qids";
pub const SITES_NS: &str = "sites";
pub const EDITORS_NS: &str = "editors";
pub const ITEM_SITELINKS_NS: &str = "sitelinks";

/// Key for an entry inside a namespace, e.g. `sites/dewiki`.
pub fn key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// A stored entry as returned by [`KeyValueStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub name: String,
    pub size: u64,
}

/// The cache artifacts of a run. Values are written whole, never patched.
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn put(&self, key: &str, value: &Value) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
    /// Entries directly inside `namespace`, largest first; ties by name.
    async fn list(&self, namespace: &str) -> Result<Vec<StoredEntry>>;
}

pub async fn load<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(value) => {
            let ret = serde_json::from_value(value)
                .map_err(|e| anyhow!("Stored value for '{key}' has unexpected shape: {e}"))?;
            Ok(Some(ret))
        }
        None => Ok(None),
    }
}

pub async fn save<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let value = serde_json::to_value(value)?;
    store.put(key, &value).await
}

/// Recursively sorts object keys so stored files are stable across runs.
pub fn sorted_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, sorted_keys(v))).collect();
            let mut ret = Map::new();
            for (k, v) in sorted {
                ret.insert(k.to_owned(), v);
            }
            Value::Object(ret)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sorted_keys).collect()),
        other => other.to_owned(),
    }
}

fn sort_entries(entries: &mut [StoredEntry]) {
    entries.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.name.cmp(&b.name)));
}

// ---------------------------------------------------------------------------
// FileStore – one JSON file per key under a root directory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(anyhow!("Cannot read {}: {e}", path.display())),
        };
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| anyhow!("Cannot parse {}: {e}", path.display()))?;
        Ok(Some(value))
    }

    async fn put(&self, key: &str, value: &Value) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let text = serde_json::to_string(&sorted_keys(value))?;
        tokio::fs::write(&path, text)
            .await
            .map_err(|e| anyhow!("Cannot write {}: {e}", path.display()))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(key)).await?)
    }

    async fn list(&self, namespace: &str) -> Result<Vec<StoredEntry>> {
        let dir = self.root.join(namespace);
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(anyhow!("Cannot list {}: {e}", dir.display())),
        };
        let mut ret = vec![];
        while let Some(entry) = read_dir.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().to_string();
            let name = match file_name.strip_suffix(".json") {
                Some(name) => name.to_string(),
                None => continue,
            };
            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                ret.push(StoredEntry {
                    name,
                    size: metadata.len(),
                });
            }
        }
        sort_entries(&mut ret);
        Ok(ret)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &Value) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), sorted_keys(value));
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn list(&self, namespace: &str) -> Result<Vec<StoredEntry>> {
        let prefix = format!("{namespace}/");
        let mut ret = vec![];
        for (k, v) in self.entries.read().await.iter() {
            let name = match k.strip_prefix(&prefix) {
                Some(name) if !name.contains('/') => name,
                _ => continue,
            };
            ret.push(StoredEntry {
                name: name.to_string(),
                size: serde_json::to_string(v)?.len() as u64,
            });
        }
        sort_entries(&mut ret);
        Ok(ret)
    }
}
