//! A small JSON key-value store persisted to one file.
//!
//! Every mutation rewrites the whole file. Writes are queued to a single
//! writer task so at most one is in flight and they land in mutation order.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_channel::{Receiver, Sender};
use serde_json::{Map, Value};

use crate::{Error, Result};

type Entries = Map<String, Value>;
type Ack = Receiver<io::Result<()>>;

#[derive(Debug)]
struct Job {
    snapshot: Vec<u8>,
    done: Sender<io::Result<()>>,
}

#[derive(Debug)]
struct Inner {
    entries: Mutex<Entries>,
    writer: Option<Sender<Job>>,
}

/// A cheaply cloneable handle to the store.
#[derive(Debug, Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl Store {
    /// Open the store backed by `path`.
    ///
    /// A missing or unreadable file gives an empty store; the file is created
    /// on the first write.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load(&path).await;
        log::debug!("opened store {} with {} entries", path.display(), entries.len());

        let (writer, jobs) = async_channel::unbounded();
        async_global_executor::spawn(write_loop(path, jobs)).detach();

        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(entries),
                writer: Some(writer),
            }),
        }
    }

    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(Map::new()),
                writer: None,
            }),
        }
    }

    /// Get a copy of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Store `value` under `key` and wait until it is on disk.
    ///
    /// If the write fails the previous value is put back, unless `key` was
    /// changed again in the meantime.
    pub async fn set(&self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        let (previous, ack) = {
            let mut entries = self.lock();
            let previous = entries.insert(key.clone(), value.clone());
            (previous, self.persist(&entries))
        };
        let result = match ack {
            Ok(ack) => wait(ack).await,
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.restore(&key, Some(&value), previous);
        }
        result
    }

    /// Remove `key` and wait until the change is on disk.
    ///
    /// If the write fails the removed value is put back, unless `key` was
    /// set again in the meantime.
    pub async fn delete(&self, key: &str) -> Result<Option<Value>> {
        let (removed, ack) = {
            let mut entries = self.lock();
            let removed = entries.remove(key);
            (removed, self.persist(&entries))
        };
        let result = match ack {
            Ok(ack) => wait(ack).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => Ok(removed),
            Err(e) => {
                self.restore(key, None, removed);
                Err(e)
            }
        }
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store has no entries.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Undo a mutation whose write failed, if `key` still holds `written`.
    fn restore(&self, key: &str, written: Option<&Value>, previous: Option<Value>) {
        let mut entries = self.lock();
        if entries.get(key) != written {
            return;
        }
        log::debug!("rolling back {} after a failed write", key);
        match previous {
            Some(value) => {
                entries.insert(key.to_owned(), value);
            }
            None => {
                entries.remove(key);
            }
        }
    }

    // Called with the lock held so jobs are queued in mutation order.
    fn persist(&self, entries: &Entries) -> Result<Option<Ack>> {
        let writer = match &self.inner.writer {
            Some(writer) => writer,
            None => return Ok(None),
        };
        let snapshot = serde_json::to_vec_pretty(entries)?;
        let (done, ack) = async_channel::bounded(1);
        writer
            .try_send(Job { snapshot, done })
            .map_err(|_| writer_gone())?;
        Ok(Some(ack))
    }
}

async fn wait(ack: Option<Ack>) -> Result<()> {
    match ack {
        None => Ok(()),
        Some(ack) => match ack.recv().await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(writer_gone()),
        },
    }
}

async fn load(path: &Path) -> Entries {
    let read_path = path.to_owned();
    let bytes = match async_global_executor::spawn_blocking(move || std::fs::read(read_path)).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Map::new(),
        Err(e) => {
            log::warn!("could not read store {}: {}", path.display(), e);
            return Map::new();
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(entries)) => entries,
        Ok(_) => {
            log::warn!("store {} does not hold a JSON object, starting empty", path.display());
            Map::new()
        }
        Err(e) => {
            log::warn!("store {} is not valid JSON, starting empty: {}", path.display(), e);
            Map::new()
        }
    }
}

async fn write_loop(path: PathBuf, jobs: Receiver<Job>) {
    while let Ok(Job { snapshot, done }) = jobs.recv().await {
        let target = path.clone();
        let result =
            async_global_executor::spawn_blocking(move || write_file(&target, &snapshot)).await;
        if let Err(e) = &result {
            log::error!("failed to write store {}: {}", path.display(), e);
        }
        let _ = done.try_send(result);
    }
    log::trace!("store writer for {} stopped", path.display());
}

/// Write to a sibling temp file, then rename over the target.
fn write_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)
}

fn writer_gone() -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "store writer has stopped",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn on_disk(path: &Path) -> Value {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    #[async_std::test]
    async fn set_get_delete() {
        let store = Store::in_memory();
        assert!(store.is_empty());
        store.set("a", json!(1)).await.unwrap();
        assert_eq!(store.get("a"), Some(json!(1)));
        assert_eq!(store.delete("a").await.unwrap(), Some(json!(1)));
        assert_eq!(store.get("a"), None);
        assert_eq!(store.delete("a").await.unwrap(), None);
    }

    #[async_std::test]
    async fn writes_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");

        let store = Store::open(&path).await;
        store.set("user", json!({"id": 99})).await.unwrap();
        store.set("count", json!(2)).await.unwrap();
        assert_eq!(on_disk(&path), json!({"user": {"id": 99}, "count": 2}));

        store.delete("count").await.unwrap();
        assert_eq!(on_disk(&path), json!({"user": {"id": 99}}));

        let reopened = Store::open(&path).await;
        assert_eq!(reopened.get("user"), Some(json!({"id": 99})));
        assert_eq!(reopened.len(), 1);
    }

    #[async_std::test]
    async fn concurrent_writes_land_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        let store = Store::open(&path).await;

        let writes: Vec<_> = (0..20)
            .map(|i| {
                let store = store.clone();
                async_std::task::spawn(async move { store.set("n", json!(i)).await })
            })
            .collect();
        for write in writes {
            write.await.unwrap();
        }

        // Whichever write ran last under the lock is also the last on disk.
        assert_eq!(on_disk(&path)["n"], store.get("n").unwrap());
    }

    #[async_std::test]
    async fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = Store::open(&path).await;
        assert!(store.is_empty());
        store.set("a", json!("b")).await.unwrap();
        assert_eq!(on_disk(&path), json!({"a": "b"}));
    }

    #[async_std::test]
    async fn failed_write_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        let store = Store::open(&path).await;
        store.set("a", json!(1)).await.unwrap();

        std::fs::remove_dir_all(dir.path()).unwrap();

        assert!(store.set("a", json!(2)).await.is_err());
        assert_eq!(store.get("a"), Some(json!(1)));
        assert!(store.set("b", json!(3)).await.is_err());
        assert_eq!(store.get("b"), None);
        assert!(store.delete("a").await.is_err());
        assert_eq!(store.get("a"), Some(json!(1)));
        assert_eq!(store.len(), 1);
    }

    #[async_std::test]
    async fn missing_file_is_created_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested.json");
        let store = Store::open(&path).await;
        assert!(!path.exists());
        store.set("a", json!(true)).await.unwrap();
        assert!(path.exists());
    }
}
