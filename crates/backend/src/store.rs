use crate::machine::record::VmRecord;
use async_trait::async_trait;
use pvedeploy_common::prelude::{Error, Result};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// Durable storage of machine records.
///
#[async_trait]
pub trait RecordStore {
    async fn load(&self, name: &str) -> Result<Option<VmRecord>>;
    async fn save(&self, record: &VmRecord) -> Result<()>;
    async fn remove(&self, name: &str) -> Result<()>;
}

/// Keeps one JSON file per machine in a directory.
///
/// Records hold the client private key. Each write replaces the record in
/// one rename and never exposes it to other users.
///
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn load(&self, name: &str) -> Result<Option<VmRecord>> {
        let content = match tokio::fs::read_to_string(self.record_path(name)).await {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn save(&self, record: &VmRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let content = serde_json::to_vec_pretty(record)?;
        write_owner_only(self.record_path(&record.name), content).await?;

        tracing::debug!(target: "store", name = %record.name, state = ?record.state, "Record saved");
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        match tokio::fs::remove_file(self.record_path(name)).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

/// Replaces `path` with `content`, readable by the owner only.
///
/// The content goes to a temporary file created with mode 0600 next to
/// `path`, which is then renamed over it. A failed write leaves no temporary
/// file behind.
///
pub(crate) async fn write_owner_only(path: PathBuf, content: Vec<u8>) -> Result<()> {
    tokio::task::spawn_blocking(move || -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(&content)?;
        file.as_file().sync_all()?;
        file.persist(&path).map_err(|error| error.error)?;
        Ok(())
    })
    .await
    .map_err(|error| Error::Any(error.to_string()))?
}

/// Process-local store, used when the host framework persists records itself.
///
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, VmRecord>>,
}

impl MemoryStore {
    pub fn get(&self, name: &str) -> Option<VmRecord> {
        self.lock().get(name).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, VmRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load(&self, name: &str) -> Result<Option<VmRecord>> {
        Ok(self.get(name))
    }

    async fn save(&self, record: &VmRecord) -> Result<()> {
        self.lock().insert(record.name.clone(), record.clone());
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.lock().remove(name);
        Ok(())
    }
}
