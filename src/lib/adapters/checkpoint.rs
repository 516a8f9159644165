use std::{
    collections::BTreeMap,
    path::PathBuf,
};

use tokio::sync::Mutex;

use crate::{
    domain::events::EventPosition,
    ports::checkpoint::{
        CheckpointError,
        CheckpointStore,
    },
};

/// Watermarks kept in a JSON file, one entry per stream.
///
/// Each save rewrites the whole file through a sibling temp file and a rename,
/// so a crash leaves either the old or the new map on disk.
pub struct FileCheckpoint {
    path: PathBuf,
    /// Serializes writers within this process.
    lock: Mutex<()>,
}

impl FileCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<BTreeMap<String, EventPosition>, CheckpointError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl CheckpointStore for FileCheckpoint {
    async fn load(&self, stream: &str) -> Result<Option<EventPosition>, CheckpointError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.get(stream).copied())
    }

    async fn save(&self, stream: &str, position: EventPosition) -> Result<(), CheckpointError> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        all.insert(stream.to_string(), position);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&all)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// In-memory implementation of `CheckpointStore` for testing.
#[derive(Default)]
pub struct InMemoryCheckpoint {
    positions: Mutex<BTreeMap<String, EventPosition>>,
}

impl InMemoryCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for InMemoryCheckpoint {
    async fn load(&self, stream: &str) -> Result<Option<EventPosition>, CheckpointError> {
        Ok(self.positions.lock().await.get(stream).copied())
    }

    async fn save(&self, stream: &str, position: EventPosition) -> Result<(), CheckpointError> {
        self.positions
            .lock()
            .await
            .insert(stream.to_string(), position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_checkpoint_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("relayer.json");

        let store = FileCheckpoint::new(&path);
        assert_eq!(store.load("deposits").await.unwrap(), None);

        store.save("deposits", EventPosition::new(12, 3)).await.unwrap();
        store.save("reclaims", EventPosition::new(40, 0)).await.unwrap();

        let reopened = FileCheckpoint::new(&path);
        assert_eq!(
            reopened.load("deposits").await.unwrap(),
            Some(EventPosition::new(12, 3))
        );
        assert_eq!(
            reopened.load("reclaims").await.unwrap(),
            Some(EventPosition::new(40, 0))
        );
    }

    #[tokio::test]
    async fn test_file_checkpoint_overwrites_stream() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpoint::new(dir.path().join("cp.json"));
        store.save("deposits", EventPosition::new(1, 0)).await.unwrap();
        store.save("deposits", EventPosition::end_of(5)).await.unwrap();
        assert_eq!(
            store.load("deposits").await.unwrap(),
            Some(EventPosition::end_of(5))
        );
    }

    #[tokio::test]
    async fn test_corrupt_file_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        let store = FileCheckpoint::new(&path);
        assert!(matches!(
            store.load("deposits").await,
            Err(CheckpointError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_in_memory_checkpoint() {
        let store = InMemoryCheckpoint::new();
        assert_eq!(store.load("x").await.unwrap(), None);
        store.save("x", EventPosition::new(2, 1)).await.unwrap();
        assert_eq!(store.load("x").await.unwrap(), Some(EventPosition::new(2, 1)));
    }
}
