use std::future::Future;

use crate::domain::events::EventPosition;

/// Port for the relayer's per-subscription watermark.
///
/// Implementations:
/// - `FileCheckpoint` (JSON file, replaced atomically)
/// - `InMemoryCheckpoint` for testing
pub trait CheckpointStore: Send + Sync {
    /// Last position fully handled on `stream`, if any.
    fn load(
        &self,
        stream: &str,
    ) -> impl Future<Output = Result<Option<EventPosition>, CheckpointError>> + Send;

    fn save(
        &self,
        stream: &str,
        position: EventPosition,
    ) -> impl Future<Output = Result<(), CheckpointError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt checkpoint file: {0}")]
    Corrupt(#[from] serde_json::Error),
}
