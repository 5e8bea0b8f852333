//! Audio sink - persists inbound audio chunks.
//!
//! Identifiers have the form `<unix_millis:013>-<seq:010>-<instance>.wav`:
//!
//! - `seq` comes from an atomic counter owned by the sink, shared by every
//!   session writing through it, so chunks arriving in the same millisecond
//!   still get distinct names.
//! - `instance` is a random token minted when the sink is created, so two
//!   sinks (or two processes) writing to the same root cannot collide.
//!
//! Names sort lexicographically in arrival order for a single sink.
//!
//! Each chunk is written to a hidden temp file in the root and renamed into
//! place, so a chunk is either fully visible or not visible at all.

use crate::errors::StorageError;
use async_trait::async_trait;
use chrono::Utc;
use common::types::AudioId;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use uuid::Uuid;

/// File extension for persisted chunks.
pub const AUDIO_EXTENSION: &str = "wav";

/// Destination for inbound audio chunks.
///
/// Must tolerate concurrent calls from many sessions.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Persist one chunk and return its identifier.
    async fn store(&self, bytes: &[u8]) -> Result<AudioId, StorageError>;
}

/// Filesystem-backed sink writing under a root directory.
#[derive(Debug)]
pub struct FsAudioSink {
    root: PathBuf,
    instance: String,
    sequence: AtomicU64,
}

impl FsAudioSink {
    /// Create a sink rooted at `root`. The directory is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let token = Uuid::new_v4().simple().to_string();
        let instance = token.get(..12).unwrap_or(&token).to_string();
        Self {
            root: root.into(),
            instance,
            sequence: AtomicU64::new(0),
        }
    }

    /// Storage root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a stored chunk.
    #[must_use]
    pub fn path_of(&self, id: &AudioId) -> PathBuf {
        self.root.join(id.as_str())
    }

    fn next_id(&self) -> AudioId {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let millis = Utc::now().timestamp_millis();
        AudioId::new(format!(
            "{millis:013}-{seq:010}-{}.{AUDIO_EXTENSION}",
            self.instance
        ))
    }

    async fn write_atomically(&self, id: &AudioId, bytes: &[u8]) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StorageError::Io {
                path: self.root.clone(),
                source,
            })?;

        let final_path = self.path_of(id);
        let temp_path = self.root.join(format!(".{}.tmp", id.as_str()));

        let result = async {
            let mut file = tokio::fs::File::create(&temp_path).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&temp_path, &final_path).await
        }
        .await;

        if let Err(source) = result {
            // Best effort: never leave a partial temp file behind.
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(StorageError::Io {
                path: final_path,
                source,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl AudioSink for FsAudioSink {
    #[instrument(skip_all, name = "vs.sink.store", fields(len = bytes.len()))]
    async fn store(&self, bytes: &[u8]) -> Result<AudioId, StorageError> {
        let id = self.next_id();
        self.write_atomically(&id, bytes).await?;

        debug!(
            target: "vs.sink",
            audio_id = %id,
            bytes = bytes.len(),
            "Audio chunk stored"
        );

        Ok(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn stored_files(root: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_store_writes_full_payload() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsAudioSink::new(dir.path());

        let id = sink.store(b"RIFF-chunk-bytes").await.unwrap();

        let written = std::fs::read(sink.path_of(&id)).unwrap();
        assert_eq!(written, b"RIFF-chunk-bytes");
        assert!(id.as_str().ends_with(".wav"));
    }

    #[tokio::test]
    async fn test_store_creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("audio");
        let sink = FsAudioSink::new(&root);

        sink.store(b"x").await.unwrap();

        assert!(root.is_dir());
        assert_eq!(stored_files(&root).len(), 1);
    }

    #[tokio::test]
    async fn test_no_temp_files_remain() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsAudioSink::new(dir.path());

        for _ in 0..5 {
            sink.store(b"abc").await.unwrap();
        }

        let names = stored_files(dir.path());
        assert_eq!(names.len(), 5);
        assert!(names.iter().all(|n| !n.starts_with('.')));
    }

    #[tokio::test]
    async fn test_ids_sort_in_arrival_order() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsAudioSink::new(dir.path());

        let first = sink.store(b"1").await.unwrap();
        let second = sink.store(b"2").await.unwrap();
        let third = sink.store(b"3").await.unwrap();

        assert!(first < second);
        assert!(second < third);
        assert_eq!(std::fs::read(sink.path_of(&third)).unwrap(), b"3");
    }

    #[tokio::test]
    async fn test_burst_within_same_tick_yields_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(FsAudioSink::new(dir.path()));
        const N: usize = 200;

        let mut handles = Vec::with_capacity(N);
        for i in 0..N {
            let sink = Arc::clone(&sink);
            handles.push(tokio::spawn(async move {
                sink.store(format!("chunk-{i}").as_bytes()).await.unwrap()
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }

        assert_eq!(ids.len(), N);
        assert_eq!(stored_files(dir.path()).len(), N);
    }

    #[tokio::test]
    async fn test_two_sinks_on_same_root_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let a = FsAudioSink::new(dir.path());
        let b = FsAudioSink::new(dir.path());

        let (id_a, id_b) = tokio::join!(a.store(b"a"), b.store(b"b"));
        let (id_a, id_b) = (id_a.unwrap(), id_b.unwrap());

        assert_ne!(id_a, id_b);
        assert_eq!(stored_files(dir.path()).len(), 2);
    }

    #[tokio::test]
    async fn test_unwritable_root_reports_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the root directory should be.
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let sink = FsAudioSink::new(&blocker);

        let result = sink.store(b"x").await;

        assert!(matches!(result, Err(StorageError::Io { .. })));
    }
}
