//! In-process storage channel

use crate::error::{Error, Result};
use crate::storage::{StorageChannel, StorageId, StoredFile, Upload};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Chunk size used when streaming stored content back out
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Storage channel that keeps everything in memory
///
/// Uploads must be staged with [`MemoryStore::stage`] before they can be
/// relayed, mirroring how a real upload has to exist in the user's chat first.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    connected: AtomicBool,
}

struct Inner {
    /// Next identifier to hand out
    next_id: u64,
    /// Documents sitting in user chats, keyed by (chat ID, message ID)
    staged: HashMap<(i64, i32), Bytes>,
    /// Relayed files
    files: HashMap<StorageId, Bytes>,
}

impl MemoryStore {
    /// Create a store whose first relayed file gets `first_id`
    pub fn new(first_id: u64) -> Self {
        MemoryStore {
            inner: Mutex::new(Inner {
                next_id: first_id,
                staged: HashMap::new(),
                files: HashMap::new(),
            }),
            connected: AtomicBool::new(true),
        }
    }

    /// Make a document available for relaying
    pub fn stage(&self, upload: &Upload, content: impl Into<Bytes>) {
        self.inner
            .lock()
            .staged
            .insert((upload.chat.id, upload.message_id), content.into());
    }

    /// Put a file straight into the channel
    pub fn insert(&self, id: StorageId, content: impl Into<Bytes>) {
        self.inner.lock().files.insert(id, content.into());
    }

    /// Number of files in the channel
    pub fn len(&self) -> usize {
        self.inner.lock().files.len()
    }

    /// Check if the channel is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Simulate the channel going away or coming back
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl StorageChannel for MemoryStore {
    async fn relay(&self, upload: &Upload) -> Result<StorageId> {
        if !self.is_connected() {
            return Err(Error::TelegramClient("Not connected".to_string()));
        }

        let mut inner = self.inner.lock();
        let content = inner
            .staged
            .get(&(upload.chat.id, upload.message_id))
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!("message {} in chat {}", upload.message_id, upload.chat.id))
            })?;

        let id = StorageId::new(inner.next_id);
        inner.next_id += 1;
        inner.files.insert(id, content);
        Ok(id)
    }

    async fn fetch(&self, id: StorageId) -> Result<Option<StoredFile>> {
        if !self.is_connected() {
            return Err(Error::TelegramClient("Not connected".to_string()));
        }

        let Some(content) = self.inner.lock().files.get(&id).cloned() else {
            return Ok(None);
        };

        let size = content.len() as u64;
        let chunks: Vec<std::io::Result<Bytes>> = (0..content.len())
            .step_by(STREAM_CHUNK_SIZE)
            .map(|start| {
                let end = (start + STREAM_CHUNK_SIZE).min(content.len());
                Ok(content.slice(start..end))
            })
            .collect();

        Ok(Some(StoredFile {
            size: Some(size),
            content: Box::pin(futures::stream::iter(chunks)),
        }))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use grammers_session::{PackedChat, PackedType};

    fn upload(message_id: i32) -> Upload {
        Upload {
            chat: PackedChat {
                ty: PackedType::User,
                id: 42,
                access_hash: Some(0),
            },
            message_id,
            file_name: "report.pdf".to_string(),
            size: 3,
        }
    }

    #[tokio::test]
    async fn test_relay_assigns_sequential_ids() {
        let store = MemoryStore::new(100);
        store.stage(&upload(1), "abc");
        store.stage(&upload(2), "def");

        assert_eq!(store.relay(&upload(1)).await.unwrap(), StorageId::new(100));
        assert_eq!(store.relay(&upload(2)).await.unwrap(), StorageId::new(101));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_relay_unknown_upload() {
        let store = MemoryStore::default();

        assert!(matches!(
            store.relay(&upload(9)).await,
            Err(Error::NotFound(_))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_streams_content() {
        let store = MemoryStore::default();
        let content = vec![7u8; STREAM_CHUNK_SIZE * 2 + 10];
        store.insert(StorageId::new(5), content.clone());

        let file = store.fetch(StorageId::new(5)).await.unwrap().unwrap();
        assert_eq!(file.size, Some(content.len() as u64));

        let chunks: Vec<Bytes> = file.content.try_collect().await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), content);
    }

    #[tokio::test]
    async fn test_fetch_missing() {
        let store = MemoryStore::default();
        assert!(store.fetch(StorageId::new(5)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disconnected() {
        let store = MemoryStore::default();
        store.insert(StorageId::new(5), "abc");
        store.set_connected(false);

        assert!(!store.is_connected());
        assert!(store.fetch(StorageId::new(5)).await.is_err());
    }
}
