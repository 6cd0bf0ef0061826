//! Storage channel abstraction
//!
//! The storage channel holds every relayed file. Uploads are relayed into
//! it and get a [`StorageId`]; downloads fetch by that identifier.
//! The Telegram implementation lives in [`crate::telegram`]; [`MemoryStore`]
//! keeps everything in-process.

mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use grammers_session::PackedChat;
use std::fmt;

/// Identifier of a file held in the storage channel (the channel message ID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageId(u64);

impl StorageId {
    /// Create a new storage identifier
    pub const fn new(id: u64) -> Self {
        StorageId(id)
    }

    /// Get the raw value
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Convert to a Telegram message ID, if it is in range
    pub fn as_message_id(self) -> Option<i32> {
        i32::try_from(self.0).ok().filter(|id| *id > 0)
    }
}

impl From<i32> for StorageId {
    fn from(id: i32) -> Self {
        // Telegram message IDs are always positive
        StorageId(id.max(0) as u64)
    }
}

impl From<u64> for StorageId {
    fn from(id: u64) -> Self {
        StorageId(id)
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A document a user sent to the bot, waiting to be relayed
#[derive(Debug, Clone)]
pub struct Upload {
    /// Chat the document was sent in
    pub chat: PackedChat,
    /// Message ID of the document within that chat
    pub message_id: i32,
    /// Original file name
    pub file_name: String,
    /// File size in bytes
    pub size: u64,
}

/// A file fetched back from the storage channel
pub struct StoredFile {
    /// Total size in bytes, if known up front
    pub size: Option<u64>,
    /// File content, in transport-sized chunks
    pub content: BoxStream<'static, std::io::Result<Bytes>>,
}

impl fmt::Debug for StoredFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredFile")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Backing store for relayed files
#[async_trait]
pub trait StorageChannel: Send + Sync {
    /// Move an uploaded file into the channel and return its identifier
    async fn relay(&self, upload: &Upload) -> Result<StorageId>;

    /// Fetch a stored file, or `None` if the identifier names nothing with a file
    async fn fetch(&self, id: StorageId) -> Result<Option<StoredFile>>;

    /// Whether the channel is currently reachable
    fn is_connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_range() {
        assert_eq!(StorageId::new(100).as_message_id(), Some(100));
        assert_eq!(StorageId::new(i32::MAX as u64).as_message_id(), Some(i32::MAX));
        assert_eq!(StorageId::new(0).as_message_id(), None);
        assert_eq!(StorageId::new(i32::MAX as u64 + 1).as_message_id(), None);
    }

    #[test]
    fn test_from_message_id() {
        assert_eq!(StorageId::from(42i32), StorageId::new(42));
        assert_eq!(StorageId::from(-1i32), StorageId::new(0));
    }
}
