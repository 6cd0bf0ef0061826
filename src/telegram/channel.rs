//! Telegram-backed storage channel
//!
//! Relaying runs through the bot: the bot can see the user's message and
//! is an admin of the channel, so it forwards the document there. Fetching
//! runs through the user session, which has no download size cap. Channel
//! message IDs are shared by every account, so the forwarded message ID is
//! the storage identifier for both sides.

use crate::error::{Error, Result};
use crate::storage::{StorageChannel, StorageId, StoredFile, Upload};
use crate::telegram::TelegramBackend;

use async_trait::async_trait;
use grammers_client::Client;
use grammers_session::PackedChat;
use std::sync::Arc;
use tracing::{debug, info};

/// Storage channel made of a bot (writes) and a user session (reads)
pub struct TelegramStorage {
    /// Bot client that receives uploads
    bot: Client,
    /// Storage channel as seen by the bot
    channel: PackedChat,
    /// User session for reading files back
    backend: Arc<TelegramBackend>,
}

impl TelegramStorage {
    /// Resolve the channel for the bot and wire both clients together
    pub async fn new(bot: Client, channel_username: &str, backend: Arc<TelegramBackend>) -> Result<Self> {
        let channel = bot
            .resolve_username(channel_username)
            .await?
            .ok_or_else(|| Error::NotFound(format!("channel @{}", channel_username)))?
            .pack();

        // Fail at startup rather than on the first download
        backend.resolve_channel().await?;

        info!("Using @{} as storage channel", channel_username);
        Ok(TelegramStorage {
            bot,
            channel,
            backend,
        })
    }
}

#[async_trait]
impl StorageChannel for TelegramStorage {
    async fn relay(&self, upload: &Upload) -> Result<StorageId> {
        // Forwarding is not idempotent, so no retries here
        let forwarded = self
            .bot
            .forward_messages(self.channel, &[upload.message_id], upload.chat)
            .await?;

        let message = forwarded.into_iter().next().flatten().ok_or_else(|| {
            Error::TelegramClient("Forwarded message missing from response".to_string())
        })?;

        let id = StorageId::from(message.id());
        debug!("Relayed {} as channel message {}", upload.file_name, id);
        Ok(id)
    }

    async fn fetch(&self, id: StorageId) -> Result<Option<StoredFile>> {
        let Some(message) = self.backend.fetch_message(id).await? else {
            debug!("Message {} not found", id);
            return Ok(None);
        };

        let Some(media) = message.media() else {
            debug!("Message {} has no media", id);
            return Ok(None);
        };

        self.backend.download(media).await
    }

    fn is_connected(&self) -> bool {
        self.backend.is_connected()
    }
}
