//! Upload handling, independent of the Telegram transport

use crate::bot::{format_megabytes, Command};
use crate::error::Error;
use crate::link::LinkBuilder;
use crate::storage::{StorageChannel, Upload};
use crate::telegram::BOT_API_DOWNLOAD_LIMIT;

use std::sync::Arc;
use tracing::{error, info};

/// A message to send back to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Plain text
    Text(String),
    /// Telegram-flavoured markdown
    Markdown(String),
}

impl Reply {
    /// The reply text, whatever its formatting
    pub fn text(&self) -> &str {
        match self {
            Reply::Text(text) | Reply::Markdown(text) => text,
        }
    }
}

/// Turns uploads into download links
pub struct Intake {
    storage: Arc<dyn StorageChannel>,
    links: LinkBuilder,
    /// Port the download gateway listens on, for /status
    port: u16,
}

impl Intake {
    /// Create a new intake
    pub fn new(storage: Arc<dyn StorageChannel>, links: LinkBuilder, port: u16) -> Self {
        Intake {
            storage,
            links,
            port,
        }
    }

    /// Acknowledgement sent as soon as a document arrives
    pub fn processing_notice(&self, upload: &Upload) -> Reply {
        Reply::Text(format!(
            "Processing file: {} ({} MB)...",
            upload.file_name,
            format_megabytes(upload.size)
        ))
    }

    /// Relay an upload and produce the reply carrying its download link
    ///
    /// Failures become a user-facing error reply; they are never retried.
    pub async fn handle_upload(&self, upload: &Upload) -> Reply {
        info!("Received file: {} ({} bytes)", upload.file_name, upload.size);

        match self.accept(upload).await {
            Ok(link) => Reply::Text(format!(
                "Your file has been processed successfully!\n\n\
                 📥 Download link: {}\n\n\
                 This link bypasses the {}MB Telegram limit. \
                 The file will be streamed directly to your device.",
                link,
                BOT_API_DOWNLOAD_LIMIT / (1024 * 1024)
            )),
            Err(e) => {
                error!("Error processing file {}: {}", upload.file_name, e);
                Reply::Text(format!("Error processing your file: {}", e))
            }
        }
    }

    /// Relay an upload into storage and build its download link
    pub async fn accept(&self, upload: &Upload) -> Result<String, Error> {
        let id = self.storage.relay(upload).await?;
        let link = self.links.link(id, &upload.file_name);

        info!("Created download link for message ID: {}", id);
        Ok(link)
    }

    /// Reply for a bot command, or `None` for commands we don't know
    pub fn command_reply(&self, command: &Command) -> Option<Reply> {
        let reply = match command.name.as_str() {
            "start" => Reply::Text(
                "Welcome to the Large File Downloader Bot!\n\n\
                 Send me any file and I'll create a download link that bypasses \
                 Telegram's 50MB limit.\n\n\
                 Use /help to learn more."
                    .to_string(),
            ),
            "help" => Reply::Markdown(
                "*Large File Downloader Bot*\n\n\
                 This bot allows you to download files larger than Telegram's 50MB limit.\n\n\
                 *How to use:*\n\
                 1. Simply send any file to this bot\n\
                 2. The bot will process it and give you a download link\n\
                 3. Use the link to download your file without size restrictions\n\n\
                 *Commands:*\n\
                 /start - Start the bot\n\
                 /help - Show this help message\n\
                 /status - Check the bot's status"
                    .to_string(),
            ),
            "status" => {
                let (mark, state) = if self.storage.is_connected() {
                    ("✅", "connected")
                } else {
                    ("❌", "disconnected")
                };
                Reply::Markdown(format!(
                    "*Bot Status*\n\n\
                     ✅ Bot is online and operational\n\
                     {} Telegram client is {}\n\
                     ✅ Server is running on port {}\n",
                    mark, state, self.port
                ))
            }
            _ => return None,
        };
        Some(reply)
    }
}
