//! Telegram update loop for the intake bot

use crate::bot::{parse_command, Intake, Reply};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::storage::Upload;

use grammers_client::types::{Chat, Media, Message};
use grammers_client::{Client, Config as ClientConfig, InitParams, InputMessage, Update};
use grammers_session::Session;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Pause after a failed update fetch before trying again
const UPDATE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// File name used when a document arrives without one
const UNNAMED_FILE: &str = "file";

/// Connect the bot account and sign it in with the configured token
pub async fn connect_bot(config: &Config) -> Result<Client> {
    let session_path = config.bot_session_path();
    let session = Session::load_file_or_create(&session_path)?;

    let client = Client::connect(ClientConfig {
        session,
        api_id: config.telegram.api_id,
        api_hash: config.telegram.api_hash.clone(),
        params: InitParams {
            catch_up: false,
            ..Default::default()
        },
    })
    .await
    .map_err(|e| Error::TelegramClient(format!("Failed to connect bot: {}", e)))?;

    if !client.is_authorized().await? {
        info!("Signing in bot...");
        client
            .bot_sign_in(&config.telegram.bot_token)
            .await
            .map_err(|e| Error::TelegramClient(format!("Bot sign in failed: {}", e)))?;
        client.session().save_to_file(&session_path)?;
    }

    Ok(client)
}

impl From<Reply> for InputMessage {
    fn from(reply: Reply) -> Self {
        match reply {
            Reply::Text(text) => InputMessage::text(text),
            Reply::Markdown(text) => InputMessage::markdown(text),
        }
    }
}

/// Receives bot updates and hands them to the intake
pub struct BotRunner {
    client: Client,
    /// Our own username, to ignore commands addressed to other bots
    username: Option<String>,
    intake: Arc<Intake>,
}

impl BotRunner {
    /// Create a runner for a signed-in bot client
    pub async fn new(client: Client, intake: Arc<Intake>) -> Result<Self> {
        let me = client.get_me().await?;
        let username = me.username().map(str::to_string);

        info!("Bot is running as @{}", username.as_deref().unwrap_or("<unknown>"));
        Ok(BotRunner {
            client,
            username,
            intake,
        })
    }

    /// Process updates until the task is dropped
    pub async fn run(self: Arc<Self>) -> Result<()> {
        loop {
            let update = match self.client.next_update().await {
                Ok(update) => update,
                Err(e) => {
                    warn!("Failed to fetch updates: {}", e);
                    tokio::time::sleep(UPDATE_RETRY_DELAY).await;
                    continue;
                }
            };

            let runner = self.clone();
            tokio::spawn(async move {
                if let Err(e) = runner.handle_update(update).await {
                    error!("Error handling update: {}", e);
                }
            });
        }
    }

    async fn handle_update(&self, update: Update) -> Result<()> {
        match update {
            Update::NewMessage(message) => self.handle_message(message).await,
            _ => Ok(()),
        }
    }

    async fn handle_message(&self, message: Message) -> Result<()> {
        if message.outgoing() {
            return Ok(());
        }

        // Only private chats and groups; channel posts include our own relays
        match message.chat() {
            Chat::User(_) | Chat::Group(_) => {}
            _ => return Ok(()),
        }

        if let Some(upload) = upload_from_message(&message) {
            message
                .respond(self.intake.processing_notice(&upload))
                .await?;
            let reply = self.intake.handle_upload(&upload).await;
            message.respond(reply).await?;
            return Ok(());
        }

        let Some(command) = parse_command(message.text()) else {
            return Ok(());
        };

        if !command.is_for(self.username.as_deref()) {
            debug!("Ignoring command for another bot: {:?}", command.via);
            return Ok(());
        }

        if let Some(reply) = self.intake.command_reply(&command) {
            message.respond(reply).await?;
        }
        Ok(())
    }
}

/// Describe the document attached to a message, if there is one
fn upload_from_message(message: &Message) -> Option<Upload> {
    let Some(Media::Document(document)) = message.media() else {
        return None;
    };

    let file_name = match document.name() {
        "" => UNNAMED_FILE.to_string(),
        name => name.to_string(),
    };

    Some(Upload {
        chat: message.chat().pack(),
        message_id: message.id(),
        file_name,
        size: u64::try_from(document.size()).unwrap_or(0),
    })
}
