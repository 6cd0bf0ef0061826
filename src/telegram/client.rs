//! Telegram user-session client
//!
//! Uses grammers to talk MTProto as a regular user account. Unlike the Bot
//! API, a user session can download files of any size, which is what lets
//! the gateway serve files past the 50MB bot limit.

use crate::config::TelegramConfig;
use crate::error::{invocation_lost_connection, Error, Result};
use crate::storage::{StorageId, StoredFile};
use crate::telegram::rate_limit::{ExponentialBackoff, RateLimiter};

use bytes::Bytes;
use grammers_client::types::{Downloadable, LoginToken, Media, Message, PasswordToken};
use grammers_client::{Client, Config as ClientConfig, InitParams, SignInError};
use grammers_session::{PackedChat, Session};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Outcome of submitting a login code
pub enum SignIn {
    /// The session is now authorized
    Complete,
    /// The account has two-factor authentication enabled
    PasswordRequired(PasswordToken),
}

/// User session used to read files back out of the storage channel
pub struct TelegramBackend {
    /// Configuration
    config: TelegramConfig,
    /// Where the session is persisted between runs
    session_path: PathBuf,
    /// Live client, once connected
    client: RwLock<Option<Client>>,
    /// Storage channel as seen by this account
    channel: RwLock<Option<PackedChat>>,
    /// Rate limiter for downloads
    download_limiter: RateLimiter,
    /// Whether the last exchange with Telegram got through; shared with
    /// download streams so a mid-transfer drop is noticed
    connected: Arc<AtomicBool>,
    /// Whether we're authorized
    authorized: AtomicBool,
}

impl TelegramBackend {
    /// Create a new Telegram backend
    pub fn new(config: TelegramConfig, session_path: PathBuf) -> Self {
        let download_limiter = RateLimiter::new(
            config.max_concurrent_downloads,
            config.downloads_per_second,
        );

        TelegramBackend {
            config,
            session_path,
            client: RwLock::new(None),
            channel: RwLock::new(None),
            download_limiter,
            connected: Arc::new(AtomicBool::new(false)),
            authorized: AtomicBool::new(false),
        }
    }

    /// Whether the session currently reaches Telegram
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Update the connection state from the outcome of a network call
    fn record<T>(&self, outcome: &Result<T>) {
        match outcome {
            Ok(_) => {
                if !self.connected.swap(true, Ordering::Relaxed) {
                    info!("Telegram connection restored");
                }
            }
            Err(e) if e.is_connection_loss() => {
                if self.connected.swap(false, Ordering::Relaxed) {
                    warn!("Lost connection to Telegram: {}", e);
                }
            }
            Err(_) => {}
        }
    }

    /// Make a cheap request to find out whether the session is alive
    pub async fn ping(&self) -> bool {
        let Ok(client) = self.client().await else {
            self.connected.store(false, Ordering::Relaxed);
            return false;
        };

        let outcome = client.get_me().await.map(|_| ()).map_err(Error::from);
        self.record(&outcome);
        outcome.is_ok()
    }

    /// Ping every `every` until the task is dropped
    ///
    /// Failed downloads mark the session as down; this is what notices it
    /// coming back, since the gateway stops fetching while it is down.
    pub async fn monitor(self: Arc<Self>, every: Duration) {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let alive = self.ping().await;
            debug!("Connection check: {}", if alive { "alive" } else { "down" });
        }
    }

    /// Connect to Telegram, reusing the saved session if there is one
    pub async fn connect(&self) -> Result<()> {
        info!("Connecting to Telegram...");

        if self.config.api_id == 0 || self.config.api_hash.is_empty() {
            return Err(Error::TelegramClient(
                "API ID and hash are required. Get them from my.telegram.org".to_string(),
            ));
        }

        if self.session_path.exists() {
            info!("Loading session from {:?}", self.session_path);
        } else {
            info!("No saved session found, creating new one");
        }
        let session = Session::load_file_or_create(&self.session_path)?;

        let client = Client::connect(ClientConfig {
            session,
            api_id: self.config.api_id,
            api_hash: self.config.api_hash.clone(),
            params: InitParams {
                catch_up: false,
                ..Default::default()
            },
        })
        .await
        .map_err(|e| Error::TelegramClient(format!("Failed to connect: {}", e)))?;

        let authorized = client.is_authorized().await?;
        self.authorized.store(authorized, Ordering::Relaxed);

        *self.client.write().await = Some(client);
        self.connected.store(true, Ordering::Relaxed);

        info!("Connected to Telegram (authorized: {})", authorized);
        Ok(())
    }

    /// Get a handle to the live client
    async fn client(&self) -> Result<Client> {
        self.client
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::TelegramClient("Not connected".to_string()))
    }

    /// Check if authorized
    pub async fn is_authorized(&self) -> Result<bool> {
        Ok(self.authorized.load(Ordering::Relaxed))
    }

    /// Request login code
    pub async fn request_login_code(&self, phone: &str) -> Result<LoginToken> {
        let client = self.client().await?;

        let token = client
            .request_login_code(phone)
            .await
            .map_err(|e| Error::TelegramClient(format!("Failed to request login code: {}", e)))?;

        info!("Login code requested for {}", phone);
        Ok(token)
    }

    /// Sign in with code
    pub async fn sign_in(&self, token: &LoginToken, code: &str) -> Result<SignIn> {
        let client = self.client().await?;

        match client.sign_in(token, code).await {
            Ok(_) => {
                self.authorized.store(true, Ordering::Relaxed);
                info!("Successfully signed in");
                Ok(SignIn::Complete)
            }
            Err(SignInError::PasswordRequired(password_token)) => {
                Ok(SignIn::PasswordRequired(password_token))
            }
            Err(SignInError::InvalidCode) => {
                Err(Error::TelegramClient("Invalid login code".to_string()))
            }
            Err(SignInError::SignUpRequired { .. }) => Err(Error::TelegramClient(
                "Phone number is not registered; sign up with an official app first".to_string(),
            )),
            Err(e) => Err(Error::TelegramClient(format!("Sign in failed: {}", e))),
        }
    }

    /// Finish a two-factor sign in
    pub async fn check_password(&self, token: PasswordToken, password: &str) -> Result<()> {
        let client = self.client().await?;

        client
            .check_password(token, password.as_bytes())
            .await
            .map_err(|e| Error::TelegramClient(format!("Password check failed: {}", e)))?;

        self.authorized.store(true, Ordering::Relaxed);
        info!("Successfully signed in with password");
        Ok(())
    }

    /// Persist the session so the next start skips the login
    pub async fn save_session(&self) -> Result<()> {
        let client = self.client().await?;
        client.session().save_to_file(&self.session_path)?;
        debug!("Session saved to {:?}", self.session_path);
        Ok(())
    }

    /// Resolve the storage channel, caching the result
    pub async fn resolve_channel(&self) -> Result<PackedChat> {
        if let Some(channel) = *self.channel.read().await {
            return Ok(channel);
        }

        let client = self.client().await?;
        let username = self.config.channel.trim().trim_start_matches('@');
        let resolved = client.resolve_username(username).await.map_err(Error::from);
        self.record(&resolved);
        let chat = resolved?
            .ok_or_else(|| Error::NotFound(format!("channel @{}", username)))?;

        let packed = chat.pack();
        *self.channel.write().await = Some(packed);
        debug!("Resolved storage channel @{}", username);
        Ok(packed)
    }

    /// Fetch a message from the storage channel
    ///
    /// Returns `None` if no such message exists.
    pub async fn fetch_message(&self, id: StorageId) -> Result<Option<Message>> {
        let Some(message_id) = id.as_message_id() else {
            return Ok(None);
        };

        let client = self.client().await?;
        let channel = self.resolve_channel().await?;

        let mut backoff = ExponentialBackoff::new(
            self.config.retry_base_delay_ms,
            self.config.retry_attempts,
        );

        loop {
            let outcome = client
                .get_messages_by_id(channel, &[message_id])
                .await
                .map_err(Error::from);
            self.record(&outcome);

            match outcome {
                Ok(messages) => {
                    self.download_limiter
                        .reset_delay(self.config.downloads_per_second);
                    return Ok(messages.into_iter().next().flatten());
                }
                Err(e) if e.is_transient() => {
                    if is_flood_wait(&e) {
                        self.download_limiter.increase_delay(2.0);
                    }
                    if let Some(delay) = backoff.next_delay() {
                        warn!("Message lookup failed, retrying in {:?}: {}", delay, e);
                        tokio::time::sleep(delay).await;
                    } else {
                        error!("Message lookup failed after max retries: {}", e);
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Stream the file attached to a message
    ///
    /// Returns `None` for media that has no downloadable file (polls, contacts, ...).
    pub async fn download(&self, media: Media) -> Result<Option<StoredFile>> {
        let size = match &media {
            Media::Document(document) => u64::try_from(document.size()).ok(),
            Media::Photo(_) => None,
            _ => return Ok(None),
        };

        let client = self.client().await?;
        let permit = self
            .download_limiter
            .acquire_within(Duration::from_secs(self.config.download_queue_timeout_secs))
            .await?;

        let chunk_size = i32::try_from(self.config.download_chunk_size)
            .map_err(|_| Error::InvalidConfig("Download chunk size too large".to_string()))?;
        let download = client
            .iter_download(&Downloadable::Media(media))
            .chunk_size(chunk_size);

        // The permit rides along so the slot stays taken until the stream is dropped
        let connected = self.connected.clone();
        let content = futures::stream::try_unfold(
            (download, permit, connected),
            |(mut download, permit, connected)| async move {
                match download.next().await {
                    Ok(Some(chunk)) => {
                        connected.store(true, Ordering::Relaxed);
                        Ok(Some((Bytes::from(chunk), (download, permit, connected))))
                    }
                    Ok(None) => Ok(None),
                    Err(e) => {
                        if invocation_lost_connection(&e) {
                            connected.store(false, Ordering::Relaxed);
                        }
                        Err(std::io::Error::other(e))
                    }
                }
            },
        );

        Ok(Some(StoredFile {
            size,
            content: Box::pin(content),
        }))
    }

    /// Disconnect from Telegram
    pub async fn disconnect(&self) {
        if self.is_connected() {
            if let Err(e) = self.save_session().await {
                warn!("Failed to save session: {}", e);
            }
        }

        self.client.write().await.take();
        self.connected.store(false, Ordering::Relaxed);
        info!("Disconnected from Telegram");
    }
}

fn is_flood_wait(e: &Error) -> bool {
    matches!(
        e,
        Error::Invocation(grammers_mtsender::InvocationError::Rpc(rpc)) if rpc.name.starts_with("FLOOD_WAIT")
    )
}
