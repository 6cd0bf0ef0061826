//! tgrelay - Large file relay through a Telegram channel
//!
//! Users send files to a bot, which relays them into a storage channel and
//! answers with a download link. The link carries a capability token so it
//! cannot be guessed or altered; the HTTP gateway verifies it and streams the
//! file through a user session, which is not bound by the Bot API size cap.

pub mod bot;
pub mod config;
pub mod crypto;
pub mod error;
pub mod link;
pub mod server;
pub mod storage;
pub mod telegram;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crypto::{CapabilityToken, LinkSecret, TokenError};
    pub use crate::error::{Error, Result};
    pub use crate::link::LinkBuilder;
    pub use crate::storage::{StorageChannel, StorageId};
}
