//! Telegram backend module
//!
//! Handles all communication with Telegram's API including:
//! - User session authentication and persistence
//! - Relaying uploads into the storage channel
//! - Streaming stored files back out
//! - Rate limiting and retry logic

mod channel;
mod client;
mod rate_limit;

pub use channel::TelegramStorage;
pub use client::{SignIn, TelegramBackend};
pub use rate_limit::{ExponentialBackoff, RateLimitGuard, RateLimiter};

/// Largest file a bot may download through the Bot API
pub const BOT_API_DOWNLOAD_LIMIT: u64 = 50 * 1024 * 1024;
