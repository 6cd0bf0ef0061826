//! Upload intake bot
//!
//! Users send documents to the bot; each one is relayed into the storage
//! channel and answered with a download link. [`Intake`] holds the logic and
//! works against any [`StorageChannel`](crate::storage::StorageChannel);
//! [`BotRunner`] feeds it Telegram updates.

mod intake;
mod runner;

pub use intake::{Intake, Reply};
pub use runner::{connect_bot, BotRunner};

/// A bot command such as `/help` or `/help@some_bot`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command name without the slash, lowercased
    pub name: String,
    /// Bot username the command was addressed to, if any
    pub via: Option<String>,
}

impl Command {
    /// Whether the command is meant for the bot with the given username
    pub fn is_for(&self, username: Option<&str>) -> bool {
        match (&self.via, username) {
            (None, _) => true,
            (Some(via), Some(me)) => via.eq_ignore_ascii_case(me),
            (Some(_), None) => false,
        }
    }
}

/// Parse the leading command of a message, if it starts with one
pub fn parse_command(text: &str) -> Option<Command> {
    let word = text.trim_start().split_whitespace().next()?;
    let body = word.strip_prefix('/')?;

    let (name, via) = match body.split_once('@') {
        Some((name, via)) => (name, Some(via.to_string())),
        None => (body, None),
    };

    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }

    Some(Command {
        name: name.to_ascii_lowercase(),
        via,
    })
}

/// Format a byte count as megabytes with two decimals
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / (1024.0 * 1024.0))
}
