//! Configuration management for tgrelay

use crate::crypto::LinkSecret;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3000;

/// Default MTProto download request size: 512 KiB (the maximum Telegram allows)
pub const DEFAULT_DOWNLOAD_CHUNK_SIZE: usize = 512 * 1024;

/// Download request sizes must be a multiple of this
const DOWNLOAD_CHUNK_ALIGN: usize = 4096;

/// Main configuration structure
///
/// Every section falls back to its defaults, so a config file only needs
/// the fields it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Telegram API configuration
    pub telegram: TelegramConfig,

    /// HTTP server configuration
    pub server: ServerConfig,

    /// Download link configuration
    pub links: LinkConfig,

    /// Path to the data directory
    pub data_dir: PathBuf,
}

/// Telegram API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Telegram API ID (get from my.telegram.org)
    pub api_id: i32,

    /// Telegram API hash
    pub api_hash: String,

    /// Phone number of the storage account
    pub phone: Option<String>,

    /// User session file (relative paths live under the data directory)
    pub session_file: PathBuf,

    /// Bot token from @BotFather
    pub bot_token: String,

    /// Bot session file (relative paths live under the data directory)
    pub bot_session_file: PathBuf,

    /// Username of the storage channel, e.g. "@my_storage"
    pub channel: String,

    /// Maximum concurrent downloads from the storage channel
    pub max_concurrent_downloads: usize,

    /// Target download starts per second (0 = unlimited)
    pub downloads_per_second: f64,

    /// Retry attempts for failed lookups
    pub retry_attempts: u32,

    /// Base delay for exponential backoff (ms)
    pub retry_base_delay_ms: u64,

    /// Bytes requested per MTProto download call
    pub download_chunk_size: usize,

    /// How long a download request may wait for a free slot (seconds)
    pub download_queue_timeout_secs: u64,

    /// Interval between session liveness checks while serving (seconds)
    pub connection_check_secs: u64,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind: String,

    /// Host name used in links when `public_url` is unset
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Externally reachable base URL for download links
    pub public_url: Option<String>,
}

/// Download link configuration
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Secret keying every download token; changing it breaks all issued links
    pub secret: String,
}

impl std::fmt::Debug for LinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkConfig")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tgrelay");

        Config {
            telegram: TelegramConfig::default(),
            server: ServerConfig::default(),
            links: LinkConfig::default(),
            data_dir,
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        TelegramConfig {
            api_id: 0,
            api_hash: String::new(),
            phone: None,
            session_file: PathBuf::from("user.session"),
            bot_token: String::new(),
            bot_session_file: PathBuf::from("bot.session"),
            channel: String::new(),
            max_concurrent_downloads: 8,
            downloads_per_second: 5.0,
            retry_attempts: 3,
            retry_base_delay_ms: 1000,
            download_chunk_size: DEFAULT_DOWNLOAD_CHUNK_SIZE,
            download_queue_timeout_secs: 30,
            connection_check_secs: 30,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0".to_string(),
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            public_url: None,
        }
    }
}

impl Config {
    /// Load configuration from a file, with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// Load configuration from a file, taking overrides from `lookup`
    pub fn load_with<P, F>(path: P, lookup: F) -> Result<Self>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!("Failed to read config file: {}", e))
        })?;

        let mut config: Config = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config file: {}", e))
        })?;

        config.apply_overrides(lookup);

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    ///
    /// Later names in each list win, so `API_ID` beats `TELEGRAM_APP_ID`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| lookup(name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .last()
        };

        // Telegram credentials
        if let Some(id) = var(&["TELEGRAM_APP_ID", "API_ID"]).and_then(|v| v.parse::<i32>().ok()) {
            self.telegram.api_id = id;
        }
        if let Some(hash) = var(&["TELEGRAM_APP_HASH", "API_HASH"]) {
            self.telegram.api_hash = hash;
        }
        if let Some(phone) = var(&["TELEGRAM_PHONE", "PHONE_NUMBER"]) {
            self.telegram.phone = Some(phone);
        }
        if let Some(token) = var(&["BOT_TOKEN"]) {
            self.telegram.bot_token = token;
        }
        if let Some(channel) = var(&["CHANNEL_USERNAME"]) {
            self.telegram.channel = channel;
        }

        // Server settings
        if let Some(bind) = var(&["BIND_ADDRESS"]) {
            self.server.bind = bind;
        }
        if let Some(host) = var(&["HOST"]) {
            self.server.host = host;
        }
        if let Some(port) = var(&["PORT"]).and_then(|v| v.parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Some(url) = var(&["PUBLIC_URL"]) {
            self.server.public_url = Some(url);
        }

        // Link secret
        if let Some(secret) = var(&["LINK_SECRET"]) {
            self.links.secret = secret;
        }
    }

    /// Create a new config from environment variables only (no config file)
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            Error::Config(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path.as_ref(), content).map_err(|e| {
            Error::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.telegram.api_id == 0 {
            return Err(Error::InvalidConfig(
                "Telegram API ID is required (API_ID)".to_string(),
            ));
        }

        if self.telegram.api_hash.is_empty() {
            return Err(Error::InvalidConfig(
                "Telegram API hash is required (API_HASH)".to_string(),
            ));
        }

        if self.telegram.bot_token.is_empty() {
            return Err(Error::InvalidConfig(
                "Bot token is required (BOT_TOKEN)".to_string(),
            ));
        }

        if self.channel_username().is_empty() {
            return Err(Error::InvalidConfig(
                "Storage channel username is required (CHANNEL_USERNAME)".to_string(),
            ));
        }

        if self.links.secret.is_empty() {
            return Err(Error::InvalidConfig(
                "Link secret is required (LINK_SECRET); see 'tgrelay gen-secret'".to_string(),
            ));
        }

        let chunk = self.telegram.download_chunk_size;
        if chunk == 0 || chunk % DOWNLOAD_CHUNK_ALIGN != 0 || chunk > DEFAULT_DOWNLOAD_CHUNK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "Download chunk size must be a non-zero multiple of {} up to {} bytes",
                DOWNLOAD_CHUNK_ALIGN, DEFAULT_DOWNLOAD_CHUNK_SIZE
            )));
        }

        if self.telegram.max_concurrent_downloads == 0 {
            return Err(Error::InvalidConfig(
                "Maximum concurrent downloads must be greater than 0".to_string(),
            ));
        }

        if self.telegram.connection_check_secs == 0 {
            return Err(Error::InvalidConfig(
                "Connection check interval must be greater than 0".to_string(),
            ));
        }

        if let Some(public_url) = &self.server.public_url {
            let url = url::Url::parse(public_url).map_err(|e| {
                Error::InvalidConfig(format!("Invalid public URL '{}': {}", public_url, e))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(Error::InvalidConfig(format!(
                    "Public URL must be http or https, got '{}'",
                    url.scheme()
                )));
            }
        }

        Ok(())
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    /// Base URL that download links start with, without a trailing slash
    pub fn public_base_url(&self) -> String {
        match &self.server.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.server.host, self.server.port),
        }
    }

    /// Storage channel username without the leading '@'
    pub fn channel_username(&self) -> &str {
        self.telegram.channel.trim().trim_start_matches('@')
    }

    /// Resolved path of the user session file
    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join(&self.telegram.session_file)
    }

    /// Resolved path of the bot session file
    pub fn bot_session_path(&self) -> PathBuf {
        self.data_dir.join(&self.telegram.bot_session_file)
    }

    /// The link secret as key material
    pub fn link_secret(&self) -> LinkSecret {
        LinkSecret::new(self.links.secret.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.telegram.api_id = 12345;
        config.telegram.api_hash = "abcdef".to_string();
        config.telegram.bot_token = "123:token".to_string();
        config.telegram.channel = "@storage".to_string();
        config.links.secret = "s3cr3t".to_string();
        config
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_is_invalid() {
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn test_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_missing_secret_rejected() {
        let mut config = valid_config();
        config.links.secret.clear();

        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_channel_rejected() {
        let mut config = valid_config();
        config.telegram.channel = "@".to_string();

        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_chunk_size_rules() {
        let mut config = valid_config();

        config.telegram.download_chunk_size = 128 * 1024;
        assert!(config.validate().is_ok());

        config.telegram.download_chunk_size = 1000;
        assert!(config.validate().is_err());

        config.telegram.download_chunk_size = 1024 * 1024;
        assert!(config.validate().is_err());

        config.telegram.download_chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connection_check_interval_required() {
        let mut config = valid_config();
        config.telegram.connection_check_secs = 0;

        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_public_url_validation() {
        let mut config = valid_config();

        config.server.public_url = Some("https://files.example.com/".to_string());
        assert!(config.validate().is_ok());

        config.server.public_url = Some("not a url".to_string());
        assert!(config.validate().is_err());

        config.server.public_url = Some("ftp://files.example.com".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_public_base_url() {
        let mut config = valid_config();
        config.server.host = "example.org".to_string();
        config.server.port = 8080;
        assert_eq!(config.public_base_url(), "http://example.org:8080");

        config.server.public_url = Some("https://dl.example.org/".to_string());
        assert_eq!(config.public_base_url(), "https://dl.example.org");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(env(&[
            ("API_ID", "777"),
            ("API_HASH", " hash "),
            ("PHONE_NUMBER", "+10000000000"),
            ("BOT_TOKEN", "1:abc"),
            ("CHANNEL_USERNAME", "@files"),
            ("BIND_ADDRESS", "127.0.0.1"),
            ("HOST", "files.example.org"),
            ("PORT", "8081"),
            ("LINK_SECRET", "topsecret"),
        ]));

        assert_eq!(config.telegram.api_id, 777);
        assert_eq!(config.telegram.api_hash, "hash");
        assert_eq!(config.telegram.phone.as_deref(), Some("+10000000000"));
        assert_eq!(config.telegram.bot_token, "1:abc");
        assert_eq!(config.channel_username(), "files");
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.server.host, "files.example.org");
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.links.secret, "topsecret");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_override_precedence_and_garbage() {
        let mut config = valid_config();
        config.apply_overrides(env(&[
            ("TELEGRAM_APP_ID", "1"),
            ("API_ID", "2"),
            ("PORT", "not-a-port"),
            ("LINK_SECRET", "   "),
        ]));

        assert_eq!(config.telegram.api_id, 2);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.links.secret, "s3cr3t");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = valid_config();
        config.data_dir = dir.path().to_path_buf();
        config.save(&path).unwrap();

        let loaded = Config::load_with(&path, |_| None).unwrap();
        assert_eq!(loaded.telegram.api_id, config.telegram.api_id);
        assert_eq!(loaded.telegram.channel, config.telegram.channel);
        assert_eq!(loaded.session_path(), dir.path().join("user.session"));
    }

    #[test]
    fn test_load_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            Config::load_with(&path, |_| None),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::load_with(dir.path().join("missing.json"), |_| None),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_load_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "telegram": { "api_id": 12345, "api_hash": "abcdef", "bot_token": "1:abc", "channel": "@storage" },
                "links": { "secret": "s3cr3t" }
            }"#,
        )
        .unwrap();

        let loaded = Config::load_with(&path, |_| None).unwrap();
        assert_eq!(loaded.telegram.bot_session_file, PathBuf::from("bot.session"));
        assert_eq!(loaded.telegram.max_concurrent_downloads, 8);
        assert_eq!(loaded.server.port, DEFAULT_PORT);
        assert_eq!(loaded.server.bind, "0.0.0.0");
        assert!(loaded.data_dir.ends_with("tgrelay"));
    }

    #[test]
    fn test_load_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        valid_config().save(&path).unwrap();

        let loaded = Config::load_with(&path, env(&[("PORT", "9000")])).unwrap();
        assert_eq!(loaded.server.port, 9000);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", valid_config());
        assert!(!rendered.contains("s3cr3t"));
    }
}
