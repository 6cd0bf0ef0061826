//! tgrelay - Large file relay through a Telegram channel
//!
//! Usage:
//!   tgrelay init ...                 - Write a configuration file
//!   tgrelay auth                     - Sign in the storage user session
//!   tgrelay serve                    - Run the bot and the download server
//!   tgrelay status                   - Show configuration and session state
//!   tgrelay link <id> <file name>    - Issue a link for a stored message
//!   tgrelay gen-secret               - Print a fresh link secret

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tgrelay::{
    bot::{connect_bot, BotRunner, Intake},
    config::Config,
    crypto::generate_secret,
    link::LinkBuilder,
    server::{self, AppState},
    storage::{StorageChannel, StorageId},
    telegram::{SignIn, TelegramBackend, TelegramStorage},
    Error, Result,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "tgrelay")]
#[command(author = "tgrelay Contributors")]
#[command(version)]
#[command(about = "Relay large files through a Telegram channel behind tamper-evident links")]
struct Cli {
    /// Configuration file path (environment variables are used if it doesn't exist)
    #[arg(short, long, default_value = "~/.config/tgrelay/config.json")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a new configuration file
    Init {
        /// Telegram API ID (from my.telegram.org)
        #[arg(long)]
        api_id: i32,

        /// Telegram API hash
        #[arg(long)]
        api_hash: String,

        /// Bot token from @BotFather
        #[arg(long)]
        bot_token: String,

        /// Storage channel username
        #[arg(long)]
        channel: String,

        /// Phone number of the storage account
        #[arg(long)]
        phone: Option<String>,

        /// Link secret (generated if omitted)
        #[arg(long)]
        secret: Option<String>,
    },

    /// Sign in the user session that reads from the storage channel
    Auth {
        /// Phone number (defaults to the configured one)
        #[arg(long)]
        phone: Option<String>,
    },

    /// Run the intake bot and the download server
    Serve,

    /// Show configuration and session state
    Status,

    /// Issue a download link for a message already in the storage channel
    Link {
        /// Channel message ID
        id: u64,

        /// File name to present to the downloader
        file_name: String,
    },

    /// Print a fresh random link secret
    GenSecret,
}

fn main() {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set up logging: {}", e);
    }

    // Expand ~ in config path
    let config_path = expand_tilde(&cli.config);

    if let Err(e) = run_command(cli.command, &config_path) {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_command(command: Commands, config_path: &Path) -> Result<()> {
    match command {
        Commands::Init {
            api_id,
            api_hash,
            bot_token,
            channel,
            phone,
            secret,
        } => cmd_init(config_path, api_id, api_hash, bot_token, channel, phone, secret),

        Commands::Auth { phone } => cmd_auth(config_path, phone),

        Commands::Serve => cmd_serve(config_path),

        Commands::Status => cmd_status(config_path),

        Commands::Link { id, file_name } => cmd_link(config_path, id, &file_name),

        Commands::GenSecret => {
            println!("{}", generate_secret());
            Ok(())
        }
    }
}

/// Load the config file, or fall back to environment variables if there is none
fn load_config(config_path: &Path) -> Result<Config> {
    if config_path.exists() {
        Config::load(config_path)
    } else {
        info!("No config file at {:?}, using environment variables", config_path);
        Config::from_env()
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| Error::Internal(e.to_string()))
}

fn cmd_init(
    config_path: &Path,
    api_id: i32,
    api_hash: String,
    bot_token: String,
    channel: String,
    phone: Option<String>,
    secret: Option<String>,
) -> Result<()> {
    info!("Initializing tgrelay...");

    let mut config = Config::default();
    config.telegram.api_id = api_id;
    config.telegram.api_hash = api_hash;
    config.telegram.bot_token = bot_token;
    config.telegram.channel = channel;
    config.telegram.phone = phone;
    config.links.secret = secret.unwrap_or_else(generate_secret);
    config.validate()?;

    // Ensure config directory exists
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    config.save(config_path)?;
    config.ensure_directories()?;

    info!("Configuration saved to {:?}", config_path);
    info!("Data directory: {:?}", config.data_dir);
    info!("");
    info!("Next steps:");
    info!("  1. Add the bot as an admin of @{}", config.channel_username());
    info!("  2. Run 'tgrelay auth' to sign in the storage account");
    info!("  3. Run 'tgrelay serve'");

    Ok(())
}

fn cmd_auth(config_path: &Path, phone: Option<String>) -> Result<()> {
    let config = load_config(config_path)?;
    config.ensure_directories()?;

    let phone = phone
        .or_else(|| config.telegram.phone.clone())
        .ok_or_else(|| Error::InvalidConfig("Phone number is required (--phone)".to_string()))?;

    info!("Authenticating with Telegram...");

    runtime()?.block_on(async {
        let backend = TelegramBackend::new(config.telegram.clone(), config.session_path());
        backend.connect().await?;

        if backend.is_authorized().await? {
            info!("Already authenticated!");
            backend.disconnect().await;
            return Ok(());
        }

        let token = backend.request_login_code(&phone).await?;
        info!("Login code sent to {}", phone);

        let code = prompt("Please enter the code you received: ")?;

        if let SignIn::PasswordRequired(password_token) = backend.sign_in(&token, code.trim()).await? {
            let hint = password_token.hint().unwrap_or("none").to_string();
            let password = rpassword::prompt_password(format!("Enter your 2FA password (hint: {}): ", hint))?;
            backend.check_password(password_token, &password).await?;
        }

        backend.save_session().await?;
        info!("Successfully authenticated! Session saved to {:?}", config.session_path());

        backend.disconnect().await;
        Ok(())
    })
}

fn cmd_serve(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    config.ensure_directories()?;

    runtime()?.block_on(async {
        info!("Initializing Telegram client...");
        let backend = Arc::new(TelegramBackend::new(
            config.telegram.clone(),
            config.session_path(),
        ));
        backend.connect().await?;
        if !backend.is_authorized().await? {
            return Err(Error::TelegramAuthRequired);
        }
        backend.save_session().await?;
        info!("Telegram client connected successfully");

        let bot = connect_bot(&config).await?;
        let storage: Arc<dyn StorageChannel> = Arc::new(
            TelegramStorage::new(bot.clone(), config.channel_username(), backend.clone()).await?,
        );

        let links = LinkBuilder::new(config.public_base_url(), config.link_secret());
        let intake = Arc::new(Intake::new(storage.clone(), links, config.server.port));
        let runner = Arc::new(BotRunner::new(bot, intake).await?);
        let state = AppState::new(storage, config.link_secret());

        info!("Links will point at {}", config.public_base_url());

        let monitor = tokio::spawn(backend.clone().monitor(Duration::from_secs(
            config.telegram.connection_check_secs,
        )));

        let result = tokio::select! {
            result = runner.run() => result,
            result = server::serve(&config.server, state, shutdown_signal()) => result,
        };

        monitor.abort();
        backend.disconnect().await;
        result
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down");
}

fn cmd_status(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    println!("tgrelay Status");
    println!("==============");
    println!();
    println!("Configuration: {:?}", config_path);
    println!("Data directory: {:?}", config.data_dir);
    println!("Storage channel: @{}", config.channel_username());
    println!("Listening on: {}:{}", config.server.bind, config.server.port);
    println!("Link base URL: {}", config.public_base_url());
    println!("Max concurrent downloads: {}", config.telegram.max_concurrent_downloads);

    runtime()?.block_on(async {
        let backend = TelegramBackend::new(config.telegram.clone(), config.session_path());
        match backend.connect().await {
            Ok(_) => {
                if backend.is_authorized().await.unwrap_or(false) {
                    println!("Telegram: connected and authorized");
                } else {
                    println!("Telegram: connected but NOT authorized (run 'tgrelay auth')");
                }
                backend.disconnect().await;
            }
            Err(e) => {
                println!("Telegram: connection failed - {}", e);
            }
        }
        Ok::<_, Error>(())
    })?;

    Ok(())
}

fn cmd_link(config_path: &Path, id: u64, file_name: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let links = LinkBuilder::new(config.public_base_url(), config.link_secret());

    println!("{}", links.link(StorageId::new(id), file_name));
    Ok(())
}

/// Read one line from stdin after printing a prompt
fn prompt(message: &str) -> Result<String> {
    use std::io::Write;

    print!("{}", message);
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line)
}

/// Expand ~ to home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
