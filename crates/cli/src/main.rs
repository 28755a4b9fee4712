mod render;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use hackmud_chat::config::{self, Config};
use hackmud_chat::{token, ApiError, ChatToken, Client, Gateway, Message, MessageObserver};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "hackmud-chat")]
#[command(about = "hackmud chat in the terminal", long_about = None)]
struct Cli {
    /// Config file path (default: HACKMUD_CHAT_CONFIG_PATH or <config dir>/hackmud-chat/config.json)
    #[arg(long, short, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Exchange a chat pass (from `chat_pass` in game) for a chat token and print it.
    GetToken {
        /// The chat pass
        pass: String,
    },

    /// Print recent history, then stream new messages until Ctrl-C (the default command).
    Chat,

    /// List the channels your users are in and who is in them.
    Channels,

    /// Send a message to a channel.
    Send {
        /// User to send as
        #[arg(long)]
        from: String,

        /// Channel to send to
        #[arg(long)]
        channel: String,

        message: String,
    },

    /// Tell a message to a user.
    Tell {
        /// User to send as
        #[arg(long)]
        from: String,

        /// Recipient
        #[arg(long)]
        to: String,

        message: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command.unwrap_or(Commands::Chat) {
        Commands::Version => {
            println!("hackmud-chat {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::GetToken { pass } => run_get_token(cli.config, pass).await,
        Commands::Chat => run_chat(cli.config).await,
        Commands::Channels => run_channels(cli.config).await,
        Commands::Send {
            from,
            channel,
            message,
        } => run_send(cli.config, from, channel, message).await,
        Commands::Tell { from, to, message } => run_tell(cli.config, from, to, message).await,
    };

    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run_get_token(config_path: Option<PathBuf>, pass: String) -> anyhow::Result<()> {
    let (config, _) = config::load_config(config_path)?;
    let gateway = Gateway::new(&config.api);
    let token = gateway.get_token(pass.trim()).await?;
    println!("{}", token.as_str());
    Ok(())
}

/// Token from env, config or token file; prompts on stdin when none of them is accepted.
async fn resolve_token(config: &Config, gateway: &Gateway) -> anyhow::Result<ChatToken> {
    let token_path = token::default_token_path();
    let stored = match config::resolve_token(config) {
        Some(t) => Some(t),
        None => token::load_token(&token_path)?,
    };
    if let Some(t) = stored {
        if gateway.is_token_valid(&t).await? {
            return Ok(ChatToken::new(t)?);
        }
        log::warn!("stored chat token is expired or invalid");
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        write!(stdout, "chat token: ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            bail!("no chat token given");
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if gateway.is_token_valid(input).await? {
            let token = ChatToken::new(input)?;
            token::save_token(&token_path, &token)?;
            return Ok(token);
        }
        eprintln!("Expired or invalid token");
    }
}

/// Client on one shared gateway. With `track_users`, an empty `users` config is filled with
/// every user on the account.
async fn connect(config_path: Option<PathBuf>, track_users: bool) -> anyhow::Result<Client> {
    let (config, _) = config::load_config(config_path)?;
    let gateway = Arc::new(Gateway::new(&config.api));
    let token = resolve_token(&config, &gateway).await?;
    if track_users {
        return Client::for_account_with_gateway(gateway, &config, token)
            .await
            .context("listing account users");
    }
    Ok(Client::with_gateway(
        gateway,
        token,
        config.users.clone(),
        config.poll.interval(),
    ))
}

struct Printer;

impl MessageObserver for Printer {
    fn on_messages(&self, messages: &[Message]) {
        for message in messages {
            println!("{}", render::format_message(message));
        }
    }

    fn on_error(&self, error: &ApiError) {
        eprintln!("poll failed: {}", error);
    }
}

async fn run_chat(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let client = connect(config_path, true).await?;
    if client.users().is_empty() {
        bail!("this account has no users");
    }

    let history = client
        .get_messages_before(chrono::Utc::now(), None)
        .await
        .context("fetching recent messages")?;
    Printer.on_messages(&history);

    client.on_messages(Arc::new(Printer));
    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    client.shutdown().await;
    Ok(())
}

async fn run_channels(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let client = connect(config_path, false).await?;
    let data = client.get_channel_data().await?;
    for (user, channels) in &data.users {
        println!("{}: {}", user, channels.join(", "));
    }
    println!();
    for (channel, members) in &data.channels {
        println!("{}: {}", channel, members.join(", "));
    }
    Ok(())
}

async fn run_send(
    config_path: Option<PathBuf>,
    from: String,
    channel: String,
    message: String,
) -> anyhow::Result<()> {
    let client = connect(config_path, false).await?;
    client.send_message(&from, &channel, &message).await?;
    Ok(())
}

async fn run_tell(
    config_path: Option<PathBuf>,
    from: String,
    to: String,
    message: String,
) -> anyhow::Result<()> {
    let client = connect(config_path, false).await?;
    client.tell_message(&from, &to, &message).await?;
    Ok(())
}
