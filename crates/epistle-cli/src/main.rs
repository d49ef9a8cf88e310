//! Epistle terminal client.
//!
//! # Usage
//!
//! ```bash
//! # Create a private key, prints the public key to register with the server
//! epistle keygen --out key.pem
//!
//! # Join a conversation; lines typed on stdin are sent
//! epistle chat --server https://epistle.example --convo 42 \
//!     --password hunter2 --user-id me --auth 123456 --key key.pem
//! ```
//!
//! Chat commands: `/older` loads history, `/close` and `/open` toggle the
//! background cadence, `/file <path>` sends a file, `/quit` logs out.

mod store;
mod terminal;

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{Parser, Subcommand};
use epistle_app::{
    ActiveConversationController, ControllerConfig, ControllerDeps, ControllerError,
    ControllerHandle,
};
use epistle_client::{
    SystemEnv,
    transport::{HttpConfig, HttpConvoService},
};
use epistle_core::{
    EnglishLocalizer, MemoryPasswordStore, MessageCodec, ServiceError, StaticAuthToken, StoreError,
};
use epistle_crypto::{CryptoError, SealedBoxKey};
use sha2::{Digest, Sha512};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    store::JsonLastSeenStore,
    terminal::{TerminalPlatform, Transcript, format_notification},
};

/// Epistle terminal client
#[derive(Parser, Debug)]
#[command(name = "epistle")]
#[command(about = "End-to-end encrypted conversations in the terminal")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a private key
    Keygen {
        /// Where to write the PEM file
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Open a conversation and chat on stdin
    Chat(ChatArgs),
}

#[derive(clap::Args, Debug)]
struct ChatArgs {
    /// Server base URL
    #[arg(short, long)]
    server: String,

    /// Conversation id
    #[arg(short, long)]
    convo: String,

    /// Conversation password
    #[arg(short, long, env = "EPISTLE_CONVO_PASSWORD")]
    password: String,

    /// Local user id
    #[arg(short, long)]
    user_id: String,

    /// Current auth token
    #[arg(short, long, env = "EPISTLE_AUTH")]
    auth: String,

    /// Private key (PEM)
    #[arg(short, long)]
    key: PathBuf,

    /// State directory for last-seen ids
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Messages per page
    #[arg(long, default_value = "10")]
    page_size: usize,

    /// Poll interval while open, in milliseconds
    #[arg(long, default_value = "300")]
    active_ms: u64,

    /// Poll interval while closed, in milliseconds
    #[arg(long, default_value = "5000")]
    passive_ms: u64,

    /// Never ring the bell
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("key error: {0}")]
    Key(#[from] CryptoError),

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Controller(#[from] ControllerError),

    #[error("cannot read {}: {source}", path.display())]
    Attachment {
        path: PathBuf,
        source: io::Error,
    },

    #[error("no state directory; pass --state-dir")]
    NoStateDir,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    match args.command {
        Command::Keygen { out } => keygen(&out)?,
        Command::Chat(chat_args) => chat(chat_args).await?,
    }
    Ok(())
}

fn keygen(out: &Path) -> Result<(), CliError> {
    let key = SealedBoxKey::generate()?;
    std::fs::write(out, key.to_pem().as_bytes())?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", key.public_key().to_base64())?;
    Ok(())
}

fn password_hash(password: &str) -> String {
    hex::encode(Sha512::digest(password.as_bytes()))
}

fn state_dir(explicit: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    directories::ProjectDirs::from("com", "glitchedpolygons", "epistle")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(CliError::NoStateDir)
}

async fn chat(args: ChatArgs) -> Result<(), CliError> {
    let key = SealedBoxKey::from_pem(&std::fs::read_to_string(&args.key)?)?;
    let http = Arc::new(HttpConvoService::new(&args.server, &HttpConfig::default())?);
    let last_seen = JsonLastSeenStore::open(state_dir(args.state_dir)?.join("last_seen.json"))?;
    tracing::info!(path = %last_seen.path().display(), "last-seen store");

    let passwords = MemoryPasswordStore::new();
    passwords.insert(args.convo.clone(), password_hash(&args.password));

    let deps = ControllerDeps {
        service: Arc::clone(&http) as _,
        sender: http,
        passwords: Arc::new(passwords),
        last_seen: Arc::new(last_seen),
        auth: Arc::new(StaticAuthToken(args.auth)),
        codec: MessageCodec::new(args.user_id, Arc::new(key), Arc::new(EnglishLocalizer)),
        platform: Arc::new(TerminalPlatform { silenced: args.quiet }),
    };
    let config = ControllerConfig {
        page_size: args.page_size,
        active_interval: Duration::from_millis(args.active_ms),
        passive_interval: Duration::from_millis(args.passive_ms),
        ..ControllerConfig::default()
    };

    let handle = ActiveConversationController::spawn(args.convo, deps, SystemEnv::new(), config)?;
    handle.open()?;

    let result = chat_loop(&handle).await;
    handle.shutdown().await;
    result
}

async fn chat_loop(handle: &ControllerHandle) -> Result<(), CliError> {
    let mut views = handle.watch();
    let mut notifications = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut transcript = Transcript::default();

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let view = views.borrow_and_update().clone();
                transcript.render(&view, &mut io::stdout().lock())?;
            },

            Ok(notification) = notifications.recv() => {
                if let Some(line) = format_notification(&notification) {
                    writeln!(io::stdout().lock(), "{line}")?;
                }
            },

            line = lines.next_line() => {
                let Some(line) = line? else { return Ok(()) };
                if !run_line(handle, line.trim()).await? {
                    return Ok(());
                }
            },

            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

/// Execute one input line. Returns false to quit.
///
/// A failed command is printed and the chat goes on. Only a stopped
/// controller ends it.
async fn run_line(handle: &ControllerHandle, line: &str) -> Result<bool, CliError> {
    let result = match line {
        "" => Ok(()),
        "/quit" => return Ok(false),
        "/older" => handle.load_older().map_err(CliError::from),
        "/close" => handle.close().map_err(CliError::from),
        "/open" => handle.open().map_err(CliError::from),
        _ => match line.strip_prefix("/file ") {
            Some(path) => send_file(handle, Path::new(path.trim())).await,
            None => handle.send_text(line).map_err(CliError::from),
        },
    };
    report(result, &mut io::stdout().lock())?;
    Ok(true)
}

async fn send_file(handle: &ControllerHandle, path: &Path) -> Result<(), CliError> {
    let (name, bytes) = read_attachment(path).await?;
    handle.send_file(&name, bytes)?;
    Ok(())
}

async fn read_attachment(path: &Path) -> Result<(String, Vec<u8>), CliError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| CliError::Attachment { path: path.to_path_buf(), source })?;
    let name = path
        .file_name()
        .map_or_else(|| "file".to_string(), |name| name.to_string_lossy().into_owned());
    Ok((name, bytes))
}

fn report(result: Result<(), CliError>, out: &mut impl Write) -> Result<(), CliError> {
    match result {
        Ok(()) => Ok(()),
        Err(e @ CliError::Controller(ControllerError::Stopped)) => Err(e),
        Err(e) => {
            writeln!(out, "-- {e}")?;
            Ok(())
        },
    }
}
