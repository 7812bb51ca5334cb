//! Collabsync CLI
//!
//! Thin wrapper around collabsync-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Show (or create) the identity stored for a channel
//! collabsync identity show --channel standup
//!
//! # Forget it; the next session gets a fresh one
//! collabsync identity reset --channel standup --force
//!
//! # Print the default session configuration
//! collabsync config
//!
//! # Run four peers on one in-process bus for three seconds
//! collabsync simulate --peers 4 --seconds 3
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use collabsync_core::logging::LoggingBuilder;
use collabsync_core::{
    format_relative, Clock, Identity, IdentityStore, LocalBus, MemoryIdentityStore, MessageType,
    RedbIdentityStore, SessionConfig, SessionEngine, SessionHandle, SessionRuntime, SessionView,
    Theme, TokioClock, DEFAULT_CHANNEL,
};
use tracing::info;

/// Collabsync - serverless collaborative sessions
#[derive(Parser)]
#[command(name = "collabsync")]
#[command(version)]
#[command(about = "Collabsync - serverless collaborative sessions")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Data directory (default: ~/.collabsync/data)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Also write JSONL logs under this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stored identity management
    Identity {
        #[command(subcommand)]
        action: IdentityAction,
    },

    /// Print the session configuration as JSON
    Config {
        /// Validate and print this file instead of the defaults
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Run several peers on one in-process bus and report convergence
    Simulate {
        /// Number of peers
        #[arg(short, long, default_value_t = 3)]
        peers: usize,

        /// How long the session runs
        #[arg(short, long, default_value_t = 3)]
        seconds: u64,

        /// Session configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum IdentityAction {
    /// Show the identity for a channel, creating it if needed
    Show {
        #[arg(short, long, default_value = DEFAULT_CHANNEL)]
        channel: String,
    },

    /// Delete the identity for a channel
    Reset {
        #[arg(short, long, default_value = DEFAULT_CHANNEL)]
        channel: String,

        /// Actually delete
        #[arg(long)]
        force: bool,
    },

    /// List channels with a stored identity
    List,
}

fn setup_logging(verbosity: u8, log_dir: Option<&Path>) -> Result<()> {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let mut builder = LoggingBuilder::new("collabsync", filter);
    if let Some(dir) = log_dir {
        builder = builder.with_jsonl(dir);
    }
    if let Some(path) = builder.init().context("failed to set up logging")? {
        info!(path = %path.display(), "Writing JSONL log");
    }
    Ok(())
}

/// Get the default data directory (~/.collabsync/data)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".collabsync")
        .join("data")
}

fn open_store(data_dir: &Path) -> Result<RedbIdentityStore> {
    let path = data_dir.join("identity.redb");
    RedbIdentityStore::open(&path)
        .with_context(|| format!("failed to open identity store at {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.log_dir.as_deref())?;
    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);

    match cli.command {
        Commands::Identity { action } => match action {
            IdentityAction::Show { channel } => {
                let store = open_store(&data_dir)?;
                let (identity, is_new) = Identity::load_or_create(&store, &channel, None, None)?;
                println!("Identity for channel '{}':", channel);
                println!("  ID: {}", identity.peer_id);
                println!("  Name: {}", identity.name);
                println!("  Color: {}", identity.color);
                println!("  Avatar: {}", identity.avatar);
                if is_new {
                    println!();
                    println!("(newly created)");
                }
            }

            IdentityAction::Reset { channel, force } => {
                if !force {
                    println!("This forgets your identity for channel '{}'.", channel);
                    println!("Other peers will see you as a new participant next time.");
                    println!();
                    println!(
                        "To confirm, run: collabsync identity reset --channel {} --force",
                        channel
                    );
                } else {
                    let store = open_store(&data_dir)?;
                    store.clear(&channel)?;
                    println!("Identity for channel '{}' cleared.", channel);
                }
            }

            IdentityAction::List => {
                let store = open_store(&data_dir)?;
                let channels = store.channels()?;
                if channels.is_empty() {
                    println!("No stored identities.");
                } else {
                    println!("Channels ({}):", channels.len());
                    for channel in channels {
                        println!("  {}", channel);
                    }
                }
            }
        },

        Commands::Config { file } => {
            let config = match file {
                Some(path) => SessionConfig::from_json_file(&path)
                    .with_context(|| format!("invalid config {}", path.display()))?,
                None => SessionConfig::default(),
            };
            println!("{}", serde_json::to_string_pretty(&config)?);
        }

        Commands::Simulate {
            peers,
            seconds,
            config,
        } => {
            if peers == 0 {
                anyhow::bail!("need at least one peer");
            }
            let config = match config {
                Some(path) => SessionConfig::from_json_file(&path)
                    .with_context(|| format!("invalid config {}", path.display()))?,
                None => SessionConfig::default(),
            };
            simulate(config, peers, Duration::from_secs(seconds)).await?;
        }
    }

    Ok(())
}

// ============================================================================
// Simulation
// ============================================================================

fn start_peer(
    bus: &LocalBus,
    base: &SessionConfig,
    clock: &Arc<dyn Clock>,
    n: usize,
) -> Result<SessionHandle> {
    let mut config = base.clone();
    config.user_name = Some(format!("Peer {}", n + 1));

    let store: Arc<dyn IdentityStore> = Arc::new(MemoryIdentityStore::new());
    let (identity, is_new) = Identity::load_or_create(
        store.as_ref(),
        &config.channel_name,
        config.user_name.as_deref(),
        config.avatar.as_deref(),
    )?;
    let (handle, receiver) = bus.connect(
        config.bus_channel(),
        identity.peer_id.clone(),
        &MessageType::ALL,
        config.bus.clone(),
        clock.clone(),
    );
    let engine = SessionEngine::from_identity(
        config,
        identity,
        is_new,
        store,
        Arc::new(handle.clone()),
        clock.clone(),
    )?;
    Ok(SessionRuntime::spawn(engine, handle, receiver))
}

/// Staggered joins, one message and one increment per peer, one theme change
async fn simulate(config: SessionConfig, peers: usize, duration: Duration) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
    let bus = LocalBus::new();
    let started = clock.now_ms();

    println!(
        "Simulating {} peer(s) on '{}' for {}s",
        peers,
        config.bus_channel(),
        duration.as_secs()
    );

    let mut handles = Vec::with_capacity(peers);
    for n in 0..peers {
        handles.push(start_peer(&bus, &config, &clock, n)?);
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    for (n, handle) in handles.iter().enumerate() {
        handle.mark_typing(true)?;
        handle
            .send_message(format!("hello from Peer {}", n + 1), None)
            .await?;
        handle.increment_counter().await?;
        // Counter writes are last-writer-wins; let each one reach every peer first
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
    handles[0].set_theme(Theme::Dark)?;

    tokio::time::sleep(duration).await;

    let reachable = handles[0].ping().await;
    let mut views = Vec::with_capacity(peers);
    for handle in &handles {
        views.push(handle.view().await?);
    }

    let now = clock.now_ms();
    for view in &views {
        print_view(view, now);
    }

    println!();
    println!(
        "Peer 1 reached {} of {} other peer(s)",
        reachable.len(),
        peers - 1
    );
    let converged = converged(&views, peers);
    println!("Converged: {}", if converged { "yes" } else { "no" });
    println!("Elapsed: {}ms", now - started);

    for handle in &handles {
        handle.shutdown().await;
    }
    if !converged {
        anyhow::bail!("peers did not converge");
    }
    Ok(())
}

fn print_view(view: &SessionView, now: i64) {
    let me = &view.current_user;
    println!();
    println!("{} {} ({})", me.avatar, me.name, me.id);
    println!("  Status: {}", view.status);
    println!("  Theme: {}", view.theme);
    println!("  Counter: {}", view.counter.value);
    println!("  Peers: {}", view.peers.len());
    for peer in &view.peers {
        println!("    {} {}", peer.avatar, peer.name);
    }
    println!("  Messages: {}", view.messages.len());
    for message in &view.messages {
        println!(
            "    [{}] {}: {}",
            format_relative(message.created_at, now),
            message.author.name,
            message.text
        );
    }
    println!("  Activity: {}", view.activity.len());
    for event in view.activity.iter().take(5) {
        println!("    {} {}", event.actor.name, event.describe());
    }
}

/// Same shared state everywhere and everyone sees everyone else
fn converged(views: &[SessionView], peers: usize) -> bool {
    let Some(first) = views.first() else {
        return true;
    };
    let ids = |view: &SessionView| -> Vec<_> {
        view.messages.iter().map(|m| m.id.clone()).collect()
    };
    views.iter().all(|view| {
        view.peers.len() == peers - 1
            && view.counter == first.counter
            && view.theme == first.theme
            && ids(view) == ids(first)
    })
}
