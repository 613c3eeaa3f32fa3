//! Huddle CLI - password-protected chat rooms from the terminal.

use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use uuid::Uuid;

use huddle_client::{
    CapabilityUnavailable, ClientConfig, EffectDispatcher, HapticPattern, Haptics, HttpBackend,
    RoomDirectory, SessionEvent, Unsupported,
};
use huddle_types::{Identity, Message};

#[derive(Parser)]
#[command(name = "huddle")]
#[command(about = "Chat in password-protected rooms")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server base URL (overrides HUDDLE_SERVER_URL)
    #[arg(long, global = true, value_name = "URL")]
    server: Option<String>,

    /// Display name (overrides HUDDLE_DISPLAY_NAME)
    #[arg(long, global = true, value_name = "NAME")]
    name: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a room and join it as owner
    Create {
        /// Room name
        room_name: String,
        #[arg(short, long)]
        password: String,
    },
    /// Join an existing room
    Join {
        room_id: String,
        #[arg(short, long)]
        password: String,
    },
    /// List rooms you belong to
    Rooms,
    /// Leave a room
    Leave { room_id: Uuid },
    /// Open a room and chat interactively (/members, /quit)
    Chat { room_id: Uuid },
}

/// Rings the terminal bell in place of a vibration motor.
struct TerminalBell;

impl Haptics for TerminalBell {
    fn vibrate(&self, pattern: HapticPattern) -> Result<(), CapabilityUnavailable> {
        if matches!(pattern, HapticPattern::Light | HapticPattern::DoorKnock | HapticPattern::Error) {
            let mut stderr = std::io::stderr();
            stderr
                .write_all(b"\x07")
                .and_then(|()| stderr.flush())
                .map_err(|_| CapabilityUnavailable("terminal bell"))?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(server) = cli.server {
        config.server_url = server;
    }
    if let Some(name) = cli.name {
        config.display_name = Some(name);
    }

    let directory = RoomDirectory::new(HttpBackend::new(config.server_url.clone()));

    match cli.command {
        Commands::Create {
            room_name,
            password,
        } => {
            let room = directory.create_room(&identity(&config)?, &room_name, &password).await?;
            println!("Created room \"{}\"", room.name);
            println!("Room ID: {}", room.id);
        }
        Commands::Join { room_id, password } => {
            let room = directory.join_room(&identity(&config)?, &room_id, &password).await?;
            println!("Joined room \"{}\" ({})", room.name, room.id);
        }
        Commands::Rooms => {
            let user_id = config
                .user_id
                .context("HUDDLE_USER_ID is not set; no rooms to list")?;
            let rooms = directory.list_rooms(user_id).await?;
            if rooms.is_empty() {
                println!("No rooms yet. Create one or join with a room ID.");
            }
            for summary in rooms {
                println!(
                    "{}  {:<24} {} member(s)",
                    summary.room.id, summary.room.name, summary.member_count
                );
            }
        }
        Commands::Leave { room_id } => {
            let user_id = config.user_id.context("HUDDLE_USER_ID is not set")?;
            directory.leave_room(room_id, user_id).await?;
            println!("Left room {}", room_id);
        }
        Commands::Chat { room_id } => {
            chat(&directory, &config, identity(&config)?, room_id).await?;
        }
    }

    Ok(())
}

fn identity(config: &ClientConfig) -> anyhow::Result<Identity> {
    let Some(name) = config.display_name.as_deref() else {
        bail!("No display name: pass --name or set HUDDLE_DISPLAY_NAME");
    };
    let identity = config.identity(name);
    if config.user_id.is_none() {
        eprintln!(
            "Using new user id {0}; export HUDDLE_USER_ID={0} to keep it",
            identity.user_id
        );
    }
    Ok(identity)
}

async fn chat(
    directory: &RoomDirectory<HttpBackend>,
    config: &ClientConfig,
    identity: Identity,
    room_id: Uuid,
) -> anyhow::Result<()> {
    let effects = Arc::new(EffectDispatcher::new(Arc::new(TerminalBell), Arc::new(Unsupported)));
    let (session, mut events) =
        directory.open_session(room_id, identity, effects, config.session_options());

    let mut printed: HashSet<Uuid> = HashSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::TimelineReplaced { messages }) => {
                    for message in &messages {
                        print_once(&mut printed, message);
                    }
                }
                Some(SessionEvent::MessageAppended(message)) => print_once(&mut printed, &message),
                Some(SessionEvent::MemberJoined(member)) => {
                    println!("* {} joined", member.display_name);
                }
                Some(SessionEvent::MembersChanged { left, .. }) => {
                    for member in left {
                        println!("* {} left", member.display_name);
                    }
                }
                Some(SessionEvent::NewRemoteMessage(_)) => {}
                None => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match line.trim() {
                    "" => {}
                    "/quit" => break,
                    "/members" => {
                        for member in session.view().await?.members {
                            let owner = if member.is_owner { " (owner)" } else { "" };
                            println!("  {}{}", member.display_name, owner);
                        }
                    }
                    content => {
                        if let Err(e) = session.send(content).await {
                            warn!("Message not sent: {}", e);
                            eprintln!("! not sent: {content}");
                        }
                    }
                }
            }
        }
    }

    session.close();
    Ok(())
}

fn print_once(printed: &mut HashSet<Uuid>, message: &Message) {
    if printed.insert(message.id) {
        println!(
            "[{}] {}: {}",
            message.created_at.format("%H:%M"),
            message.author_display_name,
            message.content
        );
    }
}
