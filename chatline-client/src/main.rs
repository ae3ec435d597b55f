#![cfg_attr(not(test), forbid(unsafe_code))]

//! Command-line client for the Chatline server.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use client::{
    ChatSession, ClientReconciler, ClientResult, HttpChatApi, PushOutcome,
    push::{self, PushReceiver},
    session::forward_controls,
};
use dotenv::dotenv;
use shared::models::{
    ControlEvent, ConversationRef, GroupId, Message, MessageBody, PushEvent, UserId,
};
use tokio::sync::mpsc;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use url::Url;

const CONTROL_QUEUE: usize = 16;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const RECONNECT_DELAY_MAX: Duration = Duration::from_secs(30);

/// Chatline CLI
#[derive(Debug, Parser)]
#[command(name = "chatline")]
#[command(about = "Command-line client for Chatline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Follow a conversation live
    Watch {
        #[command(flatten)]
        connection: Connection,
        #[command(flatten)]
        target: Target,
    },
    /// Send a message
    Send {
        #[command(flatten)]
        connection: Connection,
        #[command(flatten)]
        target: Target,
        /// Message text
        text: String,
    },
    /// List the groups you belong to
    Groups {
        #[command(flatten)]
        connection: Connection,
    },
}

#[derive(Debug, Args)]
struct Connection {
    /// Chatline server base URL
    #[arg(long, default_value = "http://localhost:8080/")]
    server: Url,

    /// Your user id
    #[arg(long)]
    user: UserId,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct Target {
    /// Direct conversation with this user
    #[arg(long)]
    peer: Option<UserId>,

    /// Group conversation
    #[arg(long)]
    group: Option<GroupId>,
}

impl Target {
    fn conversation(&self) -> Result<ConversationRef> {
        match (self.peer, self.group) {
            (Some(peer), None) => Ok(ConversationRef::Direct(peer)),
            (None, Some(group)) => Ok(ConversationRef::Group(group)),
            _ => bail!("pass exactly one of --peer or --group"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Commands::Watch { connection, target } => watch(connection, target.conversation()?).await,
        Commands::Send {
            connection,
            target,
            text,
        } => send(connection, target.conversation()?, text).await,
        Commands::Groups { connection } => groups(connection).await,
    }
}

async fn watch(connection: Connection, conversation: ConversationRef) -> Result<()> {
    let api = Arc::new(HttpChatApi::new(connection.server.clone(), connection.user)?);
    let (controls, mut receiver) = open_push(&connection)
        .await
        .context("failed to open push channel")?;

    let session = ChatSession::new(api, connection.user, controls);
    session.refresh_groups().await.context("failed to load groups")?;
    if let Some(fetch) = session.select(conversation).await? {
        if let Some(err) = fetch.await? {
            return Err(err).context("failed to load history");
        }
    }

    println!("Watching {conversation} (press Ctrl+C to stop)");
    session
        .view(|state| state.messages().iter().for_each(print_message))
        .await;

    loop {
        tokio::select! {
            result = session.pump(receiver, render) => match result {
                Ok(()) => warn!("push channel closed by server"),
                Err(err) => warn!(error = %err, "push channel failed"),
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
        println!("[disconnected, reconnecting]");
        receiver = tokio::select! {
            result = reconnect(&session, &connection) => result?,
            _ = tokio::signal::ctrl_c() => return Ok(()),
        };
    }
}

/// Opens the push channel and starts forwarding control events to it.
async fn open_push(connection: &Connection) -> ClientResult<(mpsc::Sender<ControlEvent>, PushReceiver)> {
    let (sender, receiver) = push::connect(&connection.server, connection.user).await?;
    let (controls, queue) = mpsc::channel(CONTROL_QUEUE);
    tokio::spawn(forward_controls(queue, sender));
    Ok((controls, receiver))
}

/// Retries the push channel with exponential backoff, then restores room
/// membership on it.
async fn reconnect(session: &ChatSession<HttpChatApi>, connection: &Connection) -> Result<PushReceiver> {
    let mut delay = RECONNECT_DELAY;
    loop {
        tokio::time::sleep(delay).await;
        match open_push(connection).await {
            Ok((controls, receiver)) => {
                session
                    .rejoin(controls)
                    .await
                    .context("failed to rejoin rooms")?;
                println!("[reconnected]");
                return Ok(receiver);
            }
            Err(err) => {
                warn!(error = %err, retry_in = ?delay, "reconnect failed");
                delay = (delay * 2).min(RECONNECT_DELAY_MAX);
            }
        }
    }
}

async fn send(connection: Connection, conversation: ConversationRef, text: String) -> Result<()> {
    let api = HttpChatApi::new(connection.server, connection.user)?;
    let message = client::ChatApi::send(&api, conversation, MessageBody::text(text))
        .await
        .context("send rejected")?;
    println!("Sent {} to {conversation}", message.id);
    Ok(())
}

async fn groups(connection: Connection) -> Result<()> {
    let api = HttpChatApi::new(connection.server, connection.user)?;
    let groups = client::ChatApi::list_groups(&api)
        .await
        .context("failed to list groups")?;
    if groups.is_empty() {
        println!("No groups found.");
    }
    for group in groups {
        let role = if group.is_admin(connection.user) { "admin" } else { "member" };
        println!(
            "- {} {} members={} ({role})",
            group.id,
            group.name,
            group.members.len()
        );
    }
    Ok(())
}

fn render(event: &PushEvent, outcome: PushOutcome, state: &ClientReconciler) {
    match (outcome, event) {
        (PushOutcome::Appended, _) => {
            if let Some(message) = state.messages().last() {
                print_message(message);
            }
        }
        (PushOutcome::Replaced, PushEvent::ReactionUpdate(message)) => {
            let reactions = message
                .reactions
                .values()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" ");
            println!("[reactions on {}] {reactions}", message.id);
        }
        (PushOutcome::Replaced, PushEvent::ReadReceiptUpdate(message)) => {
            println!("[{} seen by {}]", message.id, message.read_by.len());
        }
        (PushOutcome::OnlineChanged, _) => {
            println!("[online: {}]", state.online_users().len());
        }
        (PushOutcome::GroupsChanged, _) => {
            let names = state.groups().map(|g| g.name.as_str()).collect::<Vec<_>>();
            println!("[groups: {}]", names.join(", "));
        }
        (PushOutcome::ActiveClosed(group), _) => {
            println!("[group {group} is no longer available]");
        }
        _ => {}
    }
}

fn print_message(message: &Message) {
    let body = match (&message.text, &message.image) {
        (Some(text), Some(image)) => format!("{text} [image {image}]"),
        (Some(text), None) => text.clone(),
        (None, Some(image)) => format!("[image {image}]"),
        (None, None) => String::new(),
    };
    println!(
        "[{}] {}: {body}",
        message.created_at.format("%Y-%m-%d %H:%M:%S"),
        message.sender_id
    );
}
