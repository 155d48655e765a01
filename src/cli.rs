use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use clap::{Parser, Subcommand};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::path::{Path, PathBuf};
use tokio::net::TcpStream;
use tokio::time::{interval, timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::protocol::{ClientMessage, FileTransfer, ServerMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

#[derive(Parser, Debug)]
#[command(name = "dropline")]
#[command(about = "Dropline file-share relay server and debug clients")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect as a receiver: auto-approve requests and save incoming files
    Listen {
        /// Relay server URL
        #[arg(short, long, default_value = "ws://localhost:3000")]
        url: String,

        /// Identifier to register as (generated when omitted)
        #[arg(short = 'i', long)]
        user_id: Option<String>,
    },

    /// Send files to a registered receiver
    Send {
        /// Relay server URL
        #[arg(short, long, default_value = "ws://localhost:3000")]
        url: String,

        /// Identifier to register as (generated when omitted)
        #[arg(short = 'i', long)]
        user_id: Option<String>,

        /// Receiver identifier to request a connection with
        #[arg(short, long)]
        to: String,

        /// Files to transfer
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

/// Unambiguous alphabet used for display identifiers: no 0/O, no 1/I.
const ID_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generate a human-shareable display identifier like `user-K7M2QX`.
pub fn generate_user_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("user-{suffix}")
}

async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    let ws_url = format!("{}/ws", url.trim_end_matches('/'));
    debug!("connecting to {ws_url}");

    let (ws_stream, _) = match timeout(Duration::from_secs(5), connect_async(&ws_url)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => return Err(anyhow!("connection failed: {e}")),
        Err(_) => return Err(anyhow!("connection timeout - is the relay running?")),
    };

    Ok(ws_stream.split())
}

pub async fn run_listen_client(url: String, user_id: Option<String>) -> Result<()> {
    let (mut write, mut read) = connect(&url).await?;

    let user_id = user_id.unwrap_or_else(generate_user_id);
    let register = serde_json::to_string(&ClientMessage::Register {
        user_id: user_id.clone(),
    })?;
    write.send(Message::Text(register.clone().into())).await?;
    println!("listening as {user_id}");

    // Re-register on a timer the same way the browser client does, so the
    // binding stays fresh across server-side churn.
    let mut keepalive = interval(Duration::from_secs(30));
    keepalive.tick().await;

    loop {
        tokio::select! {
            _ = keepalive.tick() => {
                write.send(Message::Text(register.clone().into())).await?;
            }
            frame = read.next() => {
                let Some(frame) = frame else { break };
                let Message::Text(text) = frame? else { continue };
                let Ok(message) = serde_json::from_str::<ServerMessage>(text.as_str()) else {
                    continue;
                };
                match message {
                    ServerMessage::ConnectionRequest {
                        request_id,
                        sender_id,
                        receiver_id,
                        ..
                    } => {
                        println!("approving connection from {sender_id}");
                        let response = ClientMessage::ConnectionResponse {
                            request_id,
                            sender_id,
                            receiver_id,
                            accepted: true,
                        };
                        write
                            .send(Message::Text(serde_json::to_string(&response)?.into()))
                            .await?;
                    }
                    ServerMessage::FileProgress {
                        file_index,
                        progress,
                        ..
                    } => {
                        println!("file {file_index}: {progress}%");
                    }
                    ServerMessage::File { transfer, .. } => {
                        save_transfer(&transfer)?;
                        if transfer.file_index + 1 >= transfer.total_files {
                            break;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    write.send(Message::Close(None)).await?;
    Ok(())
}

pub async fn run_send_client(
    url: String,
    user_id: Option<String>,
    to: String,
    files: Vec<PathBuf>,
) -> Result<()> {
    let (mut write, mut read) = connect(&url).await?;

    let user_id = user_id.unwrap_or_else(generate_user_id);
    let register = serde_json::to_string(&ClientMessage::Register {
        user_id: user_id.clone(),
    })?;
    write.send(Message::Text(register.into())).await?;

    let request = ClientMessage::ConnectionRequest {
        sender_id: user_id.clone(),
        receiver_id: to.clone(),
        timestamp: Utc::now(),
    };
    write
        .send(Message::Text(serde_json::to_string(&request)?.into()))
        .await?;
    println!("waiting for {to} to approve...");

    let accepted = timeout(Duration::from_secs(30), async {
        while let Some(frame) = read.next().await {
            let Message::Text(text) = frame? else { continue };
            let Ok(message) = serde_json::from_str::<ServerMessage>(text.as_str()) else {
                continue;
            };
            match message {
                ServerMessage::ConnectionAccepted { .. } => return Ok::<_, anyhow::Error>(true),
                ServerMessage::ConnectionRejected { reason } => {
                    eprintln!("rejected: {reason}");
                    return Ok(false);
                }
                _ => {}
            }
        }
        Err(anyhow!("connection closed before a response arrived"))
    })
    .await
    .map_err(|_| anyhow!("timed out waiting for {to} to respond"))??;

    if !accepted {
        return Ok(());
    }

    let total_files = files.len() as u32;
    for (index, path) in files.iter().enumerate() {
        let bytes =
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let transfer = FileTransfer {
            sender_id: user_id.clone(),
            receiver_id: to.clone(),
            file_name: display_file_name(path),
            file_type: "application/octet-stream".to_string(),
            file_size: bytes.len() as u64,
            file_data: STANDARD.encode(&bytes),
            file_index: index as u32,
            total_files,
        };
        write
            .send(Message::Text(
                serde_json::to_string(&ClientMessage::File(transfer))?.into(),
            ))
            .await?;
    }

    // Watch the synthetic progress stream until every file completes.
    let mut completed = 0u32;
    while completed < total_files {
        let Some(frame) = read.next().await else { break };
        let Message::Text(text) = frame? else { continue };
        if let Ok(ServerMessage::FileProgress {
            file_index,
            progress,
            ..
        }) = serde_json::from_str(text.as_str())
        {
            println!("file {file_index}: {progress}%");
            if progress == 100 {
                completed += 1;
            }
        }
    }

    write.send(Message::Close(None)).await?;
    Ok(())
}

fn display_file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("file")
        .to_string()
}

fn save_transfer(transfer: &FileTransfer) -> Result<()> {
    // Browser senders strip the data-URL prefix; tolerate one anyway.
    let encoded = transfer
        .file_data
        .rsplit(',')
        .next()
        .unwrap_or(&transfer.file_data);
    let bytes = STANDARD
        .decode(encoded)
        .context("invalid base64 payload")?;

    let name = sanitize_file_name(&transfer.file_name);
    std::fs::write(&name, &bytes).with_context(|| format!("writing {name}"))?;
    println!("saved {name} ({} bytes)", bytes.len());
    Ok(())
}

/// Keep only the final path component so a sender cannot pick the
/// destination directory.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    if base.is_empty() || base == "." || base == ".." {
        "download".to_string()
    } else {
        base.to_string()
    }
}
