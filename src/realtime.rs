//! Push channel from the server of record.
//!
//! The server publishes over Socket.IO, so frames on the wire use the
//! Engine.IO v4 text encoding: a one-digit Engine.IO packet type, and for
//! messages (`4`) a Socket.IO packet type followed by a JSON array
//! `["event", payload]`.

use crate::errors::{ClientError, Result};
use crate::models::{flag, optional_flag};
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClipboardUpdate {
    /// A new code was detected on the clipboard.
    ScoreCode {
        score_code: String,
        #[serde(default)]
        exists: bool,
        #[serde(default)]
        completion: Option<u8>,
        #[serde(default, deserialize_with = "optional_flag")]
        is_favorite: Option<bool>,
        #[serde(default)]
        remark: Option<String>,
        #[serde(default, deserialize_with = "optional_flag")]
        has_review: Option<bool>,
    },
    /// A completion was recorded, possibly by another tab.
    Completion {
        score_code: String,
        completion: u8,
        #[serde(default)]
        message: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FavoriteUpdate {
    pub score_code: String,
    #[serde(deserialize_with = "flag")]
    pub is_favorite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemarkPush {
    pub score_code: String,
    #[serde(default)]
    pub remark: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Clipboard(ClipboardUpdate),
    Favorite(FavoriteUpdate),
    Remark(RemarkPush),
}

impl ServerEvent {
    /// Decodes a named event; unknown names yield `Ok(None)`.
    pub fn from_named(name: &str, payload: Value) -> Result<Option<Self>> {
        let event = match name {
            "clipboard_update" => Self::Clipboard(serde_json::from_value(payload)?),
            "favorite_update" => Self::Favorite(serde_json::from_value(payload)?),
            "remark_update" => Self::Remark(serde_json::from_value(payload)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn score_code(&self) -> &str {
        match self {
            Self::Clipboard(ClipboardUpdate::ScoreCode { score_code, .. })
            | Self::Clipboard(ClipboardUpdate::Completion { score_code, .. })
            | Self::Favorite(FavoriteUpdate { score_code, .. })
            | Self::Remark(RemarkPush { score_code, .. }) => score_code,
        }
    }
}

/// What applying a push event to a local cache requires from the host, in
/// increasing cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SyncAction {
    None,
    Rerender,
    Refetch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Open { ping_interval: Duration },
    Ping,
    Pong,
    Close,
    Connected,
    Disconnected,
    Event { name: String, payload: Value },
    Other,
}

pub const PONG: &str = "3";
pub const CONNECT: &str = "40";

pub fn decode_frame(text: &str) -> Result<Frame> {
    let mut chars = text.chars();
    let Some(kind) = chars.next() else {
        return Ok(Frame::Other);
    };
    let rest = chars.as_str();

    let frame = match kind {
        '0' => {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct Handshake {
                #[serde(default = "default_ping_interval")]
                ping_interval: u64,
            }
            let handshake: Handshake = serde_json::from_str(rest)?;
            Frame::Open {
                ping_interval: Duration::from_millis(handshake.ping_interval),
            }
        }
        '1' => Frame::Close,
        '2' => Frame::Ping,
        '3' => Frame::Pong,
        '4' => decode_socket_packet(rest)?,
        _ => Frame::Other,
    };
    Ok(frame)
}

fn default_ping_interval() -> u64 {
    25_000
}

fn decode_socket_packet(packet: &str) -> Result<Frame> {
    let mut chars = packet.chars();
    let Some(kind) = chars.next() else {
        return Ok(Frame::Other);
    };
    let body = chars.as_str();

    match kind {
        '0' => Ok(Frame::Connected),
        '1' => Ok(Frame::Disconnected),
        '2' => {
            // Optional "/namespace," prefix and ack id precede the array.
            let start = body
                .find('[')
                .ok_or_else(|| ClientError::Realtime(format!("malformed event: {packet}")))?;
            let mut items: Vec<Value> = serde_json::from_str(&body[start..])?;
            if items.is_empty() {
                return Err(ClientError::Realtime(format!("event without name: {packet}")));
            }
            let name = match items.remove(0) {
                Value::String(name) => name,
                other => {
                    return Err(ClientError::Realtime(format!("event name not a string: {other}")));
                }
            };
            let payload = items.into_iter().next().unwrap_or(Value::Null);
            Ok(Frame::Event { name, payload })
        }
        _ => Ok(Frame::Other),
    }
}

/// `http(s)://host/...` to the Socket.IO websocket endpoint.
pub fn socket_url(base: &Url) -> Result<Url> {
    let mut url = base.clone();
    let scheme = match base.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::Realtime(format!("cannot derive websocket URL from {base}")))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| ClientError::Realtime(format!("cannot derive websocket URL from {base}")))?;
        path.pop_if_empty();
        path.push("socket.io");
        path.push("");
    }
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}

const RECONNECT_MIN: Duration = Duration::from_millis(500);
const RECONNECT_MAX: Duration = Duration::from_secs(10);

/// Spawns a task that keeps the channel open and forwards events until the
/// receiver is dropped. Delivery is best-effort: events missed while the
/// socket is down are not replayed, so consumers must tolerate gaps.
pub fn subscribe(base: &Url) -> Result<mpsc::UnboundedReceiver<ServerEvent>> {
    let url = socket_url(base)?;
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut backoff = RECONNECT_MIN;
        loop {
            match run_session(&url, &tx).await {
                Ok(()) => backoff = RECONNECT_MIN,
                Err(err) => warn!("realtime session ended: {err}"),
            }
            if tx.is_closed() {
                debug!("realtime subscriber dropped, stopping");
                return;
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(RECONNECT_MAX);
        }
    });

    Ok(rx)
}

async fn run_session(url: &Url, tx: &mpsc::UnboundedSender<ServerEvent>) -> Result<()> {
    let (ws, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
    let (mut write, mut read) = ws.split();
    info!("realtime channel connected to {url}");

    while let Some(message) = read.next().await {
        let text = match message? {
            Message::Text(text) => text,
            Message::Close(frame) => {
                debug!("realtime channel closed: {frame:?}");
                return Ok(());
            }
            _ => continue,
        };

        match decode_frame(text.as_str()) {
            Ok(Frame::Open { ping_interval }) => {
                debug!(?ping_interval, "engine.io handshake");
                write.send(Message::Text(CONNECT.into())).await?;
            }
            Ok(Frame::Ping) => write.send(Message::Text(PONG.into())).await?,
            Ok(Frame::Close) | Ok(Frame::Disconnected) => return Ok(()),
            Ok(Frame::Event { name, payload }) => match ServerEvent::from_named(&name, payload) {
                Ok(Some(event)) => {
                    if tx.send(event).is_err() {
                        return Ok(());
                    }
                }
                Ok(None) => debug!("ignoring realtime event {name}"),
                Err(err) => warn!("dropping malformed {name} payload: {err}"),
            },
            Ok(_) => {}
            Err(err) => warn!("undecodable realtime frame: {err}"),
        }
    }

    Ok(())
}
