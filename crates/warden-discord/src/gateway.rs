//! Gateway websocket session: identify, heartbeat, and dispatch
//! normalization into the small set of events Warden reacts to.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tracing::debug;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

use crate::types::Interaction;

/// Guild structure and member join/leave events.
pub const INTENT_GUILDS: u64 = 1 << 0;
pub const INTENT_GUILD_MEMBERS: u64 = 1 << 1;

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_PRESENCE_UPDATE: u8 = 3;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

pub const ACTIVITY_PLAYING: u8 = 0;
pub const ACTIVITY_LISTENING: u8 = 2;
pub const ACTIVITY_WATCHING: u8 = 3;

#[derive(Debug, Clone, Deserialize)]
struct GatewayFrame {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

/// Normalized gateway dispatches the runtime consumes. Everything else is
/// skipped at the session boundary.
#[derive(Debug)]
pub enum GatewayEvent {
    Ready {
        session_id: String,
        application_id: String,
    },
    InteractionCreate(Box<Interaction>),
    GuildMemberAdd {
        guild_id: String,
    },
    GuildMemberRemove {
        guild_id: String,
    },
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

pub struct GatewaySession {
    sink: WsSink,
    source: WsSource,
    heartbeat: tokio::time::Interval,
    last_seq: Option<u64>,
}

impl GatewaySession {
    /// Connects, consumes the hello frame, and sends the identify payload.
    pub async fn connect(gateway_url: &str, bot_token: &str, intents: u64) -> Result<Self> {
        let url = format!("{}/?v=10&encoding=json", gateway_url.trim_end_matches('/'));
        let (stream, _response) = connect_async(&url)
            .await
            .with_context(|| format!("failed to connect discord gateway at {url}"))?;
        let (mut sink, mut source) = stream.split();

        let hello = loop {
            let Some(message) = source.next().await else {
                bail!("discord gateway closed before hello");
            };
            let message = message.context("failed reading discord gateway hello")?;
            if let Some(frame) = parse_gateway_frame(message)? {
                break frame;
            }
        };
        if hello.op != OP_HELLO {
            bail!("expected gateway hello, got op {}", hello.op);
        }
        let heartbeat_interval_ms = hello.d["heartbeat_interval"]
            .as_u64()
            .context("gateway hello missing heartbeat_interval")?;

        let identify = json!({
            "op": 2,
            "d": {
                "token": bot_token,
                "intents": intents,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "warden",
                    "device": "warden",
                },
            },
        });
        sink.send(WsMessage::Text(identify.to_string().into()))
            .await
            .context("failed to send discord gateway identify")?;

        debug!(heartbeat_interval_ms, "gateway session identified");
        let mut heartbeat =
            tokio::time::interval(Duration::from_millis(heartbeat_interval_ms.max(1_000)));
        // First tick fires immediately; consume it so the first heartbeat
        // goes out a full interval after identify.
        heartbeat.tick().await;

        Ok(Self {
            sink,
            source,
            heartbeat,
            last_seq: None,
        })
    }

    /// Returns the next normalized event, driving heartbeats in between.
    /// `Ok(None)` means the socket closed and the caller should reconnect.
    pub async fn next_event(&mut self) -> Result<Option<GatewayEvent>> {
        loop {
            tokio::select! {
                _ = self.heartbeat.tick() => {
                    self.send_heartbeat().await?;
                }
                maybe_message = self.source.next() => {
                    let Some(message_result) = maybe_message else {
                        return Ok(None);
                    };
                    let message = message_result.context("failed reading discord gateway message")?;
                    let Some(frame) = parse_gateway_frame(message)? else {
                        continue;
                    };
                    if let Some(seq) = frame.s {
                        self.last_seq = Some(seq);
                    }
                    match frame.op {
                        OP_DISPATCH => {
                            if let Some(event) = normalize_dispatch(frame.t.as_deref(), frame.d)? {
                                return Ok(Some(event));
                            }
                        }
                        OP_HEARTBEAT => self.send_heartbeat().await?,
                        OP_HEARTBEAT_ACK | OP_HELLO => {}
                        OP_RECONNECT => bail!("discord gateway requested reconnect"),
                        OP_INVALID_SESSION => bail!("discord gateway invalidated the session"),
                        other => debug!(op = other, "skipping unexpected gateway op"),
                    }
                }
            }
        }
    }

    /// Publishes a presence/activity update on the open session.
    pub async fn update_presence(&mut self, activity_kind: u8, name: &str) -> Result<()> {
        let payload = json!({
            "op": OP_PRESENCE_UPDATE,
            "d": {
                "since": null,
                "activities": [{ "name": name, "type": activity_kind }],
                "status": "online",
                "afk": false,
            },
        });
        self.sink
            .send(WsMessage::Text(payload.to_string().into()))
            .await
            .context("failed to send discord presence update")
    }

    async fn send_heartbeat(&mut self) -> Result<()> {
        let payload = json!({ "op": OP_HEARTBEAT, "d": self.last_seq });
        self.sink
            .send(WsMessage::Text(payload.to_string().into()))
            .await
            .context("failed to send discord gateway heartbeat")
    }
}

fn parse_gateway_frame(message: WsMessage) -> Result<Option<GatewayFrame>> {
    match message {
        WsMessage::Text(text) => {
            let frame = serde_json::from_str::<GatewayFrame>(&text)
                .context("failed to parse discord gateway frame")?;
            Ok(Some(frame))
        }
        WsMessage::Binary(bytes) => {
            let text = String::from_utf8(bytes.to_vec())
                .context("invalid utf-8 discord gateway payload")?;
            let frame = serde_json::from_str::<GatewayFrame>(&text)
                .context("failed to parse discord gateway frame")?;
            Ok(Some(frame))
        }
        WsMessage::Ping(_) | WsMessage::Pong(_) => Ok(None),
        WsMessage::Close(_) => Ok(None),
        WsMessage::Frame(_) => Ok(None),
    }
}

fn normalize_dispatch(event_name: Option<&str>, data: Value) -> Result<Option<GatewayEvent>> {
    match event_name {
        Some("READY") => {
            let session_id = data["session_id"].as_str().unwrap_or_default().to_string();
            let application_id = data["application"]["id"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            Ok(Some(GatewayEvent::Ready {
                session_id,
                application_id,
            }))
        }
        Some("INTERACTION_CREATE") => {
            let interaction = serde_json::from_value::<Interaction>(data)
                .context("failed to decode interaction payload")?;
            Ok(Some(GatewayEvent::InteractionCreate(Box::new(interaction))))
        }
        Some("GUILD_MEMBER_ADD") => Ok(member_event(&data).map(|guild_id| {
            GatewayEvent::GuildMemberAdd { guild_id }
        })),
        Some("GUILD_MEMBER_REMOVE") => Ok(member_event(&data).map(|guild_id| {
            GatewayEvent::GuildMemberRemove { guild_id }
        })),
        _ => Ok(None),
    }
}

fn member_event(data: &Value) -> Option<String> {
    data["guild_id"]
        .as_str()
        .filter(|guild_id| !guild_id.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_gateway_frame_skips_control_messages() {
        assert!(parse_gateway_frame(WsMessage::Ping(Vec::new().into()))
            .expect("ping")
            .is_none());
        assert!(parse_gateway_frame(WsMessage::Close(None))
            .expect("close")
            .is_none());
    }

    #[test]
    fn parse_gateway_frame_decodes_text_payloads() {
        let frame = parse_gateway_frame(WsMessage::Text(
            json!({"op": 0, "t": "READY", "s": 3, "d": {}}).to_string().into(),
        ))
        .expect("parse")
        .expect("frame");
        assert_eq!(frame.op, 0);
        assert_eq!(frame.s, Some(3));
        assert_eq!(frame.t.as_deref(), Some("READY"));
    }

    #[test]
    fn normalize_dispatch_extracts_ready_identifiers() {
        let event = normalize_dispatch(
            Some("READY"),
            json!({"session_id": "sess", "application": {"id": "app"}}),
        )
        .expect("normalize")
        .expect("event");
        match event {
            GatewayEvent::Ready {
                session_id,
                application_id,
            } => {
                assert_eq!(session_id, "sess");
                assert_eq!(application_id, "app");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn normalize_dispatch_decodes_interactions() {
        let event = normalize_dispatch(
            Some("INTERACTION_CREATE"),
            json!({
                "id": "I1",
                "token": "tok",
                "type": 3,
                "guild_id": "G1",
                "data": {"custom_id": "ticket_claim", "component_type": 2}
            }),
        )
        .expect("normalize")
        .expect("event");
        match event {
            GatewayEvent::InteractionCreate(interaction) => {
                assert_eq!(interaction.custom_id(), Some("ticket_claim"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn normalize_dispatch_ignores_unknown_events() {
        let event = normalize_dispatch(Some("TYPING_START"), json!({})).expect("normalize");
        assert!(event.is_none());
        let member = normalize_dispatch(Some("GUILD_MEMBER_ADD"), json!({"guild_id": "G7"}))
            .expect("normalize")
            .expect("event");
        assert!(matches!(member, GatewayEvent::GuildMemberAdd { guild_id } if guild_id == "G7"));
    }
}
