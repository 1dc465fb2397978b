//! rosbridge-style WebSocket bridge.
//!
//! [`WsBridge`] exposes the [`EventBus`] to external processes (RViz-like
//! web viewers, motion-capture relays, controllers) as JSON over WebSocket.
//! The protocol is a small subset of rosbridge v2:
//!
//! | Client → bridge | Effect |
//! |---|---|
//! | `{"op":"subscribe","topic":T}` | Forward every event on `T` to this client |
//! | `{"op":"unsubscribe","topic":T}` | Stop forwarding `T` |
//! | `{"op":"publish","topic":T,"msg":M}` | Inject `M` on `T` (only `/obstacles/<id>/mocap` and `/tf`) |
//!
//! Outbound events are sent as `{"op":"publish","topic":T,"msg":M}` where `M`
//! is the event payload (a scene snapshot, a stamped pose or a stamped
//! transform).  Every request is answered with a
//! `{"op":"status","level":...,"msg":...}` frame.

use std::collections::HashMap;
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use obstacle_types::{Event, EventPayload, PoseStamped, SceneError, TransformStamped};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::bus::{EventBus, Topic};

const SOURCE: &str = "obstacle-middleware::ws_bridge";

/// Outbound frames buffered per client.  A client that stops reading loses
/// frames beyond this instead of growing the queue.
pub const OUTBOUND_QUEUE: usize = 64;

/// One request from a WebSocket client.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ClientOp {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Publish { topic: String, msg: Value },
}

/// Bridge between the [`EventBus`] and WebSocket clients.
#[derive(Clone)]
pub struct WsBridge {
    bus: EventBus,
}

impl WsBridge {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Bind `addr` and serve clients until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::Channel`] if the TCP listener cannot be bound.
    pub async fn run_ws_server(self, addr: SocketAddr) -> Result<(), SceneError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SceneError::Channel(format!("ws bind error on {addr}: {e}")))?;
        info!(addr = %addr, "ws bridge listening");
        self.serve(listener).await;
        Ok(())
    }

    /// Accept clients on an already bound listener.
    pub async fn serve(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let bridge = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = bridge.handle_ws_client(stream, peer).await {
                            error!(peer = %peer, error = %e, "ws client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "ws accept error");
                }
            }
        }
    }

    async fn handle_ws_client(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), SceneError> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| SceneError::Channel(format!("ws handshake from {peer}: {e}")))?;
        debug!(peer = %peer, "ws client connected");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
        let mut forwarders: HashMap<Topic, JoinHandle<()>> = HashMap::new();

        loop {
            tokio::select! {
                // Bus → client.
                Some(frame) = out_rx.recv() => {
                    if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                // Client → bus.
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let reply = self.handle_client_message(text.as_str(), &out_tx, &mut forwarders);
                            if ws_tx.send(Message::Text(reply.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(_)) => break,
                        _ => {}
                    }
                }
            }
        }

        for (_, handle) in forwarders {
            handle.abort();
        }
        debug!(peer = %peer, "ws client disconnected");
        Ok(())
    }

    /// Apply one client request and build the status frame to send back.
    fn handle_client_message(
        &self,
        text: &str,
        out_tx: &mpsc::Sender<String>,
        forwarders: &mut HashMap<Topic, JoinHandle<()>>,
    ) -> Value {
        let op = match serde_json::from_str::<ClientOp>(text) {
            Ok(op) => op,
            Err(e) => return status("error", &format!("malformed request: {e}"), None),
        };

        match op {
            ClientOp::Subscribe { topic } => {
                let Some(parsed) = Topic::parse(&topic) else {
                    return status("error", "unknown topic", Some(topic.as_str()));
                };
                if !forwarders.contains_key(&parsed) {
                    let handle = spawn_forwarder(&self.bus, parsed.clone(), out_tx.clone());
                    forwarders.insert(parsed, handle);
                }
                status("info", "subscribed", Some(topic.as_str()))
            }
            ClientOp::Unsubscribe { topic } => {
                if let Some(handle) = Topic::parse(&topic).and_then(|t| forwarders.remove(&t)) {
                    handle.abort();
                }
                status("info", "unsubscribed", Some(topic.as_str()))
            }
            ClientOp::Publish { topic, msg } => match self.ingest_publish(&topic, msg) {
                Ok(_) => status("info", "published", Some(topic.as_str())),
                Err(e) => status("error", &e.to_string(), Some(topic.as_str())),
            },
        }
    }

    /// Turn a client publish into a typed bus event.
    ///
    /// Only raw obstacle poses and transforms are writable; everything else
    /// is produced inside the process.
    pub fn ingest_publish(&self, topic: &str, msg: Value) -> Result<usize, SceneError> {
        let parsed = Topic::parse(topic)
            .ok_or_else(|| SceneError::Channel(format!("unknown topic {topic}")))?;

        let payload = match &parsed {
            Topic::RawPose(obstacle) => {
                let pose: PoseStamped = serde_json::from_value(msg)
                    .map_err(|e| SceneError::Serialization(e.to_string()))?;
                EventPayload::RawPose {
                    obstacle: obstacle.clone(),
                    pose,
                }
            }
            Topic::Transforms => {
                let tf: TransformStamped = serde_json::from_value(msg)
                    .map_err(|e| SceneError::Serialization(e.to_string()))?;
                EventPayload::Transform(tf)
            }
            Topic::SceneMarkers | Topic::TrackedPose(_) => {
                return Err(SceneError::Channel(format!("topic {topic} is read-only")));
            }
        };

        self.bus.publish_to(&parsed, Event::new(SOURCE, payload))
    }
}

/// Subscribe now, forward in the background.  Subscribing before the task
/// starts guarantees the client sees every event published after its
/// `subscribed` status frame.
fn spawn_forwarder(
    bus: &EventBus,
    topic: Topic,
    out_tx: mpsc::Sender<String>,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe_to(topic.clone());
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match outbound_frame(&topic, &event) {
                    Ok(frame) => {
                        if !enqueue(&out_tx, &topic, frame) {
                            break;
                        }
                    }
                    Err(e) => warn!(topic = %topic, error = %e, "failed to encode event"),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = %topic, lagged_by = n, "ws client lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Queue `frame` for the client without waiting.  A full queue drops the
/// frame; returns `false` once the client is gone.
fn enqueue(out_tx: &mpsc::Sender<String>, topic: &Topic, frame: String) -> bool {
    match out_tx.try_send(frame) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(topic = %topic, "ws client not reading; frame dropped");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Encode `event` as a rosbridge `publish` frame.
pub fn outbound_frame(topic: &Topic, event: &Event) -> Result<String, serde_json::Error> {
    let msg = match &event.payload {
        EventPayload::SceneUpdate(snapshot) => serde_json::to_value(snapshot)?,
        EventPayload::RawPose { pose, .. } | EventPayload::TrackedPose { pose, .. } => {
            serde_json::to_value(pose)?
        }
        EventPayload::Transform(tf) => serde_json::to_value(tf)?,
    };
    serde_json::to_string(&json!({
        "op": "publish",
        "topic": topic.name(),
        "msg": msg,
    }))
}

fn status(level: &str, msg: &str, topic: Option<&str>) -> Value {
    json!({
        "op": "status",
        "level": level,
        "msg": msg,
        "topic": topic,
    })
}
