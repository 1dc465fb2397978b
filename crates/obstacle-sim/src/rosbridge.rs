//! Spawning through a rosbridge WebSocket.
//!
//! [`RosbridgeSpawnService`] speaks the rosbridge v2 JSON protocol as a
//! client: each spawn is a `call_service` request against
//! `/gazebo/spawn_sdf_model`, answered by a `service_response` carrying the
//! same request id.  One connection is opened lazily and reused for every
//! call; it is dropped and reopened after a transport failure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use obstacle_types::SpawnBlueprint;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::service::{SpawnError, SpawnService};

pub const SPAWN_SERVICE: &str = "/gazebo/spawn_sdf_model";
pub const SPAWN_SERVICE_TYPE: &str = "gazebo_msgs/SpawnModel";

const RETRY_INTERVAL: Duration = Duration::from_millis(250);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct RosbridgeSpawnService {
    url: String,
    connection: Mutex<Option<WsStream>>,
    next_id: AtomicU64,
}

impl RosbridgeSpawnService {
    /// `url` is the rosbridge endpoint, e.g. `ws://localhost:9090`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn connect(&self) -> Result<WsStream, SpawnError> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| SpawnError::Unavailable(format!("{}: {e}", self.url)))?;
        Ok(stream)
    }
}

async fn call(
    ws: &mut WsStream,
    request_id: &str,
    frame: Value,
) -> Result<Value, SpawnError> {
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .map_err(|e| SpawnError::Unavailable(e.to_string()))?;

    while let Some(msg) = ws.next().await {
        let msg = msg.map_err(|e| SpawnError::Unavailable(e.to_string()))?;
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let reply: Value = serde_json::from_str(&text)
            .map_err(|e| SpawnError::Protocol(format!("malformed frame: {e}")))?;
        if reply["id"].as_str() == Some(request_id) {
            return Ok(reply);
        }
        debug!(op = ?reply["op"], "Ignoring unrelated rosbridge frame");
    }
    Err(SpawnError::Unavailable("rosbridge closed the connection".into()))
}

/// Build the `call_service` frame for one blueprint.
pub fn build_spawn_frame(request_id: &str, blueprint: &SpawnBlueprint) -> Value {
    let t = blueprint.initial_pose.translation;
    let q = blueprint.initial_pose.rotation;
    json!({
        "op": "call_service",
        "id": request_id,
        "service": SPAWN_SERVICE,
        "type": SPAWN_SERVICE_TYPE,
        "args": {
            "model_name": blueprint.id,
            "model_xml": blueprint.geometry_descriptor,
            "robot_namespace": "",
            "initial_pose": {
                "position": { "x": t.x, "y": t.y, "z": t.z },
                "orientation": { "x": q.x, "y": q.y, "z": q.z, "w": q.w },
            },
            "reference_frame": blueprint.reference_frame,
        },
    })
}

/// Interpret a `service_response` frame for the spawn of `model`.
pub fn parse_spawn_response(model: &str, reply: &Value) -> Result<(), SpawnError> {
    if reply["op"] != "service_response" {
        return Err(SpawnError::Protocol(format!(
            "expected service_response, got {}",
            reply["op"]
        )));
    }
    let values = &reply["values"];
    if reply["result"] == false {
        return Err(SpawnError::Rejected {
            model: model.to_string(),
            message: values
                .as_str()
                .map_or_else(|| values.to_string(), str::to_string),
        });
    }
    match values["success"].as_bool() {
        Some(true) => Ok(()),
        Some(false) => Err(SpawnError::Rejected {
            model: model.to_string(),
            message: values["status_message"].as_str().unwrap_or_default().to_string(),
        }),
        None => Err(SpawnError::Protocol("response has no 'success' flag".into())),
    }
}

#[async_trait]
impl SpawnService for RosbridgeSpawnService {
    async fn wait_until_ready(&self, timeout: Duration) -> Result<(), SpawnError> {
        let mut connection = self.connection.lock().await;
        if connection.is_some() {
            return Ok(());
        }

        let attempt = async {
            loop {
                match self.connect().await {
                    Ok(ws) => return ws,
                    Err(e) => {
                        debug!(error = %e, "rosbridge not reachable yet");
                        tokio::time::sleep(RETRY_INTERVAL).await;
                    }
                }
            }
        };
        match tokio::time::timeout(timeout, attempt).await {
            Ok(ws) => {
                info!(url = %self.url, "Connected to rosbridge");
                *connection = Some(ws);
                Ok(())
            }
            Err(_) => Err(SpawnError::Unavailable(format!(
                "{} not reachable within {timeout:?}",
                self.url
            ))),
        }
    }

    async fn spawn(&self, blueprint: &SpawnBlueprint) -> Result<(), SpawnError> {
        let mut connection = self.connection.lock().await;
        // Taken out while the call is in flight so that a cancelled or failed
        // call leaves no half-read stream behind.
        let mut ws = match connection.take() {
            Some(ws) => ws,
            None => self.connect().await?,
        };

        let request_id = format!(
            "spawn_{}_{}",
            blueprint.id,
            self.next_id.fetch_add(1, Ordering::Relaxed)
        );
        let frame = build_spawn_frame(&request_id, blueprint);

        match call(&mut ws, &request_id, frame).await {
            Ok(reply) => {
                *connection = Some(ws);
                parse_spawn_response(&blueprint.id, &reply)
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "Dropping rosbridge connection");
                Err(e)
            }
        }
    }
}
