//! `obstacle-middleware` – event routing between the scene and the outside
//! world.
//!
//! # Modules
//!
//! - [`bus`] – topic-partitioned publish/subscribe event bus built on Tokio
//!   broadcast channels, with one lane per obstacle pose stream.
//! - [`ws_bridge`] – rosbridge-style WebSocket endpoint that lets external
//!   clients subscribe to the scene and feed raw poses and transforms in.

pub mod bus;
pub mod ws_bridge;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use ws_bridge::WsBridge;
