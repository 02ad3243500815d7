//! WebSocket-based WebRTC signaling server
//!
//! This crate implements the server side of a WebRTC signaling exchange over
//! a WebSocket control channel. The server is always the offerer: each
//! accepted connection gets a session with a fresh token, a negotiation
//! engine is spun up, and the local offer is pushed to the client. The
//! client replies with its answer and trickles ICE candidates; locally
//! discovered candidates flow back over the same channel.
//!
//! # Architecture
//!
//! - [`protocol`] - JSON wire envelopes for the control channel
//! - [`engine`] - the [`engine::NegotiationEngine`] capability and its
//!   webrtc-rs implementation
//! - [`session`] - the per-connection signaling state machine
//! - [`registry`] - token to session map
//! - [`router`] - inbound frame classification and dispatch
//! - [`server`] - WebSocket listener and connection pump
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wsrtc_signaling::{SignalingConfig, SignalingServer, WebRtcEngineFactory};
//!
//! # async fn run() -> wsrtc_signaling::Result<()> {
//! let server = SignalingServer::new(
//!     SignalingConfig::default(),
//!     Arc::new(WebRtcEngineFactory),
//! )?;
//! let handle = server.start().await?;
//! println!("listening on {}", handle.local_addr());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;

pub use config::SignalingConfig;
pub use engine::{EngineEvent, EngineFactory, NegotiationEngine, WebRtcEngine, WebRtcEngineFactory};
pub use error::{Error, Result};
pub use protocol::{IceCandidate, InboundMessage, OutboundMessage, SdpKind, SessionDescription};
pub use registry::SessionRegistry;
pub use router::MessageRouter;
pub use server::{SignalingServer, SignalingServerHandle};
pub use session::{SessionState, SignalingSession};

/// Crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
