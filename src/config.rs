//! Configuration types for the signaling server

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Main configuration for the signaling server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// Address to bind the WebSocket listener to
    pub bind_addr: String,

    /// Port to listen on (0 picks an ephemeral port)
    pub port: u16,

    /// ICE server URLs handed to each peer connection (at least one required)
    pub ice_servers: Vec<String>,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8080,
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
        }
    }
}

impl SignalingConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `ice_servers` is empty
    /// - an ICE server URL has an unknown scheme
    /// - `bind_addr`/`port` do not form a valid socket address
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.ice_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one ICE server is required".to_string(),
            ));
        }

        for url in &self.ice_servers {
            let known_scheme = url.starts_with("stun:")
                || url.starts_with("stuns:")
                || url.starts_with("turn:")
                || url.starts_with("turns:");
            if !known_scheme {
                return Err(Error::InvalidConfig(format!(
                    "ICE server URL must use stun/stuns/turn/turns scheme, got {}",
                    url
                )));
            }
        }

        self.socket_addr()?;

        Ok(())
    }

    /// Resolve the configured bind address
    pub fn socket_addr(&self) -> crate::Result<SocketAddr> {
        format!("{}:{}", self.bind_addr, self.port)
            .parse()
            .map_err(|e| {
                crate::Error::InvalidConfig(format!(
                    "invalid bind address {}:{}: {}",
                    self.bind_addr, self.port, e
                ))
            })
    }
}
