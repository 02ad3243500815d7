//! WebSocket signaling server
//!
//! Accepts control-channel connections, allocates one session per
//! connection, pushes the initial offer, and then pumps frames between the
//! socket and the session until either side goes away.

use crate::config::SignalingConfig;
use crate::engine::EngineFactory;
use crate::protocol::OutboundMessage;
use crate::registry::SessionRegistry;
use crate::router::MessageRouter;
use crate::session::SignalingSession;
use crate::{Error, Result};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Per-session outbound queue depth
const OUTBOUND_QUEUE: usize = 64;

/// WebSocket signaling server
pub struct SignalingServer {
    config: SignalingConfig,
    factory: Arc<dyn EngineFactory>,
    registry: Arc<SessionRegistry>,
}

impl std::fmt::Debug for SignalingServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingServer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Handle to a running server
pub struct SignalingServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl SignalingServerHandle {
    /// The address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signal shutdown and wait for the accept loop to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            warn!("accept loop task error on shutdown: {}", e);
        }
    }
}

impl SignalingServer {
    /// Create a server from a validated configuration
    pub fn new(config: SignalingConfig, factory: Arc<dyn EngineFactory>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            factory,
            registry: Arc::new(SessionRegistry::new()),
        })
    }

    /// Shared registry, for inspection
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Bind the listener and spawn the accept loop
    pub async fn start(self) -> Result<SignalingServerHandle> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "signaling server listening");

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        let registry = Arc::clone(&self.registry);
        let factory = Arc::clone(&self.factory);
        let ice_servers = self.config.ice_servers.clone();
        let per_conn_shutdown = shutdown_tx.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let (stream, peer_addr) = match accepted {
                            Ok(pair) => pair,
                            Err(e) => {
                                warn!("accept failed: {}", e);
                                continue;
                            }
                        };
                        debug!(%peer_addr, "incoming connection");

                        let registry = Arc::clone(&registry);
                        let factory = Arc::clone(&factory);
                        let ice_servers = ice_servers.clone();
                        let shutdown = per_conn_shutdown.subscribe();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(
                                stream,
                                peer_addr,
                                registry,
                                factory,
                                ice_servers,
                                shutdown,
                            )
                            .await
                            {
                                warn!(%peer_addr, "connection ended with error: {}", e);
                            }
                        });
                    }
                    _ = shutdown_rx.recv() => {
                        info!("signaling server shutting down");
                        break;
                    }
                }
            }

            for session in registry.clear().await {
                session.close().await;
            }
        });

        Ok(SignalingServerHandle {
            local_addr,
            shutdown_tx,
            task,
        })
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    factory: Arc<dyn EngineFactory>,
    ice_servers: Vec<String>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| Error::WebSocketError(format!("handshake failed: {}", e)))?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let token = Uuid::new_v4().to_string();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_QUEUE);
    let session = SignalingSession::new(token.clone(), ice_servers, outbound_tx);
    registry.create(Arc::clone(&session)).await?;
    info!(session_id = %token, %peer_addr, "session opened");

    let router = MessageRouter::new(Arc::clone(&registry));

    // Server-initiated negotiation: the offer goes out before any inbound
    // frame is read.
    let opened = open_negotiation(&session, factory.as_ref()).await;
    match opened {
        Ok(offer_sdp) => {
            let envelope = match (OutboundMessage::Offer { sdp: offer_sdp }).to_envelope(&token) {
                Ok(envelope) => envelope,
                Err(e) => {
                    teardown(&registry, &session).await;
                    return Err(e);
                }
            };
            if let Err(e) = ws_tx.send(Message::Text(envelope)).await {
                teardown(&registry, &session).await;
                return Err(Error::WebSocketError(format!(
                    "failed to send offer: {}",
                    e
                )));
            }
        }
        Err(e) => {
            error!(session_id = %token, "negotiation setup failed: {}", e);
            if let Ok(envelope) = (OutboundMessage::Error {
                detail: e.to_string(),
            })
            .to_envelope(&token)
            {
                let _ = ws_tx.send(Message::Text(envelope)).await;
            }
            teardown(&registry, &session).await;
            return Err(e);
        }
    }

    let result = loop {
        tokio::select! {
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(raw))) => {
                        if let Err(e) = router.dispatch(&raw).await {
                            error!(session_id = %token, "fatal dispatch error: {}", e);
                            // Flush the queued failure report before dropping the socket
                            while let Ok(message) = outbound_rx.try_recv() {
                                if let Ok(envelope) = message.to_envelope(&token) {
                                    let _ = ws_tx.send(Message::Text(envelope)).await;
                                }
                            }
                            break Err(e);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(session_id = %token, "client closed connection");
                        break Ok(());
                    }
                    Some(Ok(_)) => {
                        // Binary and ping/pong frames carry no signaling
                    }
                    Some(Err(e)) => {
                        break Err(Error::WebSocketError(format!("read failed: {}", e)));
                    }
                }
            }
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(message) => {
                        let envelope = match message.to_envelope(&token) {
                            Ok(envelope) => envelope,
                            Err(e) => break Err(e),
                        };
                        if let Err(e) = ws_tx.send(Message::Text(envelope)).await {
                            break Err(Error::WebSocketError(format!("write failed: {}", e)));
                        }
                    }
                    None => break Ok(()),
                }
            }
            _ = shutdown.recv() => {
                debug!(session_id = %token, "closing connection on server shutdown");
                let _ = ws_tx.send(Message::Close(None)).await;
                break Ok(());
            }
        }
    };

    teardown(&registry, &session).await;
    info!(session_id = %token, "session finished");
    result
}

async fn open_negotiation(
    session: &Arc<SignalingSession>,
    factory: &dyn EngineFactory,
) -> Result<String> {
    session.establish(factory).await?;
    session.initiate_offer().await
}

async fn teardown(registry: &SessionRegistry, session: &Arc<SignalingSession>) {
    registry.remove(session.id()).await;
    session.close().await;
}
