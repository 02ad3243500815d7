//! Negotiation engine capability
//!
//! The session state machine drives offer/answer generation and ICE through
//! the [`NegotiationEngine`] trait and assumes nothing about the engine
//! beyond it: callbacks fire asynchronously, on an unspecified task, after
//! the registering call returns. [`WebRtcEngine`] is the production
//! implementation on top of webrtc-rs; tests substitute their own.

use crate::protocol::{IceCandidate, SdpKind, SessionDescription};
use crate::{Error, Result};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

/// Event delivered through the engine observer
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A local ICE candidate was discovered and should be sent to the peer
    CandidateDiscovered(IceCandidate),

    /// The underlying transport reached the connected state
    Connected,

    /// The engine hit an unrecoverable failure
    Failed(String),
}

/// Observer callback registered once per engine instance
pub type EngineObserver =
    Box<dyn Fn(EngineEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Capability set the signaling core requires from the negotiation engine
#[async_trait]
pub trait NegotiationEngine: Send + Sync {
    /// Generate a local SDP offer
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Generate a local SDP answer
    async fn create_answer(&self) -> Result<SessionDescription>;

    /// Apply a local session description
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    /// Apply a remote session description
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    /// Ingest a remote ICE candidate
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Register the single engine observer
    ///
    /// # Errors
    ///
    /// Returns `HandlerAlreadyRegistered` if called a second time.
    fn register_observer(&self, observer: EngineObserver) -> Result<()>;

    /// Release the engine's resources
    async fn close(&self) -> Result<()>;
}

/// Builds one engine per signaling session
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// Create an engine configured with the given ICE servers
    async fn create(&self, ice_servers: &[String]) -> Result<Arc<dyn NegotiationEngine>>;
}

/// Production engine wrapping a webrtc-rs `RTCPeerConnection`
pub struct WebRtcEngine {
    peer_connection: Arc<RTCPeerConnection>,
    observer_registered: AtomicBool,
}

impl std::fmt::Debug for WebRtcEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebRtcEngine")
            .field(
                "observer_registered",
                &self.observer_registered.load(Ordering::SeqCst),
            )
            .finish_non_exhaustive()
    }
}

impl WebRtcEngine {
    /// Create a peer connection configured with the given ICE servers
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `ice_servers` is empty.
    pub async fn new(ice_servers: &[String]) -> Result<Self> {
        if ice_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "ICE server list is empty".to_string(),
            ));
        }

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::EngineError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine)
                .map_err(|e| Error::EngineError(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: ice_servers.to_vec(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
            Error::EngineError(format!("Failed to create peer connection: {}", e))
        })?);

        Ok(Self {
            peer_connection,
            observer_registered: AtomicBool::new(false),
        })
    }

    fn to_rtc_description(desc: &SessionDescription) -> Result<RTCSessionDescription> {
        let converted = match desc.kind {
            SdpKind::Offer => RTCSessionDescription::offer(desc.sdp.clone()),
            SdpKind::Answer => RTCSessionDescription::answer(desc.sdp.clone()),
        };
        converted.map_err(|e| Error::Parse(format!("Invalid SDP: {}", e)))
    }
}

#[async_trait]
impl NegotiationEngine for WebRtcEngine {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::NegotiationFailed(format!("Failed to create offer: {}", e)))?;

        Ok(SessionDescription {
            kind: SdpKind::Offer,
            sdp: offer.sdp,
        })
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::NegotiationFailed(format!("Failed to create answer: {}", e)))?;

        Ok(SessionDescription {
            kind: SdpKind::Answer,
            sdp: answer.sdp,
        })
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = Self::to_rtc_description(&desc)?;
        self.peer_connection
            .set_local_description(desc)
            .await
            .map_err(|e| {
                Error::NegotiationFailed(format!("Failed to set local description: {}", e))
            })
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = Self::to_rtc_description(&desc)?;
        self.peer_connection
            .set_remote_description(desc)
            .await
            .map_err(|e| {
                Error::NegotiationFailed(format!("Failed to set remote description: {}", e))
            })
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.sdp,
            sdp_mid: Some(candidate.sdp_mid),
            sdp_mline_index: Some(candidate.sdp_mline_index),
            username_fragment: None,
        };

        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::EngineError(format!("Failed to add ICE candidate: {}", e)))
    }

    fn register_observer(&self, observer: EngineObserver) -> Result<()> {
        if self.observer_registered.swap(true, Ordering::SeqCst) {
            return Err(Error::HandlerAlreadyRegistered(
                "engine observer already registered".to_string(),
            ));
        }

        let observer = Arc::new(observer);

        let obs = Arc::clone(&observer);
        self.peer_connection
            .on_ice_candidate(Box::new(move |candidate| {
                let obs = Arc::clone(&obs);
                Box::pin(async move {
                    // None marks end of gathering, which the peer infers on its own
                    let Some(candidate) = candidate else { return };
                    match candidate.to_json() {
                        Ok(init) => {
                            let event = EngineEvent::CandidateDiscovered(IceCandidate {
                                sdp_mid: init.sdp_mid.unwrap_or_default(),
                                sdp_mline_index: init.sdp_mline_index.unwrap_or_default(),
                                sdp: init.candidate,
                            });
                            obs(event).await;
                        }
                        Err(e) => {
                            warn!("Failed to serialize discovered ICE candidate: {}", e);
                        }
                    }
                })
            }));

        let obs = Arc::clone(&observer);
        self.peer_connection
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                let obs = Arc::clone(&obs);
                Box::pin(async move {
                    match state {
                        RTCPeerConnectionState::Connected => obs(EngineEvent::Connected).await,
                        RTCPeerConnectionState::Failed => {
                            obs(EngineEvent::Failed("peer connection failed".to_string())).await
                        }
                        _ => {}
                    }
                })
            }));

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::EngineError(format!("Failed to close peer connection: {}", e)))
    }
}

/// Factory producing [`WebRtcEngine`] instances
#[derive(Debug, Default)]
pub struct WebRtcEngineFactory;

#[async_trait]
impl EngineFactory for WebRtcEngineFactory {
    async fn create(&self, ice_servers: &[String]) -> Result<Arc<dyn NegotiationEngine>> {
        Ok(Arc::new(WebRtcEngine::new(ice_servers).await?))
    }
}
