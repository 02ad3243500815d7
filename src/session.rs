//! Signaling session state machine
//!
//! One [`SignalingSession`] exists per client connection. It exclusively owns
//! its negotiation engine and mediates every call into it. All mutation goes
//! through a per-session `tokio::sync::Mutex`: holding it across the engine
//! awaits means no two negotiation operations are ever in flight for one
//! session, and engine callbacks (which arrive on arbitrary tasks) are applied
//! strictly serialized against inbound client messages.

use crate::engine::{EngineEvent, EngineFactory, NegotiationEngine};
use crate::protocol::{IceCandidate, OutboundMessage, SdpKind, SessionDescription};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Signaling session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session registered, engine not yet created
    Created,
    /// Engine created, observer registered, no offer yet
    Negotiating,
    /// Local offer applied to the engine and handed out for transmission
    LocalOfferSet,
    /// Remote answer applied, waiting for the transport to connect
    RemoteAnswerApplied,
    /// Engine reported the transport connected
    Established,
    /// Unrecoverable negotiation or engine failure (terminal)
    Failed,
    /// Connection torn down (terminal)
    Closed,
}

impl SessionState {
    /// True for states no transition may leave
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Failed | SessionState::Closed)
    }
}

struct SessionInner {
    state: SessionState,
    engine: Option<Arc<dyn NegotiationEngine>>,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    /// Remote candidates waiting for the remote description, in arrival order
    pending_remote_candidates: Vec<IceCandidate>,
}

/// State machine for one peer negotiation
pub struct SignalingSession {
    id: String,
    ice_servers: Vec<String>,
    inner: Mutex<SessionInner>,
    outbound: mpsc::Sender<OutboundMessage>,
}

impl std::fmt::Debug for SignalingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingSession")
            .field("id", &self.id)
            .field("ice_servers", &self.ice_servers)
            .finish_non_exhaustive()
    }
}

impl SignalingSession {
    /// Create a session in `Created` with no engine attached
    pub fn new(
        id: String,
        ice_servers: Vec<String>,
        outbound: mpsc::Sender<OutboundMessage>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            ice_servers,
            inner: Mutex::new(SessionInner {
                state: SessionState::Created,
                engine: None,
                local_description: None,
                remote_description: None,
                pending_remote_candidates: Vec::new(),
            }),
            outbound,
        })
    }

    /// Session identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current state
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// The remote description, once applied
    pub async fn remote_description(&self) -> Option<SessionDescription> {
        self.inner.lock().await.remote_description.clone()
    }

    /// Number of remote candidates buffered for the remote description
    pub async fn pending_candidate_count(&self) -> usize {
        self.inner.lock().await.pending_remote_candidates.len()
    }

    /// Create the engine and register this session as its observer
    ///
    /// Valid only from `Created`. The observer holds a weak handle back to
    /// the session, so a session dropped from the registry never keeps
    /// itself alive through late engine callbacks.
    pub async fn establish(self: &Arc<Self>, factory: &dyn EngineFactory) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Created {
            return Err(Error::InvalidState(format!(
                "establish is only valid in Created, session {} is {:?}",
                self.id, inner.state
            )));
        }
        if self.ice_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "ICE server list is empty".to_string(),
            ));
        }

        let engine = factory.create(&self.ice_servers).await?;

        let weak = Arc::downgrade(self);
        engine.register_observer(Box::new(move |event| {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(session) = weak.upgrade() {
                    session.handle_engine_event(event).await;
                }
            })
        }))?;

        inner.engine = Some(engine);
        inner.state = SessionState::Negotiating;
        debug!(session_id = %self.id, "session established, negotiating");
        Ok(())
    }

    /// Generate and apply the local offer, returning the SDP to transmit
    ///
    /// Valid only from `Negotiating`. Engine failure moves the session to
    /// `Failed` and surfaces as `NegotiationFailed`.
    pub async fn initiate_offer(&self) -> Result<String> {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Negotiating {
            return Err(Error::InvalidState(format!(
                "offer initiation is only valid in Negotiating, session {} is {:?}",
                self.id, inner.state
            )));
        }
        let engine = Self::engine_handle(&self.id, &inner)?;

        let offer = match engine.create_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                inner.state = SessionState::Failed;
                warn!(session_id = %self.id, "offer creation failed: {}", e);
                return Err(Error::NegotiationFailed(format!(
                    "offer creation failed: {}",
                    e
                )));
            }
        };

        if let Err(e) = engine.set_local_description(offer.clone()).await {
            inner.state = SessionState::Failed;
            warn!(session_id = %self.id, "setting local description failed: {}", e);
            return Err(Error::NegotiationFailed(format!(
                "setting local description failed: {}",
                e
            )));
        }

        let sdp = offer.sdp.clone();
        inner.local_description = Some(offer);
        inner.state = SessionState::LocalOfferSet;
        info!(session_id = %self.id, "local offer set");
        Ok(sdp)
    }

    /// Apply the remote answer and flush buffered candidates
    ///
    /// Valid only from `LocalOfferSet`. A second answer is rejected with
    /// `DuplicateAnswer` and leaves the session untouched; the protocol
    /// assigns no meaning to applying an answer twice.
    pub async fn apply_remote_answer(&self, answer: SessionDescription) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            SessionState::LocalOfferSet => {}
            SessionState::RemoteAnswerApplied | SessionState::Established => {
                return Err(Error::DuplicateAnswer(format!(
                    "session {} already applied a remote answer",
                    self.id
                )));
            }
            other => {
                return Err(Error::InvalidState(format!(
                    "answer not expected in state {:?} for session {}",
                    other, self.id
                )));
            }
        }
        if answer.kind != SdpKind::Answer {
            return Err(Error::Parse(format!(
                "expected an answer description, got {:?}",
                answer.kind
            )));
        }

        let engine = Self::engine_handle(&self.id, &inner)?;
        if let Err(e) = engine.set_remote_description(answer.clone()).await {
            inner.state = SessionState::Failed;
            warn!(session_id = %self.id, "applying remote answer failed: {}", e);
            return Err(Error::NegotiationFailed(format!(
                "applying remote answer failed: {}",
                e
            )));
        }

        inner.remote_description = Some(answer);
        inner.state = SessionState::RemoteAnswerApplied;
        info!(session_id = %self.id, "remote answer applied");

        // Flush buffered candidates in arrival order, exactly once. A single
        // bad candidate is not fatal to the session.
        let queued = std::mem::take(&mut inner.pending_remote_candidates);
        for candidate in queued {
            if let Err(e) = engine.add_ice_candidate(candidate).await {
                warn!(session_id = %self.id, "buffered candidate rejected by engine: {}", e);
            }
        }

        Ok(())
    }

    /// Ingest a remote ICE candidate
    ///
    /// Buffered while the remote description is absent, forwarded to the
    /// engine immediately otherwise. Dropped silently in terminal states.
    /// Engine rejection surfaces as `CandidateRejected`; like a rejection
    /// during the buffered flush, it leaves the session negotiating.
    pub async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state.is_terminal() {
            debug!(session_id = %self.id, "dropping remote candidate for terminal session");
            return Ok(());
        }
        if inner.remote_description.is_none() {
            inner.pending_remote_candidates.push(candidate);
            debug!(
                session_id = %self.id,
                queued = inner.pending_remote_candidates.len(),
                "buffered remote candidate until remote description"
            );
            return Ok(());
        }

        let engine = Self::engine_handle(&self.id, &inner)?;
        if let Err(e) = engine.add_ice_candidate(candidate).await {
            warn!(session_id = %self.id, "remote candidate rejected by engine: {}", e);
            return Err(Error::CandidateRejected(e.to_string()));
        }
        Ok(())
    }

    /// Send a failure report to the peer without changing state
    ///
    /// Non-blocking: the task draining the outbound queue may be the caller,
    /// so a full queue drops the report instead of waiting for space.
    pub fn notify_error(&self, detail: String) {
        if let Err(e) = self.outbound.try_send(OutboundMessage::Error { detail }) {
            debug!(session_id = %self.id, "error report dropped: {}", e);
        }
    }

    /// Apply one engine observer event
    ///
    /// Terminal-state checks happen under the session lock, so a callback
    /// racing connection teardown is detected and discarded here.
    pub(crate) async fn handle_engine_event(&self, event: EngineEvent) {
        let mut inner = self.inner.lock().await;
        if inner.state.is_terminal() {
            debug!(session_id = %self.id, "discarding engine event after teardown");
            return;
        }

        match event {
            EngineEvent::CandidateDiscovered(candidate) => {
                // State consulted above; the send itself mutates nothing
                drop(inner);
                if self
                    .outbound
                    .send(OutboundMessage::IceCandidate { candidate })
                    .await
                    .is_err()
                {
                    debug!(session_id = %self.id, "outbound channel closed, candidate dropped");
                }
            }
            EngineEvent::Connected => {
                if inner.state == SessionState::RemoteAnswerApplied {
                    inner.state = SessionState::Established;
                    info!(session_id = %self.id, "session established");
                } else {
                    debug!(
                        session_id = %self.id,
                        state = ?inner.state,
                        "connected report ignored outside RemoteAnswerApplied"
                    );
                }
            }
            EngineEvent::Failed(reason) => {
                warn!(session_id = %self.id, "engine reported failure: {}", reason);
                inner.state = SessionState::Failed;
                drop(inner);
                self.notify_error(reason);
            }
        }
    }

    /// Release the engine and discard buffered candidates
    ///
    /// Moves any non-terminal session to `Closed`; a `Failed` session keeps
    /// its state but still has its engine released. Idempotent.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.pending_remote_candidates.clear();
        if !inner.state.is_terminal() {
            inner.state = SessionState::Closed;
            info!(session_id = %self.id, "session closed");
        }
        if let Some(engine) = inner.engine.take() {
            if let Err(e) = engine.close().await {
                warn!(session_id = %self.id, "error closing engine: {}", e);
            }
        }
    }

    fn engine_handle(
        id: &str,
        inner: &MutexGuard<'_, SessionInner>,
    ) -> Result<Arc<dyn NegotiationEngine>> {
        inner
            .engine
            .clone()
            .ok_or_else(|| Error::InvalidState(format!("session {} has no engine", id)))
    }
}
