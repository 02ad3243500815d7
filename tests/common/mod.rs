//! Shared test support: a scriptable negotiation engine
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use wsrtc_signaling::engine::{EngineEvent, EngineFactory, EngineObserver, NegotiationEngine};
use wsrtc_signaling::{Error, IceCandidate, Result, SdpKind, SessionDescription};

/// One recorded engine call
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOp {
    CreateOffer,
    SetLocal(String),
    SetRemote(String),
    AddCandidate(String),
    Close,
}

/// Negotiation engine that records calls and lets tests fire observer events
pub struct MockEngine {
    ops: Mutex<Vec<EngineOp>>,
    observer: Mutex<Option<EngineObserver>>,
    pub fail_create_offer: AtomicBool,
    pub fail_set_local: AtomicBool,
    pub fail_set_remote: AtomicBool,
    pub fail_add_candidate: AtomicBool,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ops: Mutex::new(Vec::new()),
            observer: Mutex::new(None),
            fail_create_offer: AtomicBool::new(false),
            fail_set_local: AtomicBool::new(false),
            fail_set_remote: AtomicBool::new(false),
            fail_add_candidate: AtomicBool::new(false),
        })
    }

    pub fn ops(&self) -> Vec<EngineOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn has_observer(&self) -> bool {
        self.observer.lock().unwrap().is_some()
    }

    /// Fire an observer event the way a real engine would, off-lock
    pub async fn emit(&self, event: EngineEvent) {
        let fut = {
            let guard = self.observer.lock().unwrap();
            guard.as_ref().map(|observer| observer(event))
        };
        if let Some(fut) = fut {
            fut.await;
        }
    }

    fn record(&self, op: EngineOp) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait]
impl NegotiationEngine for MockEngine {
    async fn create_offer(&self) -> Result<SessionDescription> {
        if self.fail_create_offer.load(Ordering::SeqCst) {
            return Err(Error::EngineError("mock offer failure".to_string()));
        }
        self.record(EngineOp::CreateOffer);
        Ok(SessionDescription {
            kind: SdpKind::Offer,
            sdp: "v=0\r\nmock-offer\r\n".to_string(),
        })
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription {
            kind: SdpKind::Answer,
            sdp: "v=0\r\nmock-answer\r\n".to_string(),
        })
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        if self.fail_set_local.load(Ordering::SeqCst) {
            return Err(Error::EngineError("mock set-local failure".to_string()));
        }
        self.record(EngineOp::SetLocal(desc.sdp));
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        if self.fail_set_remote.load(Ordering::SeqCst) {
            return Err(Error::EngineError("mock set-remote failure".to_string()));
        }
        self.record(EngineOp::SetRemote(desc.sdp));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        if self.fail_add_candidate.load(Ordering::SeqCst) {
            return Err(Error::EngineError("mock candidate failure".to_string()));
        }
        self.record(EngineOp::AddCandidate(candidate.sdp));
        Ok(())
    }

    fn register_observer(&self, observer: EngineObserver) -> Result<()> {
        let mut guard = self.observer.lock().unwrap();
        if guard.is_some() {
            return Err(Error::HandlerAlreadyRegistered(
                "mock observer already registered".to_string(),
            ));
        }
        *guard = Some(observer);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(EngineOp::Close);
        Ok(())
    }
}

/// Factory handing out [`MockEngine`]s and remembering every one it created
#[derive(Default)]
pub struct MockEngineFactory {
    engines: Mutex<Vec<Arc<MockEngine>>>,
    pub fail_create: AtomicBool,
}

impl MockEngineFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created(&self) -> Vec<Arc<MockEngine>> {
        self.engines.lock().unwrap().clone()
    }
}

#[async_trait]
impl EngineFactory for MockEngineFactory {
    async fn create(&self, ice_servers: &[String]) -> Result<Arc<dyn NegotiationEngine>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::EngineError("mock factory failure".to_string()));
        }
        if ice_servers.is_empty() {
            return Err(Error::InvalidConfig("ICE server list is empty".to_string()));
        }
        let engine = MockEngine::new();
        self.engines.lock().unwrap().push(Arc::clone(&engine));
        Ok(engine)
    }
}

/// A plausible host candidate for tests
pub fn host_candidate(n: u16) -> IceCandidate {
    IceCandidate {
        sdp_mid: "0".to_string(),
        sdp_mline_index: 0,
        sdp: format!("candidate:{n} 1 UDP 2122252543 10.0.0.{n} 5000{n} typ host"),
    }
}

/// A remote answer description
pub fn remote_answer() -> SessionDescription {
    SessionDescription {
        kind: SdpKind::Answer,
        sdp: "v=0\r\nremote-answer\r\n".to_string(),
    }
}
