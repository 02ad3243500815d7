//! Inbound message routing
//!
//! The router classifies raw text frames from the control channel into
//! typed [`InboundMessage`]s and dispatches them to the addressed session.
//! Unknown message kinds and messages for unknown tokens are logged and
//! dropped; the connection survives them.

use crate::protocol::InboundMessage;
use crate::registry::SessionRegistry;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Routes classified signaling messages to registered sessions
pub struct MessageRouter {
    registry: Arc<SessionRegistry>,
}

impl MessageRouter {
    /// Create a router over the given registry
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Classify a raw frame into a typed message
    ///
    /// Returns `Ok(None)` for well-formed envelopes whose `message_type` is
    /// not part of the protocol. A known kind with a malformed payload is a
    /// `Parse` error.
    pub fn classify(raw: &str) -> Result<Option<InboundMessage>> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| Error::Parse(format!("invalid JSON envelope: {}", e)))?;

        let kind = value
            .get("message_type")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| Error::Parse("envelope has no message_type".to_string()))?;

        match kind.as_str() {
            "offer" | "answer" | "iceCandidate" => {
                let message = serde_json::from_value(value).map_err(|e| {
                    Error::Parse(format!("malformed {} payload: {}", kind, e))
                })?;
                Ok(Some(message))
            }
            other => {
                warn!(message_type = %other, "ignoring unknown message kind");
                Ok(None)
            }
        }
    }

    /// Classify and apply one raw frame
    ///
    /// Recoverable failures are reported to the addressed session's peer and
    /// swallowed; only session-fatal errors propagate, so the caller can tear
    /// the connection down.
    pub async fn dispatch(&self, raw: &str) -> Result<()> {
        let message = match Self::classify(raw) {
            Ok(Some(message)) => message,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!("dropping unparseable frame: {}", e);
                return Ok(());
            }
        };

        let session = match self.registry.get(message.token()).await {
            Ok(session) => session,
            Err(e) => {
                warn!(
                    token = %message.token(),
                    kind = %message.kind(),
                    "dropping message for unknown session: {}",
                    e
                );
                return Ok(());
            }
        };

        let outcome = match message {
            // The server is always the offerer; a client offer has no
            // defined behavior on this channel.
            InboundMessage::Offer { token, .. } => {
                debug!(session_id = %token, "ignoring client-initiated offer");
                Ok(())
            }
            InboundMessage::Answer { answer, .. } => session.apply_remote_answer(answer).await,
            InboundMessage::IceCandidate { candidate, .. } => {
                session.add_remote_candidate(candidate).await
            }
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(e) if e.is_session_fatal() => {
                session.notify_error(e.to_string());
                Err(e)
            }
            Err(e) => {
                debug!(session_id = %session.id(), "recoverable dispatch error: {}", e);
                session.notify_error(e.to_string());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SdpKind;

    #[test]
    fn test_classify_answer() {
        let raw = r#"{"message_type":"answer","token":"T","answer":{"type":"answer","sdp":"v=0"}}"#;
        let message = MessageRouter::classify(raw).unwrap().unwrap();

        match message {
            InboundMessage::Answer { token, answer } => {
                assert_eq!(token, "T");
                assert_eq!(answer.kind, SdpKind::Answer);
            }
            other => panic!("expected answer, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_unknown_kind_is_none() {
        let raw = r#"{"message_type":"ping","token":"T"}"#;
        assert!(MessageRouter::classify(raw).unwrap().is_none());
    }

    #[test]
    fn test_classify_missing_kind_is_parse_error() {
        let raw = r#"{"token":"T"}"#;
        let err = MessageRouter::classify(raw).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_classify_known_kind_malformed_payload() {
        // iceCandidate without the candidate fields
        let raw = r#"{"message_type":"iceCandidate","token":"T"}"#;
        let err = MessageRouter::classify(raw).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_classify_non_json_frame() {
        assert!(MessageRouter::classify("not json").is_err());
    }

    #[tokio::test]
    async fn test_dispatch_unknown_token_dropped() {
        let router = MessageRouter::new(Arc::new(SessionRegistry::new()));
        let raw = r#"{"message_type":"answer","token":"nope","answer":{"type":"answer","sdp":"v=0"}}"#;
        // Unknown sessions never tear the connection down
        router.dispatch(raw).await.unwrap();
    }

    #[tokio::test]
    async fn test_dispatch_garbage_dropped() {
        let router = MessageRouter::new(Arc::new(SessionRegistry::new()));
        router.dispatch("{{{{").await.unwrap();
    }
}
