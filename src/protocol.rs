//! Wire envelope types for the signaling channel
//!
//! Every inbound and outbound frame is a JSON object carrying a
//! `message_type` tag and the session `token`, plus kind-specific fields.

use serde::{Deserialize, Serialize};

/// Kind of a session description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// Locally generated offer
    Offer,
    /// Remote peer's answer
    Answer,
}

/// A parsed session description (type + SDP body)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Description type
    #[serde(rename = "type")]
    pub kind: SdpKind,

    /// SDP body
    pub sdp: String,
}

/// An ICE candidate as carried over the signaling channel
///
/// The same shape is used for inbound remote candidates and for serializing
/// locally discovered candidates, so a discovered candidate round-trips
/// through the wire format unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Media stream identification tag
    pub sdp_mid: String,

    /// Index of the media description the candidate belongs to
    pub sdp_mline_index: u16,

    /// The candidate attribute line
    pub sdp: String,
}

/// Classified inbound signaling message
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "message_type")]
pub enum InboundMessage {
    /// Client-initiated offer. Classified for completeness; the server is
    /// always the offerer, so these carry no defined behavior and are dropped.
    #[serde(rename = "offer")]
    Offer {
        /// Session identifier
        token: String,
        /// Serialized SDP offer
        offer: String,
    },

    /// Remote answer to our offer
    #[serde(rename = "answer")]
    Answer {
        /// Session identifier
        token: String,
        /// The answer description
        answer: SessionDescription,
    },

    /// Remote ICE candidate
    #[serde(rename = "iceCandidate")]
    IceCandidate {
        /// Session identifier
        token: String,
        /// Candidate fields, carried at the envelope top level
        #[serde(flatten)]
        candidate: IceCandidate,
    },
}

impl InboundMessage {
    /// The session identifier this message is addressed to
    pub fn token(&self) -> &str {
        match self {
            InboundMessage::Offer { token, .. } => token,
            InboundMessage::Answer { token, .. } => token,
            InboundMessage::IceCandidate { token, .. } => token,
        }
    }

    /// The wire name of this message kind
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::Offer { .. } => "offer",
            InboundMessage::Answer { .. } => "answer",
            InboundMessage::IceCandidate { .. } => "iceCandidate",
        }
    }
}

/// Outbound signaling message, before envelope serialization
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Finalized local offer for the peer
    Offer {
        /// Serialized SDP offer
        sdp: String,
    },

    /// Locally discovered ICE candidate
    IceCandidate {
        /// The candidate to forward
        candidate: IceCandidate,
    },

    /// Session-scoped failure report
    Error {
        /// Human-readable description
        detail: String,
    },
}

#[derive(Serialize)]
#[serde(tag = "message_type")]
enum OutboundEnvelope<'a> {
    #[serde(rename = "offer")]
    Offer { token: &'a str, offer: &'a str },
    #[serde(rename = "iceCandidate")]
    IceCandidate { token: &'a str, icecandidate: String },
    #[serde(rename = "error")]
    Error { token: &'a str, error: &'a str },
}

impl OutboundMessage {
    /// Serialize into the wire envelope for the given session
    pub fn to_envelope(&self, token: &str) -> crate::Result<String> {
        let envelope = match self {
            OutboundMessage::Offer { sdp } => OutboundEnvelope::Offer { token, offer: sdp },
            OutboundMessage::IceCandidate { candidate } => OutboundEnvelope::IceCandidate {
                token,
                icecandidate: serde_json::to_string(candidate).map_err(|e| {
                    crate::Error::SerializationError(format!(
                        "Failed to serialize ICE candidate: {}",
                        e
                    ))
                })?,
            },
            OutboundMessage::Error { detail } => OutboundEnvelope::Error {
                token,
                error: detail,
            },
        };

        serde_json::to_string(&envelope).map_err(|e| {
            crate::Error::SerializationError(format!(
                "Failed to serialize outbound envelope: {}",
                e
            ))
        })
    }
}
