//! The transport capability driven by the negotiation core.
//!
//! Everything network-facing lives behind [`PeerTransport`]: the core only
//! issues the narrow set of operations below and consumes three notification
//! sinks. The production implementation over the `webrtc` crate is in
//! [`crate::rtc`]; tests script their own.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signaling::{CandidateInit, SessionDescription};

/// Progress of ICE candidate gathering. Ordered: observed state never
/// moves backward within a negotiation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GatheringState {
    New,
    Gathering,
    Complete,
}

impl std::fmt::Display for GatheringState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatheringState::New => write!(f, "new"),
            GatheringState::Gathering => write!(f, "gathering"),
            GatheringState::Complete => write!(f, "complete"),
        }
    }
}

/// Creation options for a data channel, mirroring the browser's
/// `RTCDataChannelInit` dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOptions {
    #[serde(default = "default_ordered")]
    pub ordered: bool,
    #[serde(default)]
    pub max_packet_life_time: Option<u16>,
    #[serde(default)]
    pub max_retransmits: Option<u16>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub negotiated: bool,
    #[serde(default)]
    pub id: Option<u16>,
}

fn default_ordered() -> bool {
    true
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            ordered: default_ordered(),
            max_packet_life_time: None,
            max_retransmits: None,
            protocol: None,
            negotiated: false,
            id: None,
        }
    }
}

/// Options applied when creating an offer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferOptions {
    /// Request an ICE restart, beginning a new negotiation round.
    #[serde(default)]
    pub ice_restart: bool,
}

/// Options applied when creating an answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnswerOptions {}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport setup failed: {0}")]
    Setup(String),
    #[error("transport rejected {op}: {reason}")]
    Rejected { op: &'static str, reason: String },
    #[error("transport is closed")]
    Closed,
}

impl TransportError {
    pub fn rejected(op: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Rejected {
            op,
            reason: reason.to_string(),
        }
    }
}

/// Notification sink for discovered ICE candidates.
pub type CandidateSink = Box<dyn Fn(CandidateInit) + Send + Sync>;
/// Notification sink for gathering state changes.
pub type GatheringSink = Box<dyn Fn(GatheringState) + Send + Sync>;
/// Notification sink for data channels announced by the remote side.
pub type ChannelSink = Box<dyn Fn(Arc<dyn DataChannel>) + Send + Sync>;

/// A data channel created locally or announced by the remote peer.
#[async_trait]
pub trait DataChannel: Send + Sync {
    fn label(&self) -> String;

    /// Snapshot of the channel's parameters, used when adopting a channel
    /// that arrived from the remote side.
    fn options(&self) -> ChannelOptions;

    async fn send_text(&self, text: &str) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// A track producer (sender) or consumer (receiver) attached to the
/// connection. The core only ever stops them during teardown.
#[async_trait]
pub trait TrackEndpoint: Send + Sync {
    async fn stop(&self) -> Result<(), TransportError>;
}

/// The opaque connection capability the negotiation core drives.
///
/// Sink registrations take `Option`: passing `None` unsubscribes and is
/// idempotent even if no sink was ever installed.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn create_data_channel(
        &self,
        label: &str,
        options: &ChannelOptions,
    ) -> Result<Arc<dyn DataChannel>, TransportError>;

    async fn create_offer(&self, options: &OfferOptions)
        -> Result<SessionDescription, TransportError>;

    async fn create_answer(
        &self,
        options: &AnswerOptions,
    ) -> Result<SessionDescription, TransportError>;

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError>;

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError>;

    async fn add_ice_candidate(&self, candidate: CandidateInit) -> Result<(), TransportError>;

    async fn local_description(&self) -> Option<SessionDescription>;

    async fn remote_description(&self) -> Option<SessionDescription>;

    fn ice_gathering_state(&self) -> GatheringState;

    fn on_candidate(&self, sink: Option<CandidateSink>);

    fn on_gathering_change(&self, sink: Option<GatheringSink>);

    fn on_remote_channel(&self, sink: Option<ChannelSink>);

    async fn senders(&self) -> Vec<Arc<dyn TrackEndpoint>>;

    async fn receivers(&self) -> Vec<Arc<dyn TrackEndpoint>>;

    async fn transceivers(&self) -> Vec<Arc<dyn TrackEndpoint>>;

    async fn close(&self) -> Result<(), TransportError>;
}
