//! Peer-to-peer session negotiation over an out-of-band signaling log.
//!
//! Two roles negotiate a connection: an [`InitiatorSession`] proposes the
//! session (channel creation, offer, candidate gathering) and a
//! [`ResponderSession`] accepts it and produces the answer. Every local
//! description and discovered candidate is appended to a newline-delimited
//! JSON log ([`SignalingLog`]); the rendered text is the entire signaling
//! contract and travels out of band (relay, QR code, copy-paste). The record
//! shapes match the browser's `RTCSessionDescriptionInit` and
//! `RTCIceCandidateInit`, so logs interoperate with JavaScript peers.
//!
//! The network transport sits behind the [`PeerTransport`] trait;
//! [`RtcTransport`] is the production implementation over the `webrtc`
//! crate.
//!
//! ```no_run
//! use peerlink::{ChannelOptions, InitiatorSession, OfferOptions, ResponderSession,
//!     RtcConfig, RtcTransport};
//!
//! # async fn run() -> peerlink::Result<()> {
//! let config = RtcConfig::default();
//! let initiator = InitiatorSession::new(RtcTransport::new(&config).await?);
//! let offer_text = initiator
//!     .propose_data_channel("chat", &ChannelOptions::default(), &OfferOptions::default())
//!     .await?;
//!
//! // offer_text travels out of band to the responder...
//! let responder = ResponderSession::new(RtcTransport::new(&config).await?);
//! responder.accept_offer(&offer_text).await?;
//! responder.wait_until_complete().await;
//!
//! // ...and the answer travels back.
//! initiator.accept_answer(&responder.answer()).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod rtc;
pub mod session;
pub mod signaling;
pub mod transport;

pub use config::RtcConfig;
pub use connection::ConnectionHandle;
pub use error::{NegotiationError, Result};
pub use rtc::{RtcChannel, RtcTransport};
pub use session::{InitiatorSession, Phase, ResponderSession, Role};
pub use signaling::{CandidateInit, SdpKind, SessionDescription, SignalingEvent, SignalingLog};
pub use transport::{
    AnswerOptions, CandidateSink, ChannelOptions, ChannelSink, DataChannel, GatheringSink,
    GatheringState, OfferOptions, PeerTransport, TrackEndpoint, TransportError,
};
