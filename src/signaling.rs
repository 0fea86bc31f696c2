//! Signaling wire format: typed events and the append-only event log.
//!
//! The log serializes as newline-delimited JSON, one record per line, using
//! the browser's `RTCSessionDescriptionInit` / `RTCIceCandidateInit` JSON
//! shapes so rendered logs interoperate with JavaScript peers:
//!
//! ```text
//! {"type":"sdp","sdp":{"type":"offer","sdp":"..."}}
//! {"type":"ice","candidate":{"candidate":"...","sdpMid":"0","sdpMLineIndex":0}}
//! ```

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{NegotiationError, Result};

/// Whether a session description proposes or accepts a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

impl std::fmt::Display for SdpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SdpKind::Offer => write!(f, "offer"),
            SdpKind::Answer => write!(f, "answer"),
        }
    }
}

/// A local or remote session description, tagged as offer or answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A discovered network path descriptor, in `RTCIceCandidateInit` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateInit {
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
}

/// One record of the signaling log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalingEvent {
    Sdp { sdp: SessionDescription },
    Ice { candidate: CandidateInit },
}

impl SignalingEvent {
    pub fn description(sdp: SessionDescription) -> Self {
        SignalingEvent::Sdp { sdp }
    }

    pub fn candidate(candidate: CandidateInit) -> Self {
        SignalingEvent::Ice { candidate }
    }
}

/// Append-only, line-delimited event log. Events are immutable once
/// appended and ordering is significant: the first description is the
/// authoritative local description, candidates may follow interleaved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalingLog {
    lines: Vec<String>,
}

impl SignalingLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize `event` to one line and append it. Never reorders and
    /// never touches previously appended lines.
    pub fn append(&mut self, event: &SignalingEvent) {
        match serde_json::to_string(event) {
            Ok(line) => self.lines.push(line),
            Err(err) => warn!("failed to encode signaling event: {err}"),
        }
    }

    /// The full log as text, every record followed by a newline. This is
    /// the message handed to the remote peer.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Parse signaling text into events, aborting at the first malformed
    /// line. Events parsed before the failure are not returned; callers that
    /// need apply-as-you-go semantics use [`SignalingLog::parse_lines`].
    pub fn parse(text: &str) -> Result<Vec<SignalingEvent>> {
        Self::parse_lines(text).collect()
    }

    /// Iterate over the non-blank lines of `text`, yielding one parsed event
    /// per line. A malformed line yields [`NegotiationError::MalformedEvent`]
    /// carrying the zero-based line index within `text`.
    pub fn parse_lines(text: &str) -> impl Iterator<Item = Result<SignalingEvent>> + '_ {
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str(line).map_err(|source| NegotiationError::MalformedEvent {
                    line: index,
                    raw: line.to_string(),
                    source,
                })
            })
    }
}
