//! Error types for session negotiation.

use thiserror::Error;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum NegotiationError {
    /// A line in the signaling text was not valid JSON or did not match
    /// either record shape. Carries the zero-based line index within the
    /// input text and the raw line.
    #[error("malformed signaling event at line {line}: {raw}")]
    MalformedEvent {
        line: usize,
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    /// An operation was attempted in a phase of the negotiation that does
    /// not allow it, e.g. an answer applied before any local offer exists.
    #[error("invalid negotiation transition: {0}")]
    InvalidTransition(String),

    /// No data channel is registered under the requested label.
    #[error("no data channel registered under label {0:?}")]
    UnknownChannel(String),

    /// The underlying transport rejected an operation.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, NegotiationError>;
