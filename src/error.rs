//! Error taxonomy of the protocol layer.
//!
//! Veto / collision-detection "bad" outcomes are protocol results, not errors;
//! the AMDC tamper case is signalled through the post-transmission veto round.

use thiserror::Error;

/// Errors surfaced to the protocol driver. No local retry is attempted.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Inbound message with an unrecognized key. Fatal: the group is
    /// desynchronized.
    #[error("unknown message tag in frame: {0}")]
    UnknownTag(String),

    /// No irreducible polynomial is tabulated for this gamma.
    #[error("no irreducible polynomial tabulated for gamma = {0}")]
    UnknownGamma(usize),

    /// Codeword length does not match d*gamma + 2*gamma.
    #[error("codeword length mismatch: expected {expected} bits, got {actual}")]
    BadLength {
        /// Length required by the governing (beta, message length).
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },

    /// Two peers reported the same node id during the ordering handshake.
    #[error("two nodes share the node id \"{0}\"")]
    DuplicateId(String),

    /// The notification target equals the participant's own node id.
    #[error("cannot notify yourself (\"{0}\")")]
    SelfNotify(String),

    /// The message does not fit into the configured message length.
    #[error("message longer than {max_chars} characters")]
    MessageTooLong {
        /// Maximum number of 8-bit characters, message_length / 8.
        max_chars: usize,
    },

    /// A round deadline expired while waiting on a mailbox bucket. The
    /// participant state is poisoned; the protocol cannot safely resume.
    #[error("peer did not answer within the round deadline")]
    PeerTimeout,

    /// Socket-level failure; aborts the current protocol.
    #[error("transport closed: {0}")]
    TransportClosed(String),
}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        ProtocolError::TransportClosed(e.to_string())
    }
}

/// Result alias used throughout the protocol layer.
pub type Result<T> = std::result::Result<T, ProtocolError>;
