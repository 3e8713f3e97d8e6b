//! Transport layer. Transports move tagged records between identified peers;
//! the protocol core only relies on the contract captured by [`Transport`]
//! and [`MessageSink`]: reliable ordered delivery per pairwise stream,
//! broadcast-to-all, send-to-one-by-id, and one inbound callback per record.
//!
//! Two interchangeable implementations are provided: [`tcp`] for separate
//! processes and [`local`] for in-process meshes (tests, benchmarks).

use crate::error::Result;
use serde::{Deserialize, Serialize};

pub mod local;
pub mod tcp;
pub mod wire;

/// One wire record. Serialization is externally tagged, so the JSON form is a
/// single-key object whose key is the protocol tag, e.g.
/// `{"parity_shared_key": 0}` or `{"veto_finished": true}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolMsg {
    /// Ordering-handshake broadcast of the sender's node id.
    NodeId(String),
    /// One bit of a parity share vector, sent point-to-point.
    ParitySharedKey(u8),
    /// A participant's XOR over its share bucket, broadcast (or sent to the
    /// spectator only, in notification rounds).
    ParityKeyXorResult(u8),
    /// Parity-round barrier token.
    ParityFinished(bool),
    /// Veto barrier token.
    VetoFinished(bool),
    /// Collision-detection barrier token.
    CollisionDetectionFinished(bool),
    /// Notification barrier token.
    NotificationFinished(bool),
    /// Fixed-role transmission barrier token.
    FixedMessageFinished(bool),
    /// Full-transmission barrier token.
    MessageFinished(bool),
}

/// What the protocol core needs from a transport. The peer set is frozen for
/// the duration of a protocol run.
pub trait Transport {
    /// This participant's stable node id.
    fn node_id(&self) -> &str;

    /// Number of currently connected peers (the group has one more member:
    /// this participant).
    fn peer_count(&self) -> usize;

    /// Node ids of the connected peers, in no particular order.
    fn peer_ids(&self) -> Vec<String>;

    /// Deliver `msg` to every connected peer exactly once.
    fn broadcast(&self, msg: &ProtocolMsg) -> Result<()>;

    /// Deliver `msg` to the peer with the given node id. A no-op for unknown
    /// ids.
    fn send_to(&self, peer_id: &str, msg: &ProtocolMsg) -> Result<()>;
}

/// Inbound side of the transport contract: invoked once per received record
/// by the transport's reader thread.
pub trait MessageSink: Send + Sync {
    /// Handle one inbound record from the peer identified by `from`.
    fn on_message(&self, from: &str, msg: ProtocolMsg);
}
