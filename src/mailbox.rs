//! Round mailbox and finished barriers.
//!
//! Every inbound record lands in the bucket matching its tag; the protocol
//! driver blocks until a bucket holds an expected number of values and
//! consumes them in one go. Buckets are multisets: XOR and the finished
//! rosters are commutative, so arrival order never matters. Receiving exactly
//! *k* values from an unbounded channel is the whole "wait until the bucket
//! has size *k*, then clear it" contract, with no polling.
//!
//! The transport reader is the sole producer, the driver the sole consumer.

use crate::error::{ProtocolError, Result};
use crate::transport::{MessageSink, ProtocolMsg};
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// The subprotocols that close with a `*_finished` broadcast+wait barrier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// One anonymous-XOR round.
    Parity,
    /// Anonymous OR.
    Veto,
    /// Sender-count classification.
    CollisionDetection,
    /// Covert receiver marking.
    Notification,
    /// Fixed-role transmission.
    FixedMessage,
    /// Full message transmission.
    Message,
}

const PHASES: usize = 6;

impl Phase {
    /// The wire record announcing completion of this phase.
    pub fn finished_msg(self) -> ProtocolMsg {
        match self {
            Phase::Parity => ProtocolMsg::ParityFinished(true),
            Phase::Veto => ProtocolMsg::VetoFinished(true),
            Phase::CollisionDetection => ProtocolMsg::CollisionDetectionFinished(true),
            Phase::Notification => ProtocolMsg::NotificationFinished(true),
            Phase::FixedMessage => ProtocolMsg::FixedMessageFinished(true),
            Phase::Message => ProtocolMsg::MessageFinished(true),
        }
    }

    fn index(self) -> usize {
        match self {
            Phase::Parity => 0,
            Phase::Veto => 1,
            Phase::CollisionDetection => 2,
            Phase::Notification => 3,
            Phase::FixedMessage => 4,
            Phase::Message => 5,
        }
    }
}

struct Bucket<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Bucket<T> {
    fn new() -> Self {
        let (tx, rx) = unbounded();
        Bucket { tx, rx }
    }
}

/// Typed inbox shared between the transport readers (producers) and the
/// protocol driver (consumer).
pub struct Mailbox {
    node_ids: Bucket<String>,
    shared_keys: Bucket<bool>,
    broadcasts: Bucket<bool>,
    finished: [Bucket<()>; PHASES],
    deadline: Option<Duration>,
    poisoned: AtomicBool,
}

impl Mailbox {
    /// A mailbox whose waits block indefinitely (a hung peer hangs the
    /// protocol, which is the documented default).
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A mailbox whose waits give up after `deadline` per awaited record,
    /// raising `PeerTimeout` and poisoning the mailbox: once a round has
    /// failed mid-flight the protocol cannot safely resume.
    pub fn with_deadline(deadline: Duration) -> Self {
        Self::build(Some(deadline))
    }

    fn build(deadline: Option<Duration>) -> Self {
        Mailbox {
            node_ids: Bucket::new(),
            shared_keys: Bucket::new(),
            broadcasts: Bucket::new(),
            finished: [
                Bucket::new(),
                Bucket::new(),
                Bucket::new(),
                Bucket::new(),
                Bucket::new(),
                Bucket::new(),
            ],
            deadline,
            poisoned: AtomicBool::new(false),
        }
    }

    /// Classify one inbound record into its bucket. Bit-valued tags accept
    /// their `{0,1}` wire domain.
    pub fn deliver(&self, msg: ProtocolMsg) {
        match msg {
            ProtocolMsg::NodeId(id) => {
                let _ = self.node_ids.tx.send(id);
            }
            ProtocolMsg::ParitySharedKey(bit) => {
                let _ = self.shared_keys.tx.send(bit != 0);
            }
            ProtocolMsg::ParityKeyXorResult(bit) => {
                let _ = self.broadcasts.tx.send(bit != 0);
            }
            ProtocolMsg::ParityFinished(_) => {
                let _ = self.finished[Phase::Parity.index()].tx.send(());
            }
            ProtocolMsg::VetoFinished(_) => {
                let _ = self.finished[Phase::Veto.index()].tx.send(());
            }
            ProtocolMsg::CollisionDetectionFinished(_) => {
                let _ = self.finished[Phase::CollisionDetection.index()].tx.send(());
            }
            ProtocolMsg::NotificationFinished(_) => {
                let _ = self.finished[Phase::Notification.index()].tx.send(());
            }
            ProtocolMsg::FixedMessageFinished(_) => {
                let _ = self.finished[Phase::FixedMessage.index()].tx.send(());
            }
            ProtocolMsg::MessageFinished(_) => {
                let _ = self.finished[Phase::Message.index()].tx.send(());
            }
        }
    }

    fn collect<T>(&self, bucket: &Bucket<T>, count: usize) -> Result<Vec<T>> {
        if self.poisoned.load(Ordering::Acquire) {
            return Err(ProtocolError::PeerTimeout);
        }
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let value = match self.deadline {
                None => bucket
                    .rx
                    .recv()
                    .map_err(|e| ProtocolError::TransportClosed(e.to_string()))?,
                Some(deadline) => match bucket.rx.recv_timeout(deadline) {
                    Ok(value) => value,
                    Err(RecvTimeoutError::Timeout) => {
                        self.poisoned.store(true, Ordering::Release);
                        return Err(ProtocolError::PeerTimeout);
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(ProtocolError::TransportClosed(
                            "mailbox producer disconnected".into(),
                        ))
                    }
                },
            };
            values.push(value);
        }
        Ok(values)
    }

    /// Block until `count` handshake ids have arrived and take them.
    pub fn wait_node_ids(&self, count: usize) -> Result<Vec<String>> {
        self.collect(&self.node_ids, count)
    }

    /// Block until `count` share bits have arrived and take them.
    pub fn wait_shared_keys(&self, count: usize) -> Result<Vec<bool>> {
        self.collect(&self.shared_keys, count)
    }

    /// Block until `count` broadcast XOR values have arrived and take them.
    pub fn wait_broadcasts(&self, count: usize) -> Result<Vec<bool>> {
        self.collect(&self.broadcasts, count)
    }

    /// Block until `count` peers have announced they finished `phase`,
    /// clearing the roster.
    pub fn wait_finished(&self, phase: Phase, count: usize) -> Result<()> {
        self.collect(&self.finished[phase.index()], count)?;
        Ok(())
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Mailbox::new()
    }
}

impl MessageSink for Mailbox {
    fn on_message(&self, _from: &str, msg: ProtocolMsg) {
        self.deliver(msg);
    }
}
