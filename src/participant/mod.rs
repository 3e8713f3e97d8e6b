//! The layered anonymous-protocol state machine.
//!
//! A [`Participant`] drives five nested subprotocols over a frozen group of
//! pairwise-connected peers: parity (anonymous XOR) at the bottom, then veto
//! (anonymous OR), collision detection, notification, and anonymous message
//! transmission with AMDC tamper detection on top. Every subprotocol closes
//! with a finished barrier so that no record of round *k+1* can contaminate
//! round *k*'s buckets.
//!
//! Protocols from "Information-Theoretic Security Without an Honest
//! Majority" (Broadbent, Tapp). A malicious participant can force an abort;
//! the guarantee is detection, not recovery.

use crate::error::{ProtocolError, Result};
use crate::mailbox::{Mailbox, Phase};
use crate::transport::local::{create_local_mesh, LocalTransport};
use crate::transport::{MessageSink, ProtocolMsg, Transport};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

mod collision_detection;
mod notification;
mod parity;
mod transmission;
mod veto;

pub use collision_detection::CollisionDetectionResult;
pub use transmission::TransmissionStatus;

/// Message length in bits; 8 ASCII characters.
pub const DEFAULT_MESSAGE_LENGTH: usize = 64;

/// One participant of the anonymous-communication group.
///
/// All state is mutated by the single driver thread running the protocol;
/// the transport readers only append to the mailbox buckets.
pub struct Participant<T: Transport> {
    transport: T,
    mailbox: Arc<Mailbox>,

    all_node_ids: Vec<String>,

    parity_input: bool,
    parity_broadcasts_last: bool,
    parity_result: bool,

    veto_input: bool,
    veto_result: bool,

    collision_detection_input: bool,
    collision_detection_result: CollisionDetectionResult,

    notification_input: Option<String>,
    notification_result: bool,

    message_length: usize,
    message_input: Vec<bool>,
    message_amdc_encoded_input: Vec<bool>,
    is_message_sender: bool,
    is_message_receiver: bool,
    message_amdc_encoded_received: Vec<bool>,
    message_amdc_decoded_received: Vec<bool>,
    one_time_pad: Vec<bool>,
}

impl<T: Transport> Participant<T> {
    /// Wrap an established transport and its mailbox. The mailbox must be the
    /// sink the transport's readers deliver into.
    pub fn new(transport: T, mailbox: Arc<Mailbox>) -> Self {
        Participant {
            transport,
            mailbox,
            all_node_ids: Vec::new(),
            parity_input: false,
            parity_broadcasts_last: false,
            parity_result: false,
            veto_input: false,
            veto_result: false,
            collision_detection_input: false,
            collision_detection_result: CollisionDetectionResult::NoSender,
            notification_input: None,
            notification_result: false,
            message_length: DEFAULT_MESSAGE_LENGTH,
            message_input: Vec::new(),
            message_amdc_encoded_input: Vec::new(),
            is_message_sender: false,
            is_message_receiver: false,
            message_amdc_encoded_received: Vec::new(),
            message_amdc_decoded_received: Vec::new(),
            one_time_pad: Vec::new(),
        }
    }

    /// This participant's node id.
    pub fn node_id(&self) -> &str {
        self.transport.node_id()
    }

    /// The underlying transport (e.g. to shut it down after a run).
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Group size: connected peers plus this participant.
    pub fn group_size(&self) -> usize {
        self.transport.peer_count() + 1
    }

    /// The lexicographically sorted ids of the whole group, identical at
    /// every honest participant. Empty until a protocol has run the ordering
    /// handshake.
    pub fn ordered_ids(&self) -> &[String] {
        &self.all_node_ids
    }

    /// Private bit for a standalone parity round.
    pub fn set_parity_input(&mut self, bit: bool) {
        self.parity_input = bit;
    }

    /// Private veto bit.
    pub fn set_veto_input(&mut self, bit: bool) {
        self.veto_input = bit;
    }

    /// Private collision-detection bit ("I want to send").
    pub fn set_collision_detection_input(&mut self, bit: bool) {
        self.collision_detection_input = bit;
    }

    /// Choose the node to notify; `None` means this participant is not a
    /// sender. Rejects the participant's own id.
    pub fn set_notification_input(&mut self, target: Option<&str>) -> Result<()> {
        if let Some(target) = target {
            if target == self.transport.node_id() {
                return Err(ProtocolError::SelfNotify(target.to_string()));
            }
        }
        self.notification_input = target.map(str::to_string);
        Ok(())
    }

    /// Set the message to transmit: ASCII text, right-padded with spaces to
    /// the configured message length and expanded to bits MSB-first per byte.
    pub fn set_message_input(&mut self, message: &str) -> Result<()> {
        let max_chars = self.message_length / 8;
        if message.is_empty() {
            self.message_input.clear();
            return Ok(());
        }
        if message.len() > max_chars {
            return Err(ProtocolError::MessageTooLong { max_chars });
        }
        let mut padded = message.to_string();
        while padded.len() < max_chars {
            padded.push(' ');
        }
        self.message_input = padded
            .bytes()
            .flat_map(|byte| (0..8).rev().map(move |i| byte >> i & 1 == 1))
            .collect();
        Ok(())
    }

    /// Declare this participant the fixed-role sender (standalone use; the
    /// orchestrator derives roles itself).
    pub fn set_message_sender(&mut self, is_sender: bool) {
        self.is_message_sender = is_sender;
    }

    /// Declare this participant the fixed-role receiver (standalone use).
    pub fn set_message_receiver(&mut self, is_receiver: bool) {
        self.is_message_receiver = is_receiver;
    }

    /// Change the message length in bits (a multiple of 8). Clears any
    /// previously set message.
    pub fn set_message_length(&mut self, bits: usize) {
        debug_assert!(bits > 0 && bits % 8 == 0);
        self.message_length = bits;
        self.message_input.clear();
    }

    /// Result of the last parity round.
    pub fn parity_result(&self) -> bool {
        self.parity_result
    }

    /// Result of the last veto: true iff at least one participant vetoed.
    pub fn veto_result(&self) -> bool {
        self.veto_result
    }

    /// Result of the last collision detection.
    pub fn collision_detection_result(&self) -> CollisionDetectionResult {
        self.collision_detection_result
    }

    /// Whether this participant was notified as the receiver.
    pub fn notification_result(&self) -> bool {
        self.notification_result
    }

    /// Whether this participant acted as message sender in the last run.
    pub fn is_message_sender(&self) -> bool {
        self.is_message_sender
    }

    /// Whether this participant acted as message receiver in the last run.
    pub fn is_message_receiver(&self) -> bool {
        self.is_message_receiver
    }

    /// The decoded received message as bits. Meaningful at the receiver;
    /// every other participant holds its cosmetic parity trace.
    pub fn received_message_bits(&self) -> &[bool] {
        &self.message_amdc_decoded_received
    }

    /// The received message rendered as 8-bit characters.
    pub fn received_message(&self) -> String {
        self.message_amdc_decoded_received
            .chunks(8)
            .map(|bits| bits.iter().fold(0u8, |acc, &b| acc << 1 | b as u8) as char)
            .collect()
    }

    /// Reset every field to its initial state, inputs included.
    pub fn clear_all(&mut self) {
        self.reset_transient_state();
        self.notification_input = None;
        self.message_input.clear();
    }

    // Everything a fresh top-level run must not inherit. Inputs survive so
    // results stay readable after a run and a re-run behaves the same.
    pub(crate) fn reset_transient_state(&mut self) {
        self.all_node_ids.clear();
        self.parity_input = false;
        self.parity_broadcasts_last = false;
        self.parity_result = false;
        self.veto_input = false;
        self.veto_result = false;
        self.collision_detection_result = CollisionDetectionResult::NoSender;
        self.notification_result = false;
        self.is_message_sender = false;
        self.is_message_receiver = false;
        self.message_amdc_encoded_input.clear();
        self.message_amdc_encoded_received.clear();
        self.message_amdc_decoded_received.clear();
        self.one_time_pad.clear();
    }

    /// Broadcast own node id, collect every peer's, and sort. The resulting
    /// order is identical at every honest participant; duplicate ids make
    /// the protocols unsound and are fatal.
    pub(crate) fn create_order_in_all_node_ids(&mut self) -> Result<()> {
        self.all_node_ids.clear();
        let own = self.transport.node_id().to_string();
        self.transport.broadcast(&ProtocolMsg::NodeId(own.clone()))?;
        let mut ids = self.mailbox.wait_node_ids(self.transport.peer_count())?;
        ids.push(own);
        ids.sort();
        if let Some(pair) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(ProtocolError::DuplicateId(pair[0].clone()));
        }
        debug!(node = %self.node_id(), order = ?ids, "established group order");
        self.all_node_ids = ids;
        Ok(())
    }

    // broadcast own completion of `phase`, wait for everyone else's, clear
    pub(crate) fn finished_barrier(&self, phase: Phase) -> Result<()> {
        self.transport.broadcast(&phase.finished_msg())?;
        self.mailbox
            .wait_finished(phase, self.transport.peer_count())
    }
}

impl Participant<LocalTransport> {
    /// Build one participant per id over an in-process mesh.
    pub fn connect_local(ids: &[&str]) -> Vec<Self> {
        Self::connect_local_with(ids, None)
    }

    /// Like [`Participant::connect_local`] with an optional per-record round
    /// deadline.
    pub fn connect_local_with(ids: &[&str], deadline: Option<Duration>) -> Vec<Self> {
        create_local_mesh(ids)
            .into_iter()
            .map(|endpoint| {
                let mailbox = Arc::new(match deadline {
                    Some(deadline) => Mailbox::with_deadline(deadline),
                    None => Mailbox::new(),
                });
                let sink: Arc<dyn MessageSink> = mailbox.clone();
                Participant::new(endpoint.start(sink), mailbox)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_notify_rejected() {
        let mut participants = Participant::connect_local(&["1", "2"]);
        let p1 = &mut participants[0];

        let err = p1.set_notification_input(Some("1")).unwrap_err();
        assert!(matches!(err, ProtocolError::SelfNotify(id) if id == "1"));

        p1.set_notification_input(Some("2")).unwrap();
        p1.set_notification_input(None).unwrap();
    }

    #[test]
    fn test_message_padding() {
        let mut participants = Participant::connect_local(&["1", "2"]);
        let p1 = &mut participants[0];

        p1.set_message_input("Hi").unwrap();
        assert_eq!(p1.message_input.len(), 64);
        // 'H' = 0x48, MSB-first
        assert_eq!(
            &p1.message_input[..8],
            &[false, true, false, false, true, false, false, false]
        );
        // padded with spaces (0x20)
        assert_eq!(
            &p1.message_input[56..],
            &[false, false, true, false, false, false, false, false]
        );

        let err = p1.set_message_input("way too long for 8").unwrap_err();
        assert!(matches!(err, ProtocolError::MessageTooLong { max_chars: 8 }));
    }

    #[test]
    fn test_duplicate_id_detected() {
        let participants = Participant::connect_local(&["1", "1", "2"]);
        let handles = participants
            .into_iter()
            .map(|mut p| {
                std::thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    p.execute_veto(3, &mut rng)
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            let err = handle.join().unwrap().unwrap_err();
            assert!(matches!(err, ProtocolError::DuplicateId(id) if id == "1"));
        }
    }

    #[test]
    fn test_peer_timeout_poisons_the_run() {
        let mut participants =
            Participant::connect_local_with(&["1", "2"], Some(Duration::from_millis(100)));
        let _silent = participants.pop().unwrap();
        let mut p1 = participants.pop().unwrap();

        let mut rng = rand::thread_rng();
        p1.set_parity_input(true);
        let err = p1.execute_parity(&mut rng).unwrap_err();
        assert!(matches!(err, ProtocolError::PeerTimeout));
    }
}
