//! Anonymous message transmission: fixed-role transmission of an
//! AMDC-encoded bitstring through parity rounds, and the full orchestrator
//! gluing collision detection, notification and fixed-role transmission
//! together.

use crate::amdc;
use crate::error::{ProtocolError, Result};
use crate::mailbox::Phase;
use crate::participant::{CollisionDetectionResult, Participant};
use crate::transport::Transport;
use rand::{CryptoRng, Rng};
use tracing::debug;

/// Outcome of a full message-transmission run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransmissionStatus {
    /// No participant wanted to send; aborted silently.
    NoSender,
    /// Two or more candidate senders collided; aborted.
    Collision,
    /// Notification and transmission ran to completion.
    Completed,
}

impl<T: Transport> Participant<T> {
    /// Fixed-role transmission of `bit_count` bits, with the sender and
    /// receiver roles already assigned. Establishes the group order first.
    ///
    /// At most one participant may be sender and at most one receiver;
    /// everyone else helps by feeding zeros into the parity rounds.
    pub fn execute_fixed_role_message_transmission<RNG: CryptoRng + Rng>(
        &mut self,
        security: usize,
        bit_count: usize,
        rng: &mut RNG,
    ) -> Result<()> {
        self.create_order_in_all_node_ids()?;
        self.execute_fixed_role_rounds(security, bit_count, rng)
    }

    pub(crate) fn execute_fixed_role_rounds<RNG: CryptoRng + Rng>(
        &mut self,
        security: usize,
        bit_count: usize,
        rng: &mut RNG,
    ) -> Result<()> {
        debug!(
            node = %self.node_id(),
            sender = self.is_message_sender,
            receiver = self.is_message_receiver,
            bit_count,
            "fixed-role transmission started"
        );
        self.message_amdc_encoded_received.clear();
        self.message_amdc_decoded_received.clear();

        if self.is_message_receiver {
            self.one_time_pad = (0..bit_count).map(|_| rng.gen::<bool>()).collect();
        }
        if self.is_message_sender {
            let encoded = amdc::encode(&self.message_input, security, rng)?;
            if encoded.len() != bit_count {
                return Err(ProtocolError::BadLength {
                    expected: bit_count,
                    actual: encoded.len(),
                });
            }
            self.message_amdc_encoded_input = encoded;
        }

        for round in 0..bit_count {
            self.set_parity_input_by_message_role(round);
            self.execute_parity(rng)?;
            self.add_to_received_message(round);
        }

        if self.is_message_receiver {
            let (ok, decoded) = amdc::decode(
                &self.message_amdc_encoded_received,
                self.message_length,
                security,
            )?;
            debug!(node = %self.node_id(), ok, "codeword verified");
            self.message_amdc_decoded_received = decoded;
            self.veto_input = !ok;
        } else {
            self.veto_input = false;
            self.message_amdc_decoded_received = self.message_amdc_encoded_received.clone();
        }

        // a veto of 1 signals tampering or clashing inputs at the parity
        // layer, detected by the receiver's AMDC check
        self.execute_veto_rounds(security, rng)?;

        debug!(
            node = %self.node_id(),
            veto = self.veto_result as u8,
            message = %self.received_message(),
            "fixed-role transmission finished"
        );
        self.finished_barrier(Phase::FixedMessage)?;
        Ok(())
    }

    // sender plays the codeword, receiver plays its pad, helpers play zeros
    fn set_parity_input_by_message_role(&mut self, round: usize) {
        if self.is_message_sender {
            self.parity_input = self.message_amdc_encoded_input[round];
        } else if self.is_message_receiver {
            self.parity_input = self.one_time_pad[round];
        } else {
            self.parity_input = false;
        }
    }

    // the receiver strips its pad; everyone else keeps the raw parity trace
    fn add_to_received_message(&mut self, round: usize) {
        if self.is_message_receiver {
            self.message_amdc_encoded_received
                .push(self.parity_result ^ self.one_time_pad[round]);
        } else {
            self.message_amdc_encoded_received.push(self.parity_result);
        }
    }

    /// The full anonymous transmission: derive the candidate sender from the
    /// notification input, detect collisions, notify the receiver, then run
    /// the fixed-role transmission. Returns after the closing barrier (or
    /// after a group-consistent abort).
    pub fn execute_message_transmission<RNG: CryptoRng + Rng>(
        &mut self,
        security: usize,
        rng: &mut RNG,
    ) -> Result<TransmissionStatus> {
        debug!(node = %self.node_id(), "message transmission started");
        self.reset_transient_state();
        self.create_order_in_all_node_ids()?;

        if self.notification_input.is_some() {
            self.is_message_sender = true;
        }
        self.collision_detection_input = self.is_message_sender;

        match self.execute_collision_detection_rounds(security, rng)? {
            CollisionDetectionResult::NoSender => {
                debug!(node = %self.node_id(), "nobody wants to send, aborting");
                return Ok(TransmissionStatus::NoSender);
            }
            CollisionDetectionResult::SingleSender => {}
            CollisionDetectionResult::Collision => {
                self.collision_detection_result = CollisionDetectionResult::NoSender;
                debug!(node = %self.node_id(), "sender collision, aborting");
                return Ok(TransmissionStatus::Collision);
            }
        }

        self.execute_notification_rounds(security, rng)?;
        if self.notification_result {
            self.is_message_receiver = true;
        }

        let bit_count = amdc::encoded_length(security, self.message_length);
        self.execute_fixed_role_rounds(security, bit_count, rng)?;

        self.finished_barrier(Phase::Message)?;
        debug!(node = %self.node_id(), "message transmission finished");
        Ok(TransmissionStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::local::LocalTransport;

    type Configure = fn(&mut Participant<LocalTransport>);

    fn run_transmission(
        ids: &[&str],
        configure: Configure,
        security: usize,
    ) -> Vec<(Participant<LocalTransport>, TransmissionStatus)> {
        let participants = Participant::connect_local(ids);
        let handles = participants
            .into_iter()
            .map(|mut p| {
                std::thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    configure(&mut p);
                    let status = p.execute_message_transmission(security, &mut rng).unwrap();
                    (p, status)
                })
            })
            .collect::<Vec<_>>();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn test_transmission_delivers_to_the_notified_node() {
        // security 12: the receiver misses its notification with
        // probability 2^-12, everything else is deterministic
        let outcomes = run_transmission(
            &["1", "2", "3"],
            |p| {
                if p.node_id() == "1" {
                    p.set_message_input("Hello 2!").unwrap();
                    p.set_notification_input(Some("2")).unwrap();
                }
            },
            12,
        );

        for (p, status) in &outcomes {
            assert_eq!(*status, TransmissionStatus::Completed);
            assert!(!p.veto_result(), "node {} saw a veto", p.node_id());
        }

        let sender = &outcomes[0].0;
        assert!(sender.is_message_sender());
        assert!(!sender.is_message_receiver());

        let receiver = &outcomes[1].0;
        assert!(receiver.is_message_receiver());
        assert_eq!(receiver.received_message(), "Hello 2!");

        let helper = &outcomes[2].0;
        assert!(!helper.is_message_sender());
        assert!(!helper.is_message_receiver());
        assert_ne!(helper.received_message(), "Hello 2!");
    }

    #[test]
    fn test_transmission_without_sender_aborts() {
        let outcomes = run_transmission(&["1", "2", "3"], |_| {}, 3);
        for (p, status) in &outcomes {
            assert_eq!(*status, TransmissionStatus::NoSender);
            assert_eq!(
                p.collision_detection_result(),
                CollisionDetectionResult::NoSender
            );
            assert!(!p.is_message_receiver());
        }
    }

    #[test]
    fn test_transmission_with_two_senders_aborts() {
        let outcomes = run_transmission(
            &["1", "2", "3"],
            |p| {
                if p.node_id() != "3" {
                    p.set_message_input("clashing").unwrap();
                    p.set_notification_input(Some("3")).unwrap();
                }
            },
            6,
        );
        for (p, status) in &outcomes {
            assert_eq!(*status, TransmissionStatus::Collision);
            // the collision result is folded back to "no sender" on abort
            assert_eq!(
                p.collision_detection_result(),
                CollisionDetectionResult::NoSender
            );
        }
    }

    #[test]
    fn test_repeated_transmissions_reuse_the_participant() {
        let participants = Participant::connect_local(&["1", "2", "3"]);
        let handles = participants
            .into_iter()
            .map(|mut p| {
                std::thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    if p.node_id() == "3" {
                        p.set_message_input("again...").unwrap();
                        p.set_notification_input(Some("1")).unwrap();
                    }
                    let first = p.execute_message_transmission(12, &mut rng).unwrap();
                    let second = p.execute_message_transmission(12, &mut rng).unwrap();
                    (p, first, second)
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            let (p, first, second) = handle.join().unwrap();
            assert_eq!(first, TransmissionStatus::Completed);
            assert_eq!(second, TransmissionStatus::Completed);
            if p.node_id() == "1" {
                assert!(p.is_message_receiver());
                assert_eq!(p.received_message(), "again...");
            }
        }
    }

    #[test]
    fn test_fixed_role_delivers_with_preassigned_roles() {
        let security = 5;
        let bit_count = amdc::encoded_length(security, 64);
        let participants = Participant::connect_local(&["1", "2", "3"]);
        let handles = participants
            .into_iter()
            .map(|mut p| {
                std::thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    match p.node_id() {
                        "1" => {
                            p.set_message_sender(true);
                            p.set_message_input("fixed!!!").unwrap();
                        }
                        "2" => p.set_message_receiver(true),
                        _ => {}
                    }
                    p.execute_fixed_role_message_transmission(security, bit_count, &mut rng)
                        .unwrap();
                    p
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            let p = handle.join().unwrap();
            assert!(!p.veto_result());
            if p.node_id() == "2" {
                assert_eq!(p.received_message(), "fixed!!!");
            }
        }
    }

    #[test]
    fn test_clashing_senders_trip_the_receiver_veto() {
        // two senders with different codewords: the receiver reconstructs
        // their XOR and the AMDC check fails (a tag collision has
        // probability about 2^-gamma)
        let security = 8;
        let bit_count = amdc::encoded_length(security, 64);
        let participants = Participant::connect_local(&["1", "2", "3"]);
        let handles = participants
            .into_iter()
            .map(|mut p| {
                std::thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    match p.node_id() {
                        "1" => {
                            p.set_message_sender(true);
                            p.set_message_input("AAAAAAAA").unwrap();
                        }
                        "2" => {
                            p.set_message_sender(true);
                            p.set_message_input("BBBBBBBB").unwrap();
                        }
                        _ => p.set_message_receiver(true),
                    }
                    p.execute_fixed_role_message_transmission(security, bit_count, &mut rng)
                        .unwrap();
                    p.veto_result()
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            assert!(handle.join().unwrap(), "tampered codeword went unvetoed");
        }
    }

    #[test]
    fn test_wrong_bit_count_is_a_bad_length() {
        // the sender fails before any network round, so no peers are needed
        let mut participants = Participant::connect_local(&["1"]);
        let mut p = participants.pop().unwrap();
        let mut rng = rand::thread_rng();

        p.set_message_sender(true);
        p.set_message_input("8 chars!").unwrap();
        // 16 bits cannot carry the 99-bit codeword of (beta = 5, m = 64)
        let err = p
            .execute_fixed_role_message_transmission(5, 16, &mut rng)
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::BadLength {
                expected: 16,
                actual: 99
            }
        ));
    }
}
