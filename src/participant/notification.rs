//! Notification: one sender covertly marks one recipient.
//!
//! Parity rounds run in one-sided mode: every participant except the round's
//! spectator sends its XOR value to the spectator alone instead of
//! broadcasting, so only the spectator learns the round's parity. Over
//! `security` rounds per spectator, the intended recipient sees a 1 with
//! probability at least `1 - 2^-security`; everyone else learns nothing.

use crate::error::Result;
use crate::mailbox::Phase;
use crate::participant::Participant;
use crate::transport::{ProtocolMsg, Transport};
use itertools::iproduct;
use rand::{CryptoRng, Rng};
use tracing::{debug, trace};

impl<T: Transport> Participant<T> {
    /// Run the notification protocol, establishing the group order first.
    /// Returns whether this participant was notified.
    pub fn execute_notification<RNG: CryptoRng + Rng>(
        &mut self,
        security: usize,
        rng: &mut RNG,
    ) -> Result<bool> {
        self.create_order_in_all_node_ids()?;
        self.execute_notification_rounds(security, rng)
    }

    pub(crate) fn execute_notification_rounds<RNG: CryptoRng + Rng>(
        &mut self,
        security: usize,
        rng: &mut RNG,
    ) -> Result<bool> {
        debug!(node = %self.node_id(), target = ?self.notification_input, "notification started");
        for (spectator, round) in iproduct!(self.all_node_ids.clone(), 1..=security) {
            trace!(node = %self.node_id(), %spectator, round, "notification parity round");
            self.set_parity_input_by_notification_input(&spectator, rng);

            let own_xor = self.distribute_key_bits(rng)?;

            if spectator == self.transport.node_id() {
                let received = self.mailbox.wait_broadcasts(self.transport.peer_count())?;
                let result = received.into_iter().fold(own_xor, |acc, bit| acc ^ bit);
                self.parity_result = result;
                self.notification_result |= result;
                trace!(node = %self.node_id(), result = result as u8, "spectator parity");
            } else {
                self.transport
                    .send_to(&spectator, &ProtocolMsg::ParityKeyXorResult(own_xor as u8))?;
            }

            self.parity_input = false;
            self.finished_barrier(Phase::Parity)?;
        }
        self.finished_barrier(Phase::Notification)?;
        debug!(node = %self.node_id(), result = self.notification_result as u8, "notification finished");
        Ok(self.notification_result)
    }

    // only rounds whose spectator is the chosen target get a live coin
    fn set_parity_input_by_notification_input<RNG: CryptoRng + Rng>(
        &mut self,
        spectator: &str,
        rng: &mut RNG,
    ) {
        if self.notification_input.as_deref() == Some(spectator) {
            self.parity_input = rng.gen();
        } else {
            self.parity_input = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::local::LocalTransport;

    fn run_notification(ids: &[&str], targets: &[Option<&str>], security: usize) -> Vec<bool> {
        let participants = Participant::<LocalTransport>::connect_local(ids);
        let handles = participants
            .into_iter()
            .zip(targets.to_vec())
            .map(|(mut p, target)| {
                let target = target.map(str::to_string);
                std::thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    p.set_notification_input(target.as_deref()).unwrap();
                    p.execute_notification(security, &mut rng).unwrap()
                })
            })
            .collect::<Vec<_>>();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn test_only_the_target_is_notified() {
        // the target misses with probability 2^-12; everyone else outputs 0
        // with certainty
        let results = run_notification(&["1", "2", "3"], &[Some("2"), None, None], 12);
        assert_eq!(results, vec![false, true, false]);
    }

    #[test]
    fn test_nobody_notifies() {
        let results = run_notification(&["1", "2", "3"], &[None, None, None], 4);
        assert_eq!(results, vec![false, false, false]);
    }
}
