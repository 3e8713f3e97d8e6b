//! Anonymous one-bit XOR: every participant learns the XOR of all private
//! input bits while any single input stays hidden behind the random shares
//! of the others.

use crate::error::Result;
use crate::mailbox::Phase;
use crate::participant::Participant;
use crate::transport::{ProtocolMsg, Transport};
use rand::{CryptoRng, Rng};
use tracing::trace;

// a uniformly random bit vector of length n whose XOR equals `parity`
fn create_bitstring<RNG: CryptoRng + Rng>(n: usize, parity: bool, rng: &mut RNG) -> Vec<bool> {
    loop {
        let bits = (0..n).map(|_| rng.gen::<bool>()).collect::<Vec<_>>();
        if bits.iter().fold(false, |acc, &b| acc ^ b) == parity {
            return bits;
        }
    }
}

impl<T: Transport> Participant<T> {
    /// One parity round: returns the XOR of all participants' parity inputs.
    ///
    /// Ends with the parity barrier, so a fresh round can start immediately
    /// at every participant.
    pub fn execute_parity<RNG: CryptoRng + Rng>(&mut self, rng: &mut RNG) -> Result<bool> {
        trace!(node = %self.node_id(), input = self.parity_input as u8, "parity round");

        let own_xor = self.distribute_key_bits(rng)?;
        let result = self.calculate_and_broadcast_keys(own_xor)?;
        self.parity_result = result;
        trace!(node = %self.node_id(), result = result as u8, "parity result");

        self.finished_barrier(Phase::Parity)?;
        Ok(result)
    }

    // Split the input bit into a share vector: keep the first share, hand one
    // share to each peer, and fold the shares received in exchange. Which
    // peer gets which index does not matter, XOR is order-free.
    pub(crate) fn distribute_key_bits<RNG: CryptoRng + Rng>(
        &mut self,
        rng: &mut RNG,
    ) -> Result<bool> {
        let n = self.group_size();
        let bitstring = create_bitstring(n, self.parity_input, rng);

        let own_share = bitstring[0];
        for (peer, &bit) in self.transport.peer_ids().iter().zip(&bitstring[1..]) {
            self.transport
                .send_to(peer, &ProtocolMsg::ParitySharedKey(bit as u8))?;
        }

        let received = self.mailbox.wait_shared_keys(n - 1)?;
        Ok(received.into_iter().fold(own_share, |acc, bit| acc ^ bit))
    }

    // Broadcast the XOR over the share bucket and fold everyone's broadcast
    // values. A participant marked broadcasts-last withholds its value until
    // all others have broadcast.
    fn calculate_and_broadcast_keys(&mut self, own_xor: bool) -> Result<bool> {
        let peers = self.transport.peer_count();
        let msg = ProtocolMsg::ParityKeyXorResult(own_xor as u8);

        let received = if self.parity_broadcasts_last {
            let received = self.mailbox.wait_broadcasts(peers)?;
            self.transport.broadcast(&msg)?;
            received
        } else {
            self.transport.broadcast(&msg)?;
            self.mailbox.wait_broadcasts(peers)?
        };

        Ok(received.into_iter().fold(own_xor, |acc, bit| acc ^ bit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::local::LocalTransport;

    fn run_parity(ids: &[&str], inputs: &[bool]) -> Vec<bool> {
        let participants = Participant::<LocalTransport>::connect_local(ids);
        let handles = participants
            .into_iter()
            .zip(inputs.to_vec())
            .map(|(mut p, input)| {
                std::thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    p.set_parity_input(input);
                    p.execute_parity(&mut rng).unwrap()
                })
            })
            .collect::<Vec<_>>();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn test_bitstring_parity_and_length() {
        let mut rng = rand::thread_rng();
        for n in 2..6 {
            for parity in [false, true] {
                let bits = create_bitstring(n, parity, &mut rng);
                assert_eq!(bits.len(), n);
                assert_eq!(bits.iter().fold(false, |acc, &b| acc ^ b), parity);
            }
        }
    }

    #[test]
    fn test_shares_hide_the_input() {
        // the retained share is uniform whatever the input bit: over 1000
        // samples the count of ones stays within 6 sigma (~95) of 500
        let mut rng = rand::thread_rng();
        for parity in [false, true] {
            let ones = (0..1000)
                .filter(|_| create_bitstring(4, parity, &mut rng)[0])
                .count() as i64;
            assert!((ones - 500).abs() < 100, "ones = {}", ones);
        }
    }

    #[test]
    fn test_parity_is_xor_of_all_inputs() {
        // every input vector over three participants
        for combo in 0u8..8 {
            let inputs = [combo & 1 != 0, combo & 2 != 0, combo & 4 != 0];
            let expected = inputs.iter().fold(false, |acc, &b| acc ^ b);
            let results = run_parity(&["1", "2", "3"], &inputs);
            assert_eq!(results, vec![expected; 3], "inputs {:?}", inputs);
        }
    }

    #[test]
    fn test_parity_two_participants() {
        assert_eq!(run_parity(&["1", "2"], &[true, false]), vec![true, true]);
        assert_eq!(run_parity(&["1", "2"], &[true, true]), vec![false, false]);
    }

    #[test]
    fn test_consecutive_rounds_stay_in_sync() {
        let participants = Participant::<LocalTransport>::connect_local(&["1", "2", "3"]);
        let handles = participants
            .into_iter()
            .enumerate()
            .map(|(i, mut p)| {
                std::thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    // rounds with inputs 100, 010, 110, 111
                    let rounds = [i == 0, i == 1, i != 2, true];
                    rounds
                        .iter()
                        .map(|&input| {
                            p.set_parity_input(input);
                            p.execute_parity(&mut rng).unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            assert_eq!(
                handle.join().unwrap(),
                vec![true, true, false, true]
            );
        }
    }
}
