//! Anonymous OR: the result is 1 iff at least one participant vetoes.
//!
//! A vetoing participant feeds a fresh uniform bit into each parity round,
//! so a single round reports the veto with probability 1/2; `security`
//! rounds per rotation position push the false-negative probability below
//! `2^-security`. The "broadcasts last" position rotates over the whole
//! group so no coalition can bias which participant is informed first; the
//! rotation must not be optimized away.

use crate::error::Result;
use crate::mailbox::Phase;
use crate::participant::Participant;
use crate::transport::Transport;
use rand::{CryptoRng, Rng};
use tracing::{debug, trace};

impl<T: Transport> Participant<T> {
    /// Run the veto protocol: establishes the group order, then
    /// `security` parity rounds per last-broadcaster rotation, aborting
    /// early once a round reports 1.
    pub fn execute_veto<RNG: CryptoRng + Rng>(
        &mut self,
        security: usize,
        rng: &mut RNG,
    ) -> Result<bool> {
        self.create_order_in_all_node_ids()?;
        self.execute_veto_rounds(security, rng)
    }

    // the veto rounds proper, reusing the caller's group order
    pub(crate) fn execute_veto_rounds<RNG: CryptoRng + Rng>(
        &mut self,
        security: usize,
        rng: &mut RNG,
    ) -> Result<bool> {
        debug!(node = %self.node_id(), input = self.veto_input as u8, "veto started");
        for last_broadcaster in self.all_node_ids.clone() {
            self.parity_broadcasts_last = last_broadcaster == self.transport.node_id();
            for round in 1..=security {
                trace!(node = %self.node_id(), %last_broadcaster, round, "veto round");
                self.set_parity_input_by_veto_input(rng);
                self.execute_parity(rng)?;
                self.veto_result = self.parity_result;
                if self.veto_result {
                    self.parity_broadcasts_last = false;
                    self.finished_barrier(Phase::Veto)?;
                    debug!(node = %self.node_id(), "veto aborted with result 1");
                    return Ok(true);
                }
            }
            self.parity_broadcasts_last = false;
        }
        self.finished_barrier(Phase::Veto)?;
        debug!(node = %self.node_id(), result = self.veto_result as u8, "veto finished");
        Ok(self.veto_result)
    }

    // a vetoing participant contributes a fresh uniform bit, others 0
    fn set_parity_input_by_veto_input<RNG: CryptoRng + Rng>(&mut self, rng: &mut RNG) {
        if self.veto_input {
            self.parity_input = rng.gen();
        } else {
            self.parity_input = false;
        }
    }
}
