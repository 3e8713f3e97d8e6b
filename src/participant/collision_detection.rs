//! Collision detection: classifies the group input into "no sender",
//! "exactly one sender" or "two or more senders" with two veto phases.

use crate::error::Result;
use crate::mailbox::Phase;
use crate::participant::Participant;
use crate::transport::Transport;
use rand::{CryptoRng, Rng};
use tracing::debug;

/// Outcome of a collision-detection run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollisionDetectionResult {
    /// Nobody raised their collision-detection bit.
    NoSender,
    /// Exactly one participant wants to send.
    SingleSender,
    /// At least two participants want to send.
    Collision,
}

impl<T: Transport> Participant<T> {
    /// Run collision detection on the configured
    /// `collision_detection_input` bits, establishing the group order first.
    pub fn execute_collision_detection<RNG: CryptoRng + Rng>(
        &mut self,
        security: usize,
        rng: &mut RNG,
    ) -> Result<CollisionDetectionResult> {
        self.create_order_in_all_node_ids()?;
        self.execute_collision_detection_rounds(security, rng)
    }

    pub(crate) fn execute_collision_detection_rounds<RNG: CryptoRng + Rng>(
        &mut self,
        security: usize,
        rng: &mut RNG,
    ) -> Result<CollisionDetectionResult> {
        // phase A: does anyone want to send at all?
        self.veto_input = self.collision_detection_input;
        debug!(node = %self.node_id(), "collision detection phase A");
        let phase_a = self.execute_veto_rounds(security, rng)?;

        if !phase_a {
            self.collision_detection_result = CollisionDetectionResult::NoSender;
            self.finished_barrier(Phase::CollisionDetection)?;
            debug!(node = %self.node_id(), "collision detection: no sender");
            return Ok(self.collision_detection_result);
        }

        // Phase B: a would-be sender whose own parity bit was 0 in the
        // aborting round saw someone else's 1, so it vetoes again. With a
        // single sender nobody does.
        self.veto_input = self.collision_detection_input && !self.parity_input;
        debug!(
            node = %self.node_id(),
            detected = self.veto_input as u8,
            "collision detection phase B"
        );
        let phase_b = self.execute_veto_rounds(security, rng)?;

        self.collision_detection_result = if phase_b {
            CollisionDetectionResult::Collision
        } else {
            CollisionDetectionResult::SingleSender
        };
        self.finished_barrier(Phase::CollisionDetection)?;
        debug!(node = %self.node_id(), result = ?self.collision_detection_result, "collision detection finished");
        Ok(self.collision_detection_result)
    }
}
