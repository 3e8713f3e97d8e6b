//! Algebraic Manipulation Detection Code (AMDC) over GF(2)[x].
//!
//! A codeword is `padded_message || theta || tau` where `theta` is a fresh
//! random key and `tau` is the polynomial-evaluation authentication tag
//! `f(x) mod b(x)` with `f(x) = theta^(d+2) + sum_i u_i * theta^i`. Any
//! adversarial modification of the codeword escapes detection with
//! probability at most `2^-beta`. The key is disclosed as part of the
//! codeword, so constant-time evaluation is not required.
//!
//! Construction from "Information-Theoretic Security Without an Honest
//! Majority" (Broadbent, Tapp); parameter derivation follows Huang, Joshi.

use crate::error::{ProtocolError, Result};
use crate::gf2_poly::Gf2Poly;
use rand::{CryptoRng, Rng};

mod irreducible;
pub use irreducible::irreducible;

/// Code parameters derived from the security parameter and message length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AmdcParams {
    /// Number of gamma-bit blocks the padded message is split into. Odd.
    pub d: usize,
    /// Degree of the irreducible modulus; width of key and tag in bits.
    pub gamma: usize,
}

/// Find the smallest odd `d >= 1` with `d * (beta + log2(d + 1)) >=
/// message_len`, and `gamma = ceil(beta + log2(d + 1))`.
pub fn find_d_and_gamma(beta: usize, message_len: usize) -> AmdcParams {
    let mut d = 1usize;
    while (d as f64) * (beta as f64 + ((d + 1) as f64).log2()) < message_len as f64 {
        d += 2;
    }
    let gamma = (beta as f64 + ((d + 1) as f64).log2()).ceil() as usize;
    AmdcParams { d, gamma }
}

/// Codeword length `d * gamma + 2 * gamma` for the given parameters. Depends
/// only on `(beta, message_len)`, never on message contents.
pub fn encoded_length(beta: usize, message_len: usize) -> usize {
    let AmdcParams { d, gamma } = find_d_and_gamma(beta, message_len);
    d * gamma + 2 * gamma
}

// tau = (theta^(d+2) + sum_i u_i * theta^i) mod b, left-padded to gamma bits
fn authentication_tag(
    padded_message: &[bool],
    theta_bits: &[bool],
    b: &Gf2Poly,
    d: usize,
    gamma: usize,
) -> Vec<bool> {
    let theta = Gf2Poly::from_bits(theta_bits);
    let mut f = theta.pow(d + 2);
    for (i, block) in padded_message.chunks(gamma).enumerate() {
        let u = Gf2Poly::from_bits(block);
        f = f.add(&u.mul(&theta.pow(i + 1)));
    }
    f.rem(b).to_bits(gamma)
}

/// Encode a bit-vector message under security parameter `beta`.
///
/// The output has length [`encoded_length`]`(beta, message.len())`. Fails
/// with `UnknownGamma` when the derived modulus degree is not tabulated;
/// this happens before any randomness is drawn.
pub fn encode<RNG: CryptoRng + Rng>(
    message: &[bool],
    beta: usize,
    rng: &mut RNG,
) -> Result<Vec<bool>> {
    let AmdcParams { d, gamma } = find_d_and_gamma(beta, message.len());
    let b = irreducible(gamma).ok_or(ProtocolError::UnknownGamma(gamma))?;

    let theta_bits = (0..gamma).map(|_| rng.gen::<bool>()).collect::<Vec<_>>();

    let mut padded_message = message.to_vec();
    padded_message.resize(d * gamma, false);

    let tau = authentication_tag(&padded_message, &theta_bits, &b, d, gamma);

    let mut codeword = padded_message;
    codeword.extend_from_slice(&theta_bits);
    codeword.extend_from_slice(&tau);
    Ok(codeword)
}

/// Verify and strip a codeword. Returns the verification outcome and the
/// first `message_len` bits of the padded message.
///
/// Fails with `BadLength` when the codeword length does not match the
/// governing `(beta, message_len)` and with `UnknownGamma` on a table miss.
pub fn decode(encoded: &[bool], message_len: usize, beta: usize) -> Result<(bool, Vec<bool>)> {
    let AmdcParams { d, gamma } = find_d_and_gamma(beta, message_len);
    let expected = d * gamma + 2 * gamma;
    if encoded.len() != expected {
        return Err(ProtocolError::BadLength {
            expected,
            actual: encoded.len(),
        });
    }
    let b = irreducible(gamma).ok_or(ProtocolError::UnknownGamma(gamma))?;

    let padded_message = &encoded[..d * gamma];
    let theta_bits = &encoded[d * gamma..d * gamma + gamma];
    let tau_received = &encoded[d * gamma + gamma..];

    let tau_calculated = authentication_tag(padded_message, theta_bits, &b, d, gamma);

    let ok = tau_calculated == tau_received;
    Ok((ok, padded_message[..message_len].to_vec()))
}
