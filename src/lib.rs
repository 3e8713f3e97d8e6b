//! # Anonymous communication protocols
//!
//! Information-theoretically secure anonymous communication for a fixed
//! group of pairwise-connected participants, after the protocols of
//! ["Information-Theoretic Security Without an Honest Majority"](https://arxiv.org/abs/0706.2010)
//! (Broadbent, Tapp): anonymous XOR-parity, veto, collision detection,
//! sender notification and anonymous message transmission with algebraic
//! manipulation detection.
//!
//! [participant] is the main module of this library.
#![warn(missing_docs)]

pub mod amdc;
pub mod cli_utils;
pub mod error;
pub mod gf2_poly;
pub mod mailbox;
pub mod participant;
pub mod transport;
