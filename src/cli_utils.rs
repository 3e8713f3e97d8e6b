//! CLI (CommandLine Interface) utilities for the participant binary.
//!
//! The option structs describe the operational surface; see the protocol
//! modules for what the options mean.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use std::fmt::Display;

/// Which protocol the participant runs once the mesh is complete.
#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum Protocol {
    /// One anonymous-XOR round over the input bits.
    Parity,
    /// Anonymous OR over the input bits.
    Veto,
    /// Classify the number of would-be senders.
    CollisionDetection,
    /// Covertly notify the chosen node.
    Notification,
    /// Fixed-role transmission with preassigned sender/receiver.
    FixedMessage,
    /// The full anonymous message transmission.
    MessageTransmission,
}

impl Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Parity => write!(f, "parity"),
            Protocol::Veto => write!(f, "veto"),
            Protocol::CollisionDetection => write!(f, "collision-detection"),
            Protocol::Notification => write!(f, "notification"),
            Protocol::FixedMessage => write!(f, "fixed-message"),
            Protocol::MessageTransmission => write!(f, "message-transmission"),
        }
    }
}

/// Arguments for one participant process.
/// This struct implements [clap::Parser] to make that this binary has
/// CommandLine Arguments.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None, next_line_help = true)]
pub struct ParticipantArgs {
    /// Node id of this participant. A random id is generated when omitted.
    #[arg(short, long)]
    pub id: Option<String>,

    /// Host to bind the listener to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind the listener to.
    #[arg(short, long)]
    pub port: u16,

    /// Peers to dial, as comma-separated host:port pairs.
    #[arg(short = 'c', long = "connect", value_delimiter = ',')]
    pub connect: Vec<String>,

    /// Total number of participants; the protocol starts once everyone is
    /// connected.
    #[arg(short = 'N', long, default_value_t = 3)]
    pub num_parties: usize,

    /// Protocol to execute.
    #[arg(short = 'P', long = "protocol", default_value_t = Protocol::MessageTransmission)]
    pub protocol: Protocol,

    /// Security parameter: subprotocols succeed with probability at least
    /// 1 - 2^-security.
    #[arg(short, long, default_value_t = 5)]
    pub security: usize,

    /// Private input bit for parity, veto and collision detection.
    #[arg(short = 'b', long, default_value_t = 0)]
    pub input_bit: u8,

    /// Node id to notify; setting it makes this participant the sender.
    /// Empty means "not a sender".
    #[arg(short = 'n', long, default_value = "")]
    pub notify: String,

    /// Message to transmit, up to message-length / 8 ASCII characters.
    #[arg(short, long, default_value = "")]
    pub message: String,

    /// Act as the fixed-role sender (fixed-message protocol only).
    #[arg(long, default_value_t = false)]
    pub sender: bool,

    /// Act as the fixed-role receiver (fixed-message protocol only).
    #[arg(long, default_value_t = false)]
    pub receiver: bool,

    /// Maximum number of inbound connections. A transport cap only.
    #[arg(long, default_value_t = 1000)]
    pub max_connections: usize,

    /// Per-record round deadline in seconds. Waits forever when omitted;
    /// on expiry the run aborts and cannot be resumed.
    #[arg(long)]
    pub round_deadline: Option<u64>,
}

/// Split a `host:port` peer address.
pub fn parse_peer(s: &str) -> Result<(String, u16)> {
    let (host, port) = s
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("peer must be host:port (got \"{}\")", s))?;
    let port = port
        .parse()
        .with_context(|| format!("bad port in \"{}\"", s))?;
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_peer() {
        assert_eq!(
            parse_peer("localhost:20001").unwrap(),
            ("localhost".to_string(), 20001)
        );
        assert!(parse_peer("localhost").is_err());
        assert!(parse_peer("localhost:notaport").is_err());
    }

    #[test]
    fn test_protocol_display_matches_value_enum() {
        for protocol in [
            Protocol::Parity,
            Protocol::Veto,
            Protocol::CollisionDetection,
            Protocol::Notification,
            Protocol::FixedMessage,
            Protocol::MessageTransmission,
        ] {
            let rendered = protocol.to_string();
            let parsed = Protocol::from_str(&rendered, true).unwrap();
            assert_eq!(parsed.to_string(), rendered);
        }
    }
}
