//! In-process transport: a full crossbeam mesh standing in for sockets.
//! Records travel typed, without the wire framing; used by the scenario
//! tests and the timing benchmarks.

use crate::error::{ProtocolError, Result};
use crate::transport::{MessageSink, ProtocolMsg, Transport};
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::sync::Arc;

type Record = (String, ProtocolMsg);

/// One endpoint of a not-yet-started mesh. Call [`LocalEndpoint::start`]
/// with the inbound sink to obtain the usable transport.
pub struct LocalEndpoint {
    node_id: String,
    peers: Vec<(String, Sender<Record>)>,
    inbox: Receiver<Record>,
}

/// Build a fully connected mesh between the given node ids, one endpoint per
/// id, in the given order.
pub fn create_local_mesh(ids: &[&str]) -> Vec<LocalEndpoint> {
    let channels = ids
        .iter()
        .map(|_| unbounded::<Record>())
        .collect::<Vec<_>>();

    ids.iter()
        .enumerate()
        .map(|(me, id)| {
            let peers = ids
                .iter()
                .enumerate()
                .filter(|&(them, _)| them != me)
                .map(|(them, other)| (other.to_string(), channels[them].0.clone()))
                .collect();
            LocalEndpoint {
                node_id: id.to_string(),
                peers,
                inbox: channels[me].1.clone(),
            }
        })
        .collect()
}

impl LocalEndpoint {
    /// Spawn the forwarder thread feeding `sink` and return the transport.
    /// The forwarder exits once every peer endpoint has been dropped.
    pub fn start(self, sink: Arc<dyn MessageSink>) -> LocalTransport {
        let LocalEndpoint {
            node_id,
            peers,
            inbox,
        } = self;
        std::thread::spawn(move || {
            for (from, msg) in inbox.iter() {
                sink.on_message(&from, msg);
            }
        });
        LocalTransport { node_id, peers }
    }
}

/// The in-process transport: senders into every peer's inbox.
pub struct LocalTransport {
    node_id: String,
    peers: Vec<(String, Sender<Record>)>,
}

impl Transport for LocalTransport {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn peer_ids(&self) -> Vec<String> {
        self.peers.iter().map(|(id, _)| id.clone()).collect()
    }

    fn broadcast(&self, msg: &ProtocolMsg) -> Result<()> {
        for (peer, tx) in &self.peers {
            tx.send((self.node_id.clone(), msg.clone())).map_err(|_| {
                ProtocolError::TransportClosed(format!("peer {} is gone", peer))
            })?;
        }
        Ok(())
    }

    fn send_to(&self, peer_id: &str, msg: &ProtocolMsg) -> Result<()> {
        match self.peers.iter().find(|(id, _)| id == peer_id) {
            Some((peer, tx)) => tx
                .send((self.node_id.clone(), msg.clone()))
                .map_err(|_| ProtocolError::TransportClosed(format!("peer {} is gone", peer))),
            None => Ok(()),
        }
    }
}
