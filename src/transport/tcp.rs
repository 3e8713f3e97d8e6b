//! TCP transport: a listener accepting inbound peers, an id handshake on
//! every new stream, and one reader thread per connection feeding the sink.
//!
//! Socket receive timeouts exist only so the reader and accept threads can
//! poll the termination flag; the protocol layer itself has no timeouts.

use crate::error::{ProtocolError, Result};
use crate::transport::wire::{self, EOT};
use crate::transport::{MessageSink, ProtocolMsg, Transport};
use sha2::{Digest, Sha512};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const READ_POLL: Duration = Duration::from_millis(100);
const ACCEPT_POLL: Duration = Duration::from_millis(20);
const MESH_POLL: Duration = Duration::from_millis(10);

/// Derive a fresh node id from the bind address and a random nonce.
pub fn generate_node_id(host: &str, port: u16) -> String {
    let mut hasher = Sha512::new();
    hasher.update(host.as_bytes());
    hasher.update(port.to_be_bytes());
    hasher.update(rand::random::<u64>().to_be_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

struct Shared {
    node_id: String,
    sink: Arc<dyn MessageSink>,
    peers: Mutex<HashMap<String, Arc<Mutex<TcpStream>>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    terminate: AtomicBool,
    max_connections: usize,
}

/// TCP implementation of the transport contract.
pub struct TcpTransport {
    shared: Arc<Shared>,
}

impl TcpTransport {
    /// Bind a listener and start accepting peers. With `node_id` of `None`
    /// a random id is generated from the bind address.
    pub fn bind(
        host: &str,
        port: u16,
        node_id: Option<String>,
        max_connections: usize,
        sink: Arc<dyn MessageSink>,
    ) -> Result<Self> {
        let node_id = node_id.unwrap_or_else(|| generate_node_id(host, port));
        let listener = TcpListener::bind((host, port))?;
        listener.set_nonblocking(true)?;

        let shared = Arc::new(Shared {
            node_id,
            sink,
            peers: Mutex::new(HashMap::new()),
            threads: Mutex::new(Vec::new()),
            terminate: AtomicBool::new(false),
            max_connections,
        });

        let accept_shared = shared.clone();
        let handle = std::thread::spawn(move || accept_loop(accept_shared, listener));
        shared.threads.lock().unwrap().push(handle);

        debug!(node = %shared.node_id, port, "listening");
        Ok(TcpTransport { shared })
    }

    /// Dial a peer and exchange node ids. Connecting to an already connected
    /// peer (or to oneself) is a logged no-op.
    pub fn connect(&self, host: &str, port: u16) -> Result<()> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                ProtocolError::TransportClosed(format!("cannot resolve {}:{}", host, port))
            })?;
        let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
        prepare_stream(&stream)?;

        let mut writer = stream.try_clone()?;
        writer.write_all(&wire::encode(&ProtocolMsg::NodeId(
            self.shared.node_id.clone(),
        ))?)?;

        let mut reader = BufReader::new(stream.try_clone()?);
        let peer_id = read_handshake(&mut reader)?;

        register_peer(&self.shared, peer_id, stream, reader);
        Ok(())
    }

    /// Block until `count` peers are connected, or fail after `timeout`.
    pub fn wait_for_peers(&self, count: usize, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        while self.peer_count() < count {
            if started.elapsed() > timeout {
                return Err(ProtocolError::TransportClosed(format!(
                    "still {} of {} peers after {:?}",
                    self.peer_count(),
                    count,
                    timeout
                )));
            }
            std::thread::sleep(MESH_POLL);
        }
        Ok(())
    }

    /// Stop the accept loop and all reader threads and join them.
    pub fn shutdown(&self) {
        self.shared.terminate.store(true, Ordering::Release);
        let handles = std::mem::take(&mut *self.shared.threads.lock().unwrap());
        for handle in handles {
            let _ = handle.join();
        }
        self.shared.peers.lock().unwrap().clear();
    }
}

impl Transport for TcpTransport {
    fn node_id(&self) -> &str {
        &self.shared.node_id
    }

    fn peer_count(&self) -> usize {
        self.shared.peers.lock().unwrap().len()
    }

    fn peer_ids(&self) -> Vec<String> {
        self.shared.peers.lock().unwrap().keys().cloned().collect()
    }

    fn broadcast(&self, msg: &ProtocolMsg) -> Result<()> {
        let frame = wire::encode(msg)?;
        let peers = {
            let peers = self.shared.peers.lock().unwrap();
            peers
                .iter()
                .map(|(id, stream)| (id.clone(), stream.clone()))
                .collect::<Vec<_>>()
        };
        for (peer, stream) in peers {
            stream.lock().unwrap().write_all(&frame).map_err(|e| {
                ProtocolError::TransportClosed(format!("send to {} failed: {}", peer, e))
            })?;
        }
        Ok(())
    }

    fn send_to(&self, peer_id: &str, msg: &ProtocolMsg) -> Result<()> {
        let stream = {
            let peers = self.shared.peers.lock().unwrap();
            peers.get(peer_id).cloned()
        };
        match stream {
            Some(stream) => {
                let frame = wire::encode(msg)?;
                stream.lock().unwrap().write_all(&frame).map_err(|e| {
                    ProtocolError::TransportClosed(format!("send to {} failed: {}", peer_id, e))
                })
            }
            None => Ok(()),
        }
    }
}

fn prepare_stream(stream: &TcpStream) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(READ_POLL))?;
    Ok(())
}

// first frame on a fresh stream must be the peer's node id
fn read_handshake(reader: &mut BufReader<TcpStream>) -> Result<String> {
    let started = Instant::now();
    let mut buf = Vec::new();
    loop {
        match reader.read_until(EOT, &mut buf) {
            Ok(0) => {
                return Err(ProtocolError::TransportClosed(
                    "peer closed during handshake".into(),
                ))
            }
            Ok(_) if buf.last() == Some(&EOT) => {
                buf.pop();
                return match wire::decode(&buf)? {
                    ProtocolMsg::NodeId(id) => Ok(id),
                    other => Err(ProtocolError::UnknownTag(format!(
                        "expected node_id handshake, got {:?}",
                        other
                    ))),
                };
            }
            Ok(_) => {
                return Err(ProtocolError::TransportClosed(
                    "peer closed mid-handshake".into(),
                ))
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                if started.elapsed() > HANDSHAKE_TIMEOUT {
                    return Err(ProtocolError::TransportClosed("handshake timed out".into()));
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn register_peer(
    shared: &Arc<Shared>,
    peer_id: String,
    stream: TcpStream,
    reader: BufReader<TcpStream>,
) {
    if peer_id == shared.node_id {
        warn!(node = %shared.node_id, "dropping connection to self");
        return;
    }
    {
        let mut peers = shared.peers.lock().unwrap();
        if peers.contains_key(&peer_id) {
            warn!(node = %shared.node_id, peer = %peer_id, "already connected, dropping duplicate");
            return;
        }
        peers.insert(peer_id.clone(), Arc::new(Mutex::new(stream)));
    }
    debug!(node = %shared.node_id, peer = %peer_id, "peer connected");

    let reader_shared = shared.clone();
    let handle = std::thread::spawn(move || reader_loop(reader_shared, peer_id, reader));
    shared.threads.lock().unwrap().push(handle);
}

fn accept_loop(shared: Arc<Shared>, listener: TcpListener) {
    while !shared.terminate.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, _)) => {
                if shared.peers.lock().unwrap().len() >= shared.max_connections {
                    warn!(node = %shared.node_id, "connection limit reached, refusing peer");
                    continue;
                }
                if let Err(e) = handle_incoming(&shared, stream) {
                    warn!(node = %shared.node_id, error = %e, "inbound handshake failed");
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => std::thread::sleep(ACCEPT_POLL),
            Err(e) => {
                error!(node = %shared.node_id, error = %e, "accept failed");
                break;
            }
        }
    }
}

fn handle_incoming(shared: &Arc<Shared>, stream: TcpStream) -> Result<()> {
    prepare_stream(&stream)?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let peer_id = read_handshake(&mut reader)?;

    let mut writer = stream.try_clone()?;
    writer.write_all(&wire::encode(&ProtocolMsg::NodeId(shared.node_id.clone()))?)?;

    register_peer(shared, peer_id, stream, reader);
    Ok(())
}

fn reader_loop(shared: Arc<Shared>, peer_id: String, mut reader: BufReader<TcpStream>) {
    let mut buf = Vec::new();
    while !shared.terminate.load(Ordering::Acquire) {
        match reader.read_until(EOT, &mut buf) {
            Ok(0) => {
                debug!(node = %shared.node_id, peer = %peer_id, "peer disconnected");
                break;
            }
            Ok(_) if buf.last() == Some(&EOT) => {
                buf.pop();
                match wire::decode(&buf) {
                    Ok(msg) => shared.sink.on_message(&peer_id, msg),
                    Err(e) => {
                        // desynchronized peer; drop the connection
                        error!(node = %shared.node_id, peer = %peer_id, error = %e, "bad frame");
                        break;
                    }
                }
                buf.clear();
            }
            Ok(_) => {
                debug!(node = %shared.node_id, peer = %peer_id, "peer closed mid-frame");
                break;
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) => {
                debug!(node = %shared.node_id, peer = %peer_id, error = %e, "read failed");
                break;
            }
        }
    }
    shared.peers.lock().unwrap().remove(&peer_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::Mailbox;

    fn bind_node(port: u16, id: &str) -> (TcpTransport, Arc<Mailbox>) {
        let mailbox = Arc::new(Mailbox::new());
        let sink: Arc<dyn MessageSink> = mailbox.clone();
        let transport =
            TcpTransport::bind("127.0.0.1", port, Some(id.to_string()), 1000, sink).unwrap();
        (transport, mailbox)
    }

    #[test]
    fn test_two_party_exchange() {
        let (t1, m1) = bind_node(23011, "1");
        let (t2, m2) = bind_node(23012, "2");

        t2.connect("127.0.0.1", 23011).unwrap();
        t1.wait_for_peers(1, Duration::from_secs(5)).unwrap();
        t2.wait_for_peers(1, Duration::from_secs(5)).unwrap();

        t1.send_to("2", &ProtocolMsg::ParitySharedKey(1)).unwrap();
        t2.broadcast(&ProtocolMsg::ParityKeyXorResult(0)).unwrap();

        assert_eq!(m2.wait_shared_keys(1).unwrap(), vec![true]);
        assert_eq!(m1.wait_broadcasts(1).unwrap(), vec![false]);

        t1.shutdown();
        t2.shutdown();
    }

    #[test]
    fn test_duplicate_connection_is_dropped() {
        let (t1, _m1) = bind_node(23021, "1");
        let (t2, _m2) = bind_node(23022, "2");

        t2.connect("127.0.0.1", 23021).unwrap();
        t2.connect("127.0.0.1", 23021).unwrap();
        t1.wait_for_peers(1, Duration::from_secs(5)).unwrap();

        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(t1.peer_count(), 1);
        assert_eq!(t2.peer_count(), 1);

        t1.shutdown();
        t2.shutdown();
    }

    fn test_nparty_mesh(nparties: usize, base_port: u16) {
        let handles = (0..nparties)
            .map(|me| {
                std::thread::spawn(move || {
                    let (transport, mailbox) =
                        bind_node(base_port + me as u16, &me.to_string());
                    std::thread::sleep(Duration::from_millis(100 * me as u64));
                    for them in 0..me {
                        transport.connect("127.0.0.1", base_port + them as u16).unwrap();
                    }
                    transport
                        .wait_for_peers(nparties - 1, Duration::from_secs(10))
                        .unwrap();

                    transport
                        .broadcast(&ProtocolMsg::NodeId(transport.node_id().to_string()))
                        .unwrap();
                    let mut ids = mailbox.wait_node_ids(nparties - 1).unwrap();
                    ids.sort();

                    let mut expected = (0..nparties)
                        .filter(|&i| i != me)
                        .map(|i| i.to_string())
                        .collect::<Vec<_>>();
                    expected.sort();
                    assert_eq!(ids, expected);

                    transport.shutdown();
                })
            })
            .collect::<Vec<_>>();

        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_3party_mesh() {
        test_nparty_mesh(3, 23100);
    }

    #[test]
    fn test_5party_mesh() {
        test_nparty_mesh(5, 23200);
    }
}
