//! TCP implementation of `scm_consensus::Transport` (§4.2's transport
//! seam). The teacher has no real-network VSR transport to generalize
//! from — `kimberlite-vsr` only ever runs over its own test harness's
//! in-process channels — so this is built fresh, in the style of the
//! teacher's blocking reconnect-with-backoff client code
//! (`core_runtime.rs`'s retry loop) rather than layered onto the
//! `mio`-based RPC listener: VSR traffic is low-volume and latency
//! sensitive, not throughput sensitive, so one blocking reader/writer
//! thread pair per peer keeps the protocol state machine (`Replica`)
//! simple to reason about.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use scm_consensus::message::Message;
use scm_consensus::transport::Transport;
use scm_consensus::types::ReplicaId;

const MAX_PEER_FRAME_SIZE: u32 = 64 * 1024 * 1024;
const RECONNECT_BACKOFF: Duration = Duration::from_millis(500);

fn write_frame(stream: &mut TcpStream, payload: &[u8]) -> io::Result<()> {
    stream.write_all(&(payload.len() as u32).to_be_bytes())?;
    stream.write_all(payload)?;
    stream.flush()
}

fn read_frame(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_PEER_FRAME_SIZE {
        return Err(io::Error::new(io::ErrorKind::InvalidData, format!("peer frame of {len} bytes too large")));
    }
    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload)?;
    Ok(payload)
}

/// Outbound half: one background thread per peer, holding a queue of
/// messages to send and reconnecting with a fixed backoff on failure.
/// VSR tolerates drops, so a message queued while disconnected is simply
/// discarded rather than buffered indefinitely.
struct PeerSender {
    tx: Sender<Message>,
}

fn spawn_peer_sender(address: String) -> PeerSender {
    let (tx, rx): (Sender<Message>, Receiver<Message>) = mpsc::channel();
    thread::spawn(move || peer_sender_loop(&address, &rx));
    PeerSender { tx }
}

fn peer_sender_loop(address: &str, rx: &Receiver<Message>) {
    loop {
        let mut stream = match TcpStream::connect(address) {
            Ok(stream) => stream,
            Err(error) => {
                debug!(%address, %error, "peer connect failed, retrying");
                thread::sleep(RECONNECT_BACKOFF);
                continue;
            }
        };
        let _ = stream.set_nodelay(true);

        loop {
            let message = match rx.recv() {
                Ok(message) => message,
                Err(_) => return,
            };
            let Ok(payload) = postcard::to_allocvec(&message) else { continue };
            if write_frame(&mut stream, &payload).is_err() {
                warn!(%address, "peer send failed, reconnecting");
                break;
            }
        }
    }
}

/// Inbound half: a single listener thread accepting connections from
/// every peer (VSR is fully connected, so any peer may dial in) and
/// forwarding decoded messages onto the shared inbound channel.
fn spawn_peer_listener(listener: TcpListener, inbound_tx: Sender<Message>) {
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            let inbound_tx = inbound_tx.clone();
            thread::spawn(move || peer_reader_loop(stream, inbound_tx));
        }
    });
}

fn peer_reader_loop(mut stream: TcpStream, inbound_tx: Sender<Message>) {
    let _ = stream.set_nodelay(true);
    loop {
        let payload = match read_frame(&mut stream) {
            Ok(payload) => payload,
            Err(_) => return,
        };
        match postcard::from_bytes::<Message>(&payload) {
            Ok(message) => {
                if inbound_tx.send(message).is_err() {
                    return;
                }
            }
            Err(error) => warn!(%error, "dropped malformed inter-replica message"),
        }
    }
}

/// TCP-backed `Transport` for a real `scm-server` cluster. Binds a
/// listener for inbound consensus traffic and lazily opens one
/// reconnecting outbound connection per configured peer.
pub struct PeerTransport {
    self_id: ReplicaId,
    senders: HashMap<ReplicaId, PeerSender>,
    inbound: Mutex<Receiver<Message>>,
}

impl PeerTransport {
    /// Binds `bind_address` for inbound traffic and spawns an outbound
    /// sender thread per entry in `peers`.
    pub fn bind(self_id: ReplicaId, bind_address: &str, peers: &[(ReplicaId, String)]) -> io::Result<Self> {
        let listener = TcpListener::bind(bind_address)?;
        let (inbound_tx, inbound_rx) = mpsc::channel();
        spawn_peer_listener(listener, inbound_tx);

        let senders = peers
            .iter()
            .map(|(id, address)| (*id, spawn_peer_sender(address.clone())))
            .collect();

        Ok(Self { self_id, senders, inbound: Mutex::new(inbound_rx) })
    }
}

impl Transport for PeerTransport {
    fn send(&self, message: Message) {
        match message.to {
            Some(target) => {
                if let Some(sender) = self.senders.get(&target) {
                    let _ = sender.tx.send(message);
                } else {
                    warn!(target = %target, "no configured peer address for consensus message target");
                }
            }
            None => {
                for sender in self.senders.values() {
                    let _ = sender.tx.send(message.clone());
                }
            }
        }
    }

    fn recv_timeout(&self, self_id: ReplicaId, timeout: Duration) -> Option<Message> {
        debug_assert_eq!(self_id, self.self_id, "PeerTransport polled by a replica other than the one it was bound for");
        self.inbound.lock().expect("inbound queue lock poisoned").recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scm_consensus::message::MessagePayload;
    use scm_consensus::types::{CommitNumber, ViewNumber};

    #[test]
    fn two_bound_transports_exchange_a_targeted_message() {
        let listener_a = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr_a = listener_a.local_addr().unwrap();
        drop(listener_a);
        let listener_b = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr_b = listener_b.local_addr().unwrap();
        drop(listener_b);

        let transport_a =
            PeerTransport::bind(ReplicaId(0), &addr_a.to_string(), &[(ReplicaId(1), addr_b.to_string())]).unwrap();
        let transport_b = PeerTransport::bind(ReplicaId(1), &addr_b.to_string(), &[]).unwrap();

        // Give both listener threads a moment to start accepting.
        thread::sleep(Duration::from_millis(100));

        let message = Message::targeted(
            ReplicaId(0),
            ReplicaId(1),
            MessagePayload::Heartbeat(scm_consensus::message::Heartbeat { view: ViewNumber(0), commit_number: CommitNumber(0) }),
        );
        transport_a.send(message);

        let received = transport_b.recv_timeout(ReplicaId(1), Duration::from_secs(5));
        assert!(received.is_some());
    }
}
