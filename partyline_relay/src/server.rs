// Relay server: accept loop, shared peer set, and rebroadcast.
//
// Architecture: thread-per-connection with a mutex-protected peer map.
//
// - **Accept loop** (one thread): non-blocking `TcpListener::accept()` with
//   a short sleep on `WouldBlock` so it can check the running flag. Each
//   accepted stream becomes a `Connection` registered in the peer map.
// - **Receive loops** (one per peer, inside `Connection`): every decoded
//   frame is queued on the server's own inbox channel and, in relay mode,
//   forwarded unchanged to every other registered peer — never echoed back
//   to its sender.
// - **Application thread**: drains the inbox with `poll(max)` and can
//   originate messages to all peers with `broadcast`.
//
// The peer map lock serializes broadcast iteration against membership
// changes, so a peer vanishing mid-broadcast is safe: its entry is removed
// either before or after the iteration, and a write that races the
// disconnect simply fails and is swallowed — the dead peer's own receive
// loop reports the close and removes it. Stopping the accept loop does not
// disconnect existing peers; their streams stay open until each side hangs
// up.
//
// The relay understands nothing about message content. No rooms, no
// pairing: every peer sees every broadcast, O(peers) writes per message.

use std::collections::BTreeMap;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use partyline_protocol::message::Message;

use crate::connection::{ConnEvent, Connection};
use crate::error::TransportError;

/// Server-assigned identifier for one accepted connection. Internal to the
/// relay — used only for sender exclusion and peer removal, never written
/// into messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct PeerId(pub u64);

type PeerMap = Arc<Mutex<BTreeMap<PeerId, Connection>>>;

/// Configuration for starting a relay server.
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    /// When true, every received frame is forwarded to all other peers.
    pub relay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".into(),
            port: 7878,
            relay: true,
        }
    }
}

/// A running relay server.
pub struct RelayServer {
    peers: PeerMap,
    inbox: Receiver<Message>,
    accepting: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

/// Bind a listening endpoint and start the accept loop. Returns the server
/// handle; `local_addr()` reports the actual bound address (useful with
/// port 0, where the OS picks a free port).
pub fn start_server(config: &ServerConfig) -> io::Result<RelayServer> {
    let listener = TcpListener::bind((config.bind_addr.as_str(), config.port))?;
    let local_addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;

    let peers: PeerMap = Arc::new(Mutex::new(BTreeMap::new()));
    let (tx, rx) = mpsc::channel();
    let accepting = Arc::new(AtomicBool::new(true));

    let peers_accept = peers.clone();
    let accepting_accept = accepting.clone();
    let relay = config.relay;
    let accept_thread = thread::spawn(move || {
        accept_loop(&listener, &peers_accept, &tx, &accepting_accept, relay);
    });

    Ok(RelayServer {
        peers,
        inbox: rx,
        accepting,
        accept_thread: Some(accept_thread),
        local_addr,
    })
}

impl RelayServer {
    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Originate a message from the host application to every peer. Failed
    /// writes to individual peers are swallowed; only encoding can fail.
    pub fn broadcast(&self, message: &Message) -> Result<(), TransportError> {
        let frame = partyline_protocol::framing::encode_frame(message)?;
        let mut peers = lock_peers(&self.peers);
        for (id, peer) in peers.iter_mut() {
            if peer.send_raw(&frame).is_err() {
                log::debug!("broadcast write to peer {id:?} failed; peer presumed gone");
            }
        }
        Ok(())
    }

    /// Drain at most `max` messages from the server's inbound queue without
    /// blocking. The remainder stays queued for the next call.
    pub fn poll(&self, max: usize) -> Vec<Message> {
        let mut messages = Vec::new();
        while messages.len() < max {
            match self.inbox.try_recv() {
                Ok(msg) => messages.push(msg),
                Err(_) => break,
            }
        }
        messages
    }

    /// Number of currently registered peers.
    pub fn peer_count(&self) -> usize {
        lock_peers(&self.peers).len()
    }

    /// Stop accepting new connections and join the accept thread. Existing
    /// peers are left connected; their receive loops end when each stream
    /// closes.
    pub fn stop(&mut self) {
        self.accepting.store(false, Ordering::SeqCst);
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
    }

    /// Stop accepting and disconnect every peer. Full teardown for tests
    /// and embedded use.
    pub fn shutdown(&mut self) {
        self.stop();
        let mut peers = lock_peers(&self.peers);
        for peer in peers.values_mut() {
            peer.close();
        }
        peers.clear();
    }
}

/// Lock the peer map, recovering from poisoning: a panicked reader thread
/// must not wedge the whole relay.
fn lock_peers(peers: &PeerMap) -> MutexGuard<'_, BTreeMap<PeerId, Connection>> {
    match peers.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Accept loop body. Polls the non-blocking listener so it can observe the
/// running flag between connection attempts.
fn accept_loop(
    listener: &TcpListener,
    peers: &PeerMap,
    tx: &Sender<Message>,
    accepting: &Arc<AtomicBool>,
    relay: bool,
) {
    let mut next_id: u64 = 0;
    while accepting.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                stream.set_nonblocking(false).ok();
                let id = PeerId(next_id);
                next_id += 1;
                log::debug!("accepted peer {id:?} from {addr}");
                register_peer(peers, tx, id, stream, relay);
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                log::warn!("accept failed, stopping accept loop: {e}");
                break;
            }
        }
    }
}

/// Wire one accepted stream into the peer set. The connection's sink queues
/// every message on the server inbox, rebroadcasts the raw frame to the
/// other peers in relay mode, and removes this peer when the stream closes.
fn register_peer(peers: &PeerMap, tx: &Sender<Message>, id: PeerId, stream: TcpStream, relay: bool) {
    let peers_sink = peers.clone();
    let tx = tx.clone();
    let connection = Connection::spawn(stream, move |event| match event {
        ConnEvent::Frame { raw, message } => {
            let _ = tx.send(message);
            if relay {
                let mut peers = lock_peers(&peers_sink);
                for (other_id, peer) in peers.iter_mut() {
                    if *other_id == id {
                        continue; // no echo back to the sender
                    }
                    if peer.send_raw(&raw).is_err() {
                        log::debug!("relay write to peer {other_id:?} failed; peer presumed gone");
                    }
                }
            }
        }
        ConnEvent::Closed => {
            lock_peers(&peers_sink).remove(&id);
            log::debug!("peer {id:?} disconnected");
        }
    });

    match connection {
        Ok(conn) => {
            let mut map = lock_peers(peers);
            map.insert(id, conn);
            // If the stream died before registration, the Closed event has
            // already fired and found nothing to remove.
            if map.get(&id).is_some_and(|c| !c.is_running()) {
                map.remove(&id);
            }
        }
        Err(e) => {
            log::warn!("failed to start receive loop for peer {id:?}: {e}");
        }
    }
}
