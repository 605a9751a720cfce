// Test-only session peer for end-to-end pipeline tests.
//
// Wraps a real `MultiplayerContext` over a real `Client` connection to a
// real relay, adding only synchronous polling helpers (blocking loops around
// the non-blocking `poll()`). Everything under test uses the same code paths
// as a live game process.
//
// See also: `tests/full_pipeline.rs` for the scenarios.

use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use partyline_protocol::message::Message;
use partyline_relay::client::Client;
use partyline_relay::server::{RelayServer, ServerConfig, start_server};
use partyline_session::context::MultiplayerContext;

/// Default timeout for blocking poll operations.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep between poll attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Start a relay on a random localhost port with forwarding enabled.
pub fn start_test_relay() -> RelayServer {
    let config = ServerConfig {
        port: 0,
        ..ServerConfig::default()
    };
    start_server(&config).expect("start_test_relay failed")
}

/// A test peer: one multiplayer context connected to the relay.
pub struct TestPeer {
    pub ctx: MultiplayerContext,
}

impl TestPeer {
    /// Connect and take the host role.
    pub fn host(addr: SocketAddr) -> Self {
        let client = Client::connect(addr).expect("host connect failed");
        Self {
            ctx: MultiplayerContext::host(client),
        }
    }

    /// Connect and take the joining-client role.
    pub fn join(addr: SocketAddr) -> Self {
        let client = Client::connect(addr).expect("join connect failed");
        Self {
            ctx: MultiplayerContext::join(client),
        }
    }

    /// Blocking poll until a message satisfying `pred` arrives; returns it.
    /// Messages polled along the way (reserved-event side effects included)
    /// are discarded.
    pub fn poll_until<F>(&mut self, mut pred: F) -> Message
    where
        F: FnMut(&Message) -> bool,
    {
        let start = Instant::now();
        loop {
            assert!(
                start.elapsed() < POLL_TIMEOUT,
                "timed out waiting for a matching message"
            );
            for message in self.ctx.poll(64) {
                if pred(&message) {
                    return message;
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Blocking poll until `cond` holds on the context state.
    pub fn poll_until_state<F>(&mut self, mut cond: F)
    where
        F: FnMut(&MultiplayerContext) -> bool,
    {
        let start = Instant::now();
        while !cond(&self.ctx) {
            assert!(
                start.elapsed() < POLL_TIMEOUT,
                "timed out waiting for context state"
            );
            let _ = self.ctx.poll(64);
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Drain everything queued right now, polling briefly to let in-flight
    /// messages land first.
    pub fn drain(&mut self) -> Vec<Message> {
        thread::sleep(Duration::from_millis(100));
        let mut messages = Vec::new();
        loop {
            let batch = self.ctx.poll(64);
            if batch.is_empty() {
                return messages;
            }
            messages.extend(batch);
        }
    }
}

/// Wait until the relay has registered `count` peers.
pub fn wait_for_peers(server: &RelayServer, count: usize) {
    let start = Instant::now();
    while server.peer_count() != count {
        assert!(
            start.elapsed() < POLL_TIMEOUT,
            "timed out waiting for {count} peers"
        );
        thread::sleep(POLL_INTERVAL);
    }
}
