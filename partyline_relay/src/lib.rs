// partyline_relay — relay server, client, and connection transport.
//
// This crate implements the networking core of Partyline: a dumb relay that
// accepts TCP connections and forwards every received frame to all other
// peers, plus the client used by game processes to reach it. All message
// interpretation happens above this crate (`partyline_session`); the relay
// moves bytes.
//
// Module overview:
// - `connection.rs`: One stream = one `Connection` — blocking send, detached
//                    receive loop, running flag, frame splitting via the
//                    protocol crate.
// - `server.rs`:     Accept loop, mutex-protected peer map, sender-excluded
//                    rebroadcast, server inbox, `broadcast`/`poll`.
// - `client.rs`:     `Client` — one connection plus a non-blocking inbox.
// - `error.rs`:      `TransportError`.
//
// Dependencies: `partyline_protocol` (message type and framing). No async
// runtime — `std::net` blocking sockets with one thread per receive loop.
//
// The relay can run standalone (`main.rs`, the `relay` binary) or be
// embedded in a host process via `start_server`.

pub mod client;
pub mod connection;
pub mod error;
pub mod server;

pub use client::Client;
pub use connection::{ConnEvent, Connection, ConnectionSender};
pub use error::TransportError;
pub use server::{PeerId, RelayServer, ServerConfig, start_server};
