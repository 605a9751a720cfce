// TCP client: one connection to a relay server.
//
// `connect()` is the only loud failure point in the transport — there is no
// graceful degradation available when the server cannot be reached. After
// that, the client is a thin pairing of a `Connection` with an mpsc inbox:
// the receive loop pushes decoded messages into the channel, and `poll(max)`
// drains it without blocking, so the application's main loop never waits on
// network I/O.
//
// The client performs no interpretation of message content; whatever the
// server unicast or other peers relayed comes out of `poll` as-is. Session
// semantics (ids, roster, throttling) live in `partyline_session`.

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver};

use serde_json::{Map, Value};

use partyline_protocol::message::Message;

use crate::connection::{ConnEvent, Connection, ConnectionSender};
use crate::error::TransportError;

/// Client side of one relay connection.
pub struct Client {
    conn: Connection,
    inbox: Receiver<Message>,
}

impl Client {
    /// Establish the connection and start the receive loop.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)?;
        // Small frames, latency-sensitive; don't let Nagle batch them.
        stream.set_nodelay(true).ok();

        let (tx, rx) = mpsc::channel();
        let conn = Connection::spawn(stream, move |event| {
            if let ConnEvent::Frame { message, .. } = event {
                // Send fails only when the Client is gone; the loop ends
                // with the stream either way.
                let _ = tx.send(message);
            }
        })?;

        Ok(Self { conn, inbox: rx })
    }

    /// Send one event with a payload object.
    pub fn send(&mut self, event: &str, data: Map<String, Value>) -> Result<(), TransportError> {
        self.conn.send(&Message::new(event, data))
    }

    /// Send an already-built message.
    pub fn send_message(&mut self, message: &Message) -> Result<(), TransportError> {
        self.conn.send(message)
    }

    /// Drain at most `max` queued inbound messages without blocking; the
    /// remainder stays queued.
    pub fn poll(&mut self, max: usize) -> Vec<Message> {
        let mut messages = Vec::new();
        while messages.len() < max {
            match self.inbox.try_recv() {
                Ok(msg) => messages.push(msg),
                Err(_) => break,
            }
        }
        messages
    }

    /// True until the receive loop observes EOF or an I/O error.
    pub fn is_connected(&self) -> bool {
        self.conn.is_running()
    }

    /// Close the connection. Queued inbound messages remain pollable.
    pub fn disconnect(&mut self) {
        self.conn.close();
    }

    /// Detached write-half handle for use as a router transport.
    pub fn sender(&self) -> std::io::Result<ConnectionSender> {
        self.conn.sender()
    }
}
