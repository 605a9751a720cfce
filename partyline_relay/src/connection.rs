// One bidirectional byte stream with a background receive loop.
//
// `Connection` is the unit both the client and the relay server build on:
// a blocking write half used from the owner's thread, and a detached reader
// thread that accumulates bytes, splits them on the frame delimiter, decodes
// each frame, and hands the results to a caller-supplied sink.
//
// The sink is a closure rather than a fixed channel because the two owners
// want different things from it: the client pushes decoded messages into its
// inbox, while the relay server also rebroadcasts the raw frame to the other
// peers and tags disconnects with the peer id.
//
// Lifecycle: the reader thread runs until EOF or an I/O error, then clears
// the shared `running` flag and delivers `ConnEvent::Closed`. Once the flag
// is down, `send` fails fast with `TransportError::Closed`. Closing the
// underlying stream (`close()`) is the sole cancellation primitive — a
// blocked read unblocks only when the socket shuts down. No reconnection is
// ever attempted; a dead `Connection` stays dead.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use partyline_protocol::framing::{FrameBuffer, decode_frame, encode_frame};
use partyline_protocol::message::Message;

use crate::error::TransportError;

/// Events delivered to a connection's sink by the receive loop.
pub enum ConnEvent {
    /// One complete, well-formed frame. `raw` is the frame exactly as it
    /// appeared on the wire (delimiter included) so the relay can forward it
    /// without re-encoding.
    Frame { raw: Vec<u8>, message: Message },
    /// The stream hit EOF or an I/O error; the receive loop has ended.
    Closed,
}

/// One live connection: blocking sends plus a background receive loop.
pub struct Connection {
    stream: TcpStream,
    running: Arc<AtomicBool>,
}

impl Connection {
    /// Take ownership of a connected stream and start its receive loop.
    /// `on_event` runs on the reader thread for every decoded frame and once
    /// on close.
    pub fn spawn<F>(stream: TcpStream, on_event: F) -> std::io::Result<Self>
    where
        F: FnMut(ConnEvent) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let read_stream = stream.try_clone()?;
        let running_reader = running.clone();
        thread::spawn(move || {
            receive_loop(read_stream, running_reader, on_event);
        });
        Ok(Self { stream, running })
    }

    /// Encode and send one message. Synchronous: blocks only on OS socket
    /// buffering. Fails fast once the connection is dead.
    pub fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        let frame = encode_frame(message)?;
        self.send_raw(&frame)
    }

    /// Send a pre-encoded frame unchanged (used for relay forwarding).
    pub fn send_raw(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if !self.is_running() {
            return Err(TransportError::Closed);
        }
        if let Err(e) = self.stream.write_all(frame).and_then(|()| self.stream.flush()) {
            // A failed write means the peer is gone; tear down so later
            // sends fail fast without touching the socket.
            self.running.store(false, Ordering::SeqCst);
            let _ = self.stream.shutdown(Shutdown::Both);
            return Err(TransportError::Io(e));
        }
        Ok(())
    }

    /// True while the receive loop is alive and sends can proceed.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Shut the stream down. Unblocks the receive loop; subsequent sends
    /// fail fast.
    pub fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    /// A cloned write-half handle sharing this connection's running flag.
    /// Lets another component (the event router's transport slot) send on
    /// the same connection without owning it.
    pub fn sender(&self) -> std::io::Result<ConnectionSender> {
        Ok(ConnectionSender {
            stream: self.stream.try_clone()?,
            running: self.running.clone(),
        })
    }
}

/// Detached write-half of a `Connection`.
pub struct ConnectionSender {
    stream: TcpStream,
    running: Arc<AtomicBool>,
}

impl ConnectionSender {
    /// Encode and send one message; same fail-fast contract as
    /// `Connection::send`.
    pub fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let frame = encode_frame(message)?;
        if let Err(e) = self.stream.write_all(&frame).and_then(|()| self.stream.flush()) {
            self.running.store(false, Ordering::SeqCst);
            let _ = self.stream.shutdown(Shutdown::Both);
            return Err(TransportError::Io(e));
        }
        Ok(())
    }
}

/// Reader thread body: accumulate bytes, split frames, decode, deliver.
/// Single corrupt frames are dropped without killing the connection; EOF or
/// an I/O error ends the loop and marks the connection not-running.
fn receive_loop<F>(mut stream: TcpStream, running: Arc<AtomicBool>, mut on_event: F)
where
    F: FnMut(ConnEvent),
{
    let mut buffer = FrameBuffer::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break, // EOF
            Ok(n) => {
                buffer.push(&chunk[..n]);
                while let Some(frame) = buffer.next_frame() {
                    match decode_frame(&frame) {
                        Some(message) => {
                            let mut raw = frame;
                            raw.push(partyline_protocol::framing::DELIMITER);
                            on_event(ConnEvent::Frame { raw, message });
                        }
                        None => {
                            log::debug!("dropping corrupt frame ({} bytes)", frame.len());
                        }
                    }
                }
            }
            Err(_) => break,
        }
    }
    running.store(false, Ordering::SeqCst);
    on_event(ConnEvent::Closed);
}
