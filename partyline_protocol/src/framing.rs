// Newline-delimited message framing.
//
// Wire format: one message per line. Each frame is the JSON serialization of
// a `Message` followed by a single `\n`. There is no length prefix — framing
// relies solely on the delimiter, which is safe because JSON string escaping
// guarantees no raw newline ever appears inside a serialized value.
//
// `decode_frame` never fails loudly: a corrupt line decodes to `None` and the
// stream stays usable. `FrameBuffer` does the streaming side — it accumulates
// raw bytes from a socket and yields complete frames as they become
// available, regardless of how reads were chunked.
//
// A `MAX_FRAME_SIZE` guard (1 MB) protects against unbounded accumulation
// when a peer sends garbage with no delimiter in it. Position updates and
// chat are tiny; 1 MB is generous headroom for any real payload.

use serde_json::Error;

use crate::message::Message;

/// Frame delimiter. Exactly one per encoded message, always at the end.
pub const DELIMITER: u8 = b'\n';

/// Maximum bytes a single frame may occupy. Input that exceeds this without
/// a delimiter is discarded up to the next delimiter.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Encode a message into a self-delimiting byte sequence.
pub fn encode_frame(message: &Message) -> Result<Vec<u8>, Error> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(DELIMITER);
    Ok(bytes)
}

/// Decode one frame back into a message. Returns `None` for corrupt input —
/// callers skip the frame and keep going. A trailing delimiter is accepted.
pub fn decode_frame(frame: &[u8]) -> Option<Message> {
    let body = match frame.last() {
        Some(&DELIMITER) => &frame[..frame.len() - 1],
        _ => frame,
    };
    if body.is_empty() {
        return None;
    }
    serde_json::from_slice(body).ok()
}

/// Streaming accumulator that splits a byte stream into complete frames.
///
/// Feed socket reads in with `push`, then drain with `next_frame` until it
/// returns `None`. Frames are yielded without their trailing delimiter.
#[derive(Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    // True while discarding an oversized frame up to its delimiter.
    skipping: bool,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes received from the stream.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete frame, or `None` if no delimiter is buffered.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.buf.iter().position(|&b| b == DELIMITER) {
                Some(pos) => {
                    let frame: Vec<u8> = self.buf.drain(..=pos).take(pos).collect();
                    if self.skipping {
                        // Tail end of an oversized frame — discard it.
                        self.skipping = false;
                        continue;
                    }
                    return Some(frame);
                }
                None => {
                    if self.buf.len() > MAX_FRAME_SIZE {
                        self.buf.clear();
                        self.skipping = true;
                    }
                    return None;
                }
            }
        }
    }
}
