// Transport error taxonomy.
//
// Only two operations fail loudly: `Client::connect` and `start_server`.
// Everything else degrades — dead connections fail fast with `Closed`,
// decode errors are dropped inside the receive loop and never surface here.

use std::io;

use thiserror::Error;

/// Errors produced by the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection is no longer running; sends fail fast.
    #[error("connection closed")]
    Closed,

    /// Socket-level failure during connect or send.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// A message could not be serialized for the wire.
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}
