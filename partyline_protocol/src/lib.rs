// partyline_protocol — wire protocol for the Partyline multiplayer relay.
//
// This crate defines the message type and framing used by the relay server
// (`partyline_relay`) and game clients to communicate over TCP. It is shared
// by both sides and has no dependency on the session layer or any engine
// code.
//
// Module overview:
// - `message.rs`:  The `Message` type (event name + JSON object payload) and
//                  the reserved event-name constants consumed by the session
//                  layer.
// - `framing.rs`:  Newline-delimited framing — `encode_frame`/`decode_frame`
//                  plus `FrameBuffer`, the streaming splitter used by the
//                  receive loops.
//
// Design decisions:
// - **JSON serialization.** One JSON object per line; human-readable on the
//   wire, and string escaping guarantees the delimiter can never appear
//   inside a payload value. Binary framing can be swapped in later if
//   bandwidth matters.
// - **Opaque payloads.** The relay forwards `data` without inspecting it;
//   only the session layer knows the reserved events.
// - **No async runtime.** Framing works on plain byte slices, compatible
//   with blocking TCP streams and buffered wrappers.

pub mod framing;
pub mod message;

pub use framing::{DELIMITER, FrameBuffer, MAX_FRAME_SIZE, decode_frame, encode_frame};
pub use message::{EVENT_ASSIGN_ID, EVENT_ROSTER, EVENT_SEED, Message};
