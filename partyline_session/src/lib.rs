// partyline_session — session layer over the Partyline relay transport.
//
// Where `partyline_relay` moves opaque messages, this crate gives them
// meaning: which participant is the host, what id this process has, how
// often high-frequency events may go out, and which local code reacts to
// which event.
//
// Module overview:
// - `context.rs`: `MultiplayerContext` — one role bound to one client.
//                 Identity and id correction, roster, `send_every`
//                 throttling, shared deterministic rng, reserved-event
//                 handling inside `poll()`.
// - `router.rs`:  `EventRouter` — process-local publish/subscribe with a
//                 per-send routing policy and optional forwarding to a
//                 `Transport`. `dispatch_incoming` re-publishes transport
//                 messages locally.
//
// There is no global session. The application constructs a context, passes
// it (or its sender handle) wherever sends happen, and drains `poll()` from
// its main loop — explicit lifecycle, no import-time side effects.

pub mod context;
pub mod router;

pub use context::{HOST_ID, MultiplayerContext, Role};
pub use router::{EventRouter, Route, Transport};
