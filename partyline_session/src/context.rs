// Session wrapper around one relay client.
//
// `MultiplayerContext` binds a role (host or joining client) to a `Client`
// and layers the small amount of shared session state on top of the raw
// message stream: participant identity, the roster, per-event send
// throttling, and the shared deterministic rng.
//
// Identity: the host's id is fixed at 0 and assigned at construction. A
// joining client starts with a provisional id (1, the two-participant guess)
// and `id_assigned == false` until the host's `assign_id` message arrives.
// The host never accepts an incoming `assign_id` — it is the source of
// truth, not a receiver.
//
// Reserved events (`assign_id`, `roster`, `seed`) are special-cased inside
// `poll()`: they update internal state as a side effect but are still
// returned to the caller, never consumed or hidden. Applications that want
// to react to a roster change can therefore do it through their own event
// router like any other message.
//
// Authority is a convention, not a mechanism: nothing stops a client from
// sending `roster`, but well-behaved applications treat these as
// host-originated.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::{Map, Value, json};

use partyline_prng::SessionRng;
use partyline_protocol::message::{EVENT_ASSIGN_ID, EVENT_ROSTER, EVENT_SEED, Message};
use partyline_relay::client::Client;
use partyline_relay::connection::ConnectionSender;
use partyline_relay::error::TransportError;

/// Participant id reserved for the host.
pub const HOST_ID: u32 = 0;

/// Provisional id a joining client assumes until corrected. In the normative
/// two-participant session this guess is already right.
const PROVISIONAL_ID: u32 = 1;

/// Default seed for the shared rng until the host picks one.
const DEFAULT_SEED: u64 = 0;

/// Application-level session role. A label, not an enforced authority.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Host,
    Client,
}

/// One process's multiplayer session: a role bound to one relay client.
pub struct MultiplayerContext {
    role: Role,
    client: Client,
    client_id: u32,
    id_assigned: bool,
    roster: Vec<Value>,
    last_sends: HashMap<String, Instant>,
    rng: SessionRng,
}

impl MultiplayerContext {
    /// Wrap a connected client as the session host. Host id is fixed at 0
    /// and assigned immediately.
    pub fn host(client: Client) -> Self {
        Self {
            role: Role::Host,
            client,
            client_id: HOST_ID,
            id_assigned: true,
            roster: Vec::new(),
            last_sends: HashMap::new(),
            rng: SessionRng::new(DEFAULT_SEED),
        }
    }

    /// Wrap a connected client as a joining participant. The id is a
    /// provisional guess until the host's `assign_id` arrives.
    pub fn join(client: Client) -> Self {
        Self {
            role: Role::Client,
            client,
            client_id: PROVISIONAL_ID,
            id_assigned: false,
            roster: Vec::new(),
            last_sends: HashMap::new(),
            rng: SessionRng::new(DEFAULT_SEED),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// This participant's id. Provisional on a client until `id_assigned()`.
    pub fn client_id(&self) -> u32 {
        self.client_id
    }

    /// True once the id is authoritative (always, for the host).
    pub fn id_assigned(&self) -> bool {
        self.id_assigned
    }

    /// The last roster announced over the session, verbatim.
    pub fn roster(&self) -> &[Value] {
        &self.roster
    }

    /// The shared deterministic random source.
    pub fn rng(&mut self) -> &mut SessionRng {
        &mut self.rng
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    pub fn disconnect(&mut self) {
        self.client.disconnect();
    }

    /// Detached write-half for use as a router transport.
    pub fn sender(&self) -> std::io::Result<ConnectionSender> {
        self.client.sender()
    }

    /// Send one event through the relay.
    pub fn send(&mut self, event: &str, data: Map<String, Value>) -> Result<(), TransportError> {
        self.client.send(event, data)
    }

    /// Send an already-built message through the relay.
    pub fn send_message(&mut self, message: &Message) -> Result<(), TransportError> {
        self.client.send_message(message)
    }

    /// Rate-limited send: goes out only if `interval` has elapsed since the
    /// last successful send of this event. Returns whether it actually sent.
    /// This is what decouples high-frequency state (continuous position)
    /// from the application tick rate.
    pub fn send_every(
        &mut self,
        event: &str,
        data: Map<String, Value>,
        interval: Duration,
    ) -> Result<bool, TransportError> {
        let now = Instant::now();
        if let Some(last) = self.last_sends.get(event) {
            if now.duration_since(*last) < interval {
                return Ok(false);
            }
        }
        self.client.send(event, data)?;
        self.last_sends.insert(event.to_string(), now);
        Ok(true)
    }

    /// Drain at most `max` inbound messages. Reserved events update session
    /// state as a side effect and are still returned to the caller.
    pub fn poll(&mut self, max: usize) -> Vec<Message> {
        let messages = self.client.poll(max);
        for message in &messages {
            self.apply_reserved(message);
        }
        messages
    }

    /// Host helper: send an authoritative id to the joining participant.
    /// A non-host calling this is a logical error and degrades to a no-op.
    pub fn assign_peer_id(&mut self, id: u32) -> Result<(), TransportError> {
        if self.role != Role::Host {
            log::warn!("assign_peer_id called on non-host context; ignoring");
            return Ok(());
        }
        let mut data = Map::new();
        data.insert("id".into(), json!(id));
        self.client.send(EVENT_ASSIGN_ID, data)
    }

    /// Host helper: announce the participant list. Updates the local roster
    /// and broadcasts it. Degrades to a local-only update on a non-host.
    pub fn announce_roster(&mut self, players: Vec<Value>) -> Result<(), TransportError> {
        self.roster = players.clone();
        if self.role != Role::Host {
            log::warn!("announce_roster called on non-host context; not broadcasting");
            return Ok(());
        }
        let mut data = Map::new();
        data.insert("players".into(), Value::Array(players));
        self.client.send(EVENT_ROSTER, data)
    }

    /// Seed the shared rng. The host also propagates the seed so every
    /// participant's rng replays the identical sequence.
    pub fn set_seed(&mut self, seed: u64) -> Result<(), TransportError> {
        self.rng.reseed(seed);
        if self.role == Role::Host {
            let mut data = Map::new();
            data.insert("seed".into(), json!(seed));
            self.client.send(EVENT_SEED, data)?;
        }
        Ok(())
    }

    /// Apply the side effects of a reserved system event, if this is one.
    fn apply_reserved(&mut self, message: &Message) {
        match message.event.as_str() {
            EVENT_ASSIGN_ID => {
                // The host's id is fixed; it never accepts a correction.
                if self.role == Role::Host {
                    return;
                }
                // Adopt an assignment only while unassigned, so corrections
                // meant for later joiners don't disturb this participant.
                if self.id_assigned {
                    return;
                }
                match message.int_field("id").and_then(|id| u32::try_from(id).ok()) {
                    Some(id) => {
                        self.client_id = id;
                        self.id_assigned = true;
                    }
                    None => log::warn!("assign_id without a valid id field; ignoring"),
                }
            }
            EVENT_ROSTER => match message.data.get("players").and_then(Value::as_array) {
                Some(players) => self.roster = players.clone(),
                None => log::warn!("roster without a players sequence; ignoring"),
            },
            EVENT_SEED => {
                if self.role == Role::Host {
                    return;
                }
                // Seeds use the full u64 range, so read unsigned.
                match message.uint_field("seed") {
                    Some(seed) => self.rng.reseed(seed),
                    None => log::warn!("seed without a valid seed field; ignoring"),
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};

    use partyline_protocol::framing::encode_frame;

    use super::*;

    /// Connect a Client to a bare listener; returns the context input and
    /// the far stream we can write frames into by hand.
    fn client_and_far_end() -> (Client, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = Client::connect(addr).unwrap();
        let (far, _) = listener.accept().unwrap();
        (client, far)
    }

    /// Push a message into the context from the network side, then poll it
    /// back out.
    fn inject_and_poll(ctx: &mut MultiplayerContext, far: &mut TcpStream, message: &Message) -> Vec<Message> {
        far.write_all(&encode_frame(message).unwrap()).unwrap();
        far.flush().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let polled = ctx.poll(16);
            if !polled.is_empty() {
                return polled;
            }
            assert!(Instant::now() < deadline, "message never arrived");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn assign_id_msg(id: i64) -> Message {
        let mut data = Map::new();
        data.insert("id".into(), json!(id));
        Message::new(EVENT_ASSIGN_ID, data)
    }

    #[test]
    fn host_id_is_fixed_and_preassigned() {
        let (client, _far) = client_and_far_end();
        let ctx = MultiplayerContext::host(client);
        assert_eq!(ctx.role(), Role::Host);
        assert_eq!(ctx.client_id(), HOST_ID);
        assert!(ctx.id_assigned());
    }

    #[test]
    fn joiner_id_is_provisional_until_assign_id() {
        let (client, mut far) = client_and_far_end();
        let mut ctx = MultiplayerContext::join(client);
        assert!(!ctx.id_assigned());
        assert_eq!(ctx.client_id(), 1);

        let polled = inject_and_poll(&mut ctx, &mut far, &assign_id_msg(4));
        // The reserved event is returned, not hidden.
        assert_eq!(polled.len(), 1);
        assert_eq!(polled[0].event, EVENT_ASSIGN_ID);
        assert!(ctx.id_assigned());
        assert_eq!(ctx.client_id(), 4);
    }

    #[test]
    fn host_ignores_incoming_assign_id() {
        let (client, mut far) = client_and_far_end();
        let mut ctx = MultiplayerContext::host(client);
        let polled = inject_and_poll(&mut ctx, &mut far, &assign_id_msg(7));
        assert_eq!(polled.len(), 1);
        assert_eq!(ctx.client_id(), HOST_ID);
        assert!(ctx.id_assigned());
    }

    #[test]
    fn second_assign_id_does_not_disturb_assigned_client() {
        let (client, mut far) = client_and_far_end();
        let mut ctx = MultiplayerContext::join(client);
        inject_and_poll(&mut ctx, &mut far, &assign_id_msg(2));
        assert_eq!(ctx.client_id(), 2);
        inject_and_poll(&mut ctx, &mut far, &assign_id_msg(9));
        assert_eq!(ctx.client_id(), 2, "later assignment is for someone else");
    }

    #[test]
    fn out_of_range_assign_id_is_ignored() {
        let (client, mut far) = client_and_far_end();
        let mut ctx = MultiplayerContext::join(client);

        inject_and_poll(&mut ctx, &mut far, &assign_id_msg(-1));
        assert!(!ctx.id_assigned());

        inject_and_poll(&mut ctx, &mut far, &assign_id_msg(u32::MAX as i64 + 1));
        assert!(!ctx.id_assigned(), "oversized id must not be truncated");
        assert_eq!(ctx.client_id(), 1);

        inject_and_poll(&mut ctx, &mut far, &assign_id_msg(5));
        assert_eq!(ctx.client_id(), 5);
    }

    #[test]
    fn roster_event_updates_state_and_is_returned() {
        let (client, mut far) = client_and_far_end();
        let mut ctx = MultiplayerContext::join(client);

        let mut data = Map::new();
        data.insert("players".into(), json!(["Host", "Guest"]));
        let roster = Message::new(EVENT_ROSTER, data);
        let polled = inject_and_poll(&mut ctx, &mut far, &roster);

        assert_eq!(polled[0].event, EVENT_ROSTER);
        assert_eq!(ctx.roster(), &[json!("Host"), json!("Guest")]);
    }

    #[test]
    fn seed_event_reseeds_a_client_but_not_the_host() {
        let (client, mut far) = client_and_far_end();
        let mut ctx = MultiplayerContext::join(client);
        let mut data = Map::new();
        data.insert("seed".into(), json!(777));
        inject_and_poll(&mut ctx, &mut far, &Message::new(EVENT_SEED, data.clone()));
        assert_eq!(ctx.rng().next_u64(), SessionRng::new(777).next_u64());

        let (client, mut far) = client_and_far_end();
        let mut ctx = MultiplayerContext::host(client);
        inject_and_poll(&mut ctx, &mut far, &Message::new(EVENT_SEED, data));
        // Host keeps its own stream.
        assert_eq!(ctx.rng().next_u64(), SessionRng::new(DEFAULT_SEED).next_u64());
    }

    #[test]
    fn seed_beyond_i64_range_still_aligns_streams() {
        let big_seed = u64::MAX - 1;
        let (client, mut far) = client_and_far_end();
        let mut ctx = MultiplayerContext::join(client);

        let mut data = Map::new();
        data.insert("seed".into(), json!(big_seed));
        inject_and_poll(&mut ctx, &mut far, &Message::new(EVENT_SEED, data));

        assert_eq!(
            ctx.rng().next_u64(),
            SessionRng::new(big_seed).next_u64(),
            "client rng must match a host seeded with the same value"
        );
    }

    #[test]
    fn send_every_throttles_within_interval() {
        let (client, _far) = client_and_far_end();
        let mut ctx = MultiplayerContext::host(client);
        let interval = Duration::from_millis(50);
        let data = Map::new();

        assert!(ctx.send_every("pos", data.clone(), interval).unwrap());
        assert!(!ctx.send_every("pos", data.clone(), interval).unwrap());
        assert!(!ctx.send_every("pos", data.clone(), interval).unwrap());

        std::thread::sleep(interval + Duration::from_millis(10));
        assert!(ctx.send_every("pos", data.clone(), interval).unwrap());

        // Independent limiter per event name.
        assert!(ctx.send_every("chat", data, interval).unwrap());
    }

    #[test]
    fn assign_peer_id_from_non_host_is_a_noop() {
        let (client, _far) = client_and_far_end();
        let mut ctx = MultiplayerContext::join(client);
        // Degrades silently rather than erroring.
        ctx.assign_peer_id(3).unwrap();
    }
}
