// Process-local publish/subscribe with optional network forwarding.
//
// `EventRouter` keeps a registry of handlers per event name and dispatches
// to them synchronously, in registration order. A `send` carries a routing
// policy choosing local dispatch, forwarding over the transport, or both.
//
// Handlers are keyed: closures have no identity in Rust, so the caller
// names each subscription and "subscribing the same handler twice" means
// reusing the key — a no-op, matching the registry contract. A handler
// returning an error is logged and skipped past; it never blocks the
// remaining handlers or the caller.
//
// Network origin is invisible by design: code that drains the transport
// re-publishes each message locally through `dispatch_incoming`, so the
// same handlers react uniformly to local and network events. The router
// carries no "came from network" flag.

use std::collections::HashMap;

use serde_json::{Map, Value};

use partyline_protocol::message::Message;
use partyline_relay::client::Client;
use partyline_relay::connection::ConnectionSender;
use partyline_relay::error::TransportError;

use crate::context::MultiplayerContext;

/// Per-send routing policy. Unknown route strings coerce to `Local` with
/// the original value preserved in the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Route {
    /// Local subscribers only. The default.
    #[default]
    Local,
    /// Network, addressed at the relay server's own inbox.
    Server,
    /// Network, fanned out to the other participants.
    Clients,
    /// Local subscribers and the network both.
    All,
    /// Network without a more specific destination.
    Net,
}

impl Route {
    /// Parse a route string; `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local" => Some(Self::Local),
            "server" => Some(Self::Server),
            "clients" => Some(Self::Clients),
            "all" => Some(Self::All),
            "net" => Some(Self::Net),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Server => "server",
            Self::Clients => "clients",
            Self::All => "all",
            Self::Net => "net",
        }
    }

    fn includes_local(self) -> bool {
        matches!(self, Self::Local | Self::All)
    }

    fn includes_network(self) -> bool {
        matches!(self, Self::Server | Self::Clients | Self::All | Self::Net)
    }
}

/// Anything the router can forward a network-bound send to.
pub trait Transport {
    fn deliver(&mut self, message: &Message) -> Result<(), TransportError>;
}

impl Transport for Client {
    fn deliver(&mut self, message: &Message) -> Result<(), TransportError> {
        self.send_message(message)
    }
}

impl Transport for ConnectionSender {
    fn deliver(&mut self, message: &Message) -> Result<(), TransportError> {
        self.send(message)
    }
}

impl Transport for MultiplayerContext {
    fn deliver(&mut self, message: &Message) -> Result<(), TransportError> {
        self.send_message(message)
    }
}

type Handler = Box<dyn FnMut(&Message) -> Result<(), String> + Send>;

/// Event name → ordered handler list, plus an optional default transport.
#[derive(Default)]
pub struct EventRouter {
    handlers: HashMap<String, Vec<(String, Handler)>>,
    transport: Option<Box<dyn Transport + Send>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the transport used by network-bound sends that don't supply
    /// their own.
    pub fn set_transport(&mut self, transport: Box<dyn Transport + Send>) {
        self.transport = Some(transport);
    }

    /// Subscribe `handler` to `event` under `key`. Insertion order is call
    /// order; re-subscribing an existing `(event, key)` pair is a no-op.
    pub fn connect<F>(&mut self, event: &str, key: &str, handler: F)
    where
        F: FnMut(&Message) -> Result<(), String> + Send + 'static,
    {
        let list = self.handlers.entry(event.to_string()).or_default();
        if list.iter().any(|(k, _)| k == key) {
            return;
        }
        list.push((key.to_string(), Box::new(handler)));
    }

    /// Remove one keyed handler. Returns whether anything was removed.
    pub fn disconnect(&mut self, event: &str, key: &str) -> bool {
        match self.handlers.get_mut(event) {
            Some(list) => {
                let before = list.len();
                list.retain(|(k, _)| k != key);
                before != list.len()
            }
            None => false,
        }
    }

    /// Remove every handler for `event`.
    pub fn disconnect_all(&mut self, event: &str) {
        self.handlers.remove(event);
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.get(event).map_or(0, Vec::len)
    }

    /// Publish to local subscribers only — the default route.
    pub fn publish(
        &mut self,
        event: &str,
        payload: Map<String, Value>,
    ) -> Result<(), TransportError> {
        self.send(event, payload, Route::Local.as_str())
    }

    /// Publish with the default local inclusion for `route` and the
    /// router's own transport.
    pub fn send(
        &mut self,
        event: &str,
        payload: Map<String, Value>,
        route: &str,
    ) -> Result<(), TransportError> {
        self.send_with(event, payload, route, None, None)
    }

    /// Publish an event under a routing policy.
    ///
    /// 1. Unknown routes coerce to local; the original route string is
    ///    preserved in the payload under `"route"`, never dropped.
    /// 2. Local dispatch happens when the route includes it, unless
    ///    overridden by `include_local`.
    /// 3. Network-bound routes go to `transport_override`, falling back to
    ///    the router's default transport; with neither attached the forward
    ///    is a no-op, not an error.
    pub fn send_with(
        &mut self,
        event: &str,
        payload: Map<String, Value>,
        route: &str,
        include_local: Option<bool>,
        transport_override: Option<&mut dyn Transport>,
    ) -> Result<(), TransportError> {
        let (route, message) = match Route::parse(route) {
            Some(parsed) => (parsed, Message::new(event, payload)),
            None => {
                log::warn!("unknown route {route:?} for event {event:?}; treating as local");
                let mut payload = payload;
                // A caller-supplied "route" key wins over the annotation.
                payload
                    .entry("route")
                    .or_insert_with(|| Value::String(route.to_string()));
                (Route::Local, Message::new(event, payload))
            }
        };

        if include_local.unwrap_or(route.includes_local()) {
            self.dispatch_local(&message);
        }

        if route.includes_network() {
            match transport_override {
                Some(transport) => transport.deliver(&message)?,
                None => match self.transport.as_mut() {
                    Some(transport) => transport.deliver(&message)?,
                    None => {
                        log::debug!(
                            "no transport attached; dropping network-bound event {event:?}"
                        );
                    }
                },
            }
        }

        Ok(())
    }

    /// Re-publish a message received from the transport to local
    /// subscribers. This is the named half of the "network message becomes
    /// a local event" convention, so it is directly testable.
    pub fn dispatch_incoming(&mut self, message: &Message) {
        self.dispatch_local(message);
    }

    /// Invoke every handler for the message's event in registration order.
    /// A failing handler is logged and does not stop the rest.
    fn dispatch_local(&mut self, message: &Message) {
        if let Some(list) = self.handlers.get_mut(&message.event) {
            for (key, handler) in list.iter_mut() {
                if let Err(err) = handler(message) {
                    log::warn!(
                        "handler {key:?} for event {:?} failed: {err}",
                        message.event
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    /// Transport double that records everything delivered to it.
    #[derive(Clone, Default)]
    struct RecordingTransport {
        sent: Arc<Mutex<Vec<Message>>>,
    }

    impl RecordingTransport {
        fn sent(&self) -> Vec<Message> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Transport for RecordingTransport {
        fn deliver(&mut self, message: &Message) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn counter_handler(
        counter: &Arc<AtomicUsize>,
    ) -> impl FnMut(&Message) -> Result<(), String> + use<> {
        let counter = counter.clone();
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn local_route_fires_handlers_and_skips_transport() {
        let mut router = EventRouter::new();
        let transport = RecordingTransport::default();
        router.set_transport(Box::new(transport.clone()));

        let count = Arc::new(AtomicUsize::new(0));
        router.connect("jump", "game", counter_handler(&count));

        router.send("jump", Map::new(), "local").unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn server_route_forwards_once_without_local_dispatch() {
        let mut router = EventRouter::new();
        let transport = RecordingTransport::default();
        router.set_transport(Box::new(transport.clone()));

        let count = Arc::new(AtomicUsize::new(0));
        router.connect("score", "hud", counter_handler(&count));

        router.send("score", Map::new(), "server").unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(transport.sent()[0].event, "score");
    }

    #[test]
    fn all_route_does_both() {
        let mut router = EventRouter::new();
        let transport = RecordingTransport::default();
        router.set_transport(Box::new(transport.clone()));

        let count = Arc::new(AtomicUsize::new(0));
        router.connect("sync", "world", counter_handler(&count));

        router.send("sync", Map::new(), "all").unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn include_local_override_beats_route_default() {
        let mut router = EventRouter::new();
        let transport = RecordingTransport::default();
        router.set_transport(Box::new(transport.clone()));

        let count = Arc::new(AtomicUsize::new(0));
        router.connect("shot", "sfx", counter_handler(&count));

        // Network route, but locally dispatched anyway.
        router
            .send_with("shot", Map::new(), "net", Some(true), None)
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(transport.sent().len(), 1);

        // Local route, local dispatch suppressed.
        router
            .send_with("shot", Map::new(), "local", Some(false), None)
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_route_coerces_to_local_and_preserves_value() {
        let mut router = EventRouter::new();
        let transport = RecordingTransport::default();
        router.set_transport(Box::new(transport.clone()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_sink = seen.clone();
        router.connect("warp", "debug", move |m: &Message| {
            seen_sink.lock().unwrap().push(m.clone());
            Ok(())
        });

        router.send("warp", Map::new(), "sideways").unwrap();

        // Treated as local: handler fired, transport untouched.
        assert!(transport.sent().is_empty());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        // Original route value preserved inside the payload.
        assert_eq!(seen[0].data.get("route"), Some(&json!("sideways")));
    }

    #[test]
    fn unknown_route_keeps_caller_supplied_route_key() {
        let mut router = EventRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_sink = seen.clone();
        router.connect("warp", "debug", move |m: &Message| {
            seen_sink.lock().unwrap().push(m.clone());
            Ok(())
        });

        let mut payload = Map::new();
        payload.insert("route".into(), json!("/maps/castle"));
        router.send("warp", payload, "sideways").unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].data.get("route"), Some(&json!("/maps/castle")));
    }

    #[test]
    fn publish_is_local_only() {
        let mut router = EventRouter::new();
        let transport = RecordingTransport::default();
        router.set_transport(Box::new(transport.clone()));

        let count = Arc::new(AtomicUsize::new(0));
        router.connect("pause", "menu", counter_handler(&count));

        router.publish("pause", Map::new()).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn missing_transport_is_a_noop_not_an_error() {
        let mut router = EventRouter::new();
        router.send("ghost", Map::new(), "clients").unwrap();
    }

    #[test]
    fn transport_override_wins_over_default() {
        let mut router = EventRouter::new();
        let default_transport = RecordingTransport::default();
        router.set_transport(Box::new(default_transport.clone()));

        let mut override_transport = RecordingTransport::default();
        router
            .send_with(
                "direct",
                Map::new(),
                "clients",
                None,
                Some(&mut override_transport),
            )
            .unwrap();

        assert!(default_transport.sent().is_empty());
        assert_eq!(override_transport.sent().len(), 1);
    }

    #[test]
    fn duplicate_subscribe_is_a_noop() {
        let mut router = EventRouter::new();
        let count = Arc::new(AtomicUsize::new(0));
        router.connect("tick", "game", counter_handler(&count));
        router.connect("tick", "game", counter_handler(&count));
        assert_eq!(router.handler_count("tick"), 1);

        router.send("tick", Map::new(), "local").unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let mut router = EventRouter::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            let order = order.clone();
            router.connect("step", name, move |_| {
                order.lock().unwrap().push(name);
                Ok(())
            });
        }

        router.send("step", Map::new(), "local").unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn failing_handler_does_not_block_the_rest() {
        let mut router = EventRouter::new();
        let count = Arc::new(AtomicUsize::new(0));
        router.connect("boom", "fragile", |_| Err("exploded".into()));
        router.connect("boom", "sturdy", counter_handler(&count));

        router.send("boom", Map::new(), "local").unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disconnect_removes_one_handler_or_all() {
        let mut router = EventRouter::new();
        let count = Arc::new(AtomicUsize::new(0));
        router.connect("ev", "a", counter_handler(&count));
        router.connect("ev", "b", counter_handler(&count));

        assert!(router.disconnect("ev", "a"));
        assert!(!router.disconnect("ev", "a"));
        assert_eq!(router.handler_count("ev"), 1);

        router.disconnect_all("ev");
        assert_eq!(router.handler_count("ev"), 0);

        router.send("ev", Map::new(), "local").unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dispatch_incoming_reaches_local_subscribers() {
        let mut router = EventRouter::new();
        let count = Arc::new(AtomicUsize::new(0));
        router.connect("pos", "world", counter_handler(&count));

        // As if this message just came out of poll().
        let mut data = Map::new();
        data.insert("x".into(), json!(3));
        let incoming = Message::new("pos", data);
        router.dispatch_incoming(&incoming);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn route_parsing_matrix() {
        assert_eq!(Route::parse("local"), Some(Route::Local));
        assert_eq!(Route::parse("server"), Some(Route::Server));
        assert_eq!(Route::parse("clients"), Some(Route::Clients));
        assert_eq!(Route::parse("all"), Some(Route::All));
        assert_eq!(Route::parse("net"), Some(Route::Net));
        assert_eq!(Route::parse("bogus"), None);
        assert_eq!(Route::default(), Route::Local);
        assert_eq!(Route::All.as_str(), "all");
    }
}
