//! Learning-event forwarding
//!
//! Statements emitted by the content runtime go through an
//! [`EventDispatcher`] before they reach the external [`EventSink`]:
//! deny-listed verbs are dropped, and noisy verbs are debounced per verb
//! with a leading and a trailing edge.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

/// A statement emitted by the content runtime
#[derive(Debug, Clone, PartialEq)]
pub struct XapiEvent {
    /// Short verb name (last segment of the verb id)
    pub verb: String,

    /// The full statement
    pub statement: Value,
}

impl XapiEvent {
    /// Create an event with a bare statement
    pub fn new(verb: impl Into<String>) -> Self {
        let verb = verb.into();
        let statement = serde_json::json!({
            "verb": { "id": format!("http://adlnet.gov/expapi/verbs/{}", verb) }
        });
        Self { verb, statement }
    }

    /// Extract the verb from a statement's `verb.id`
    ///
    /// `http://adlnet.gov/expapi/verbs/answered` becomes `answered`.
    pub fn from_statement(statement: Value) -> Option<Self> {
        let id = statement.get("verb")?.get("id")?.as_str()?;
        let verb = id.trim_end_matches('/').rsplit('/').next()?.to_string();
        if verb.is_empty() {
            return None;
        }
        Some(Self { verb, statement })
    }
}

/// Destination of forwarded events
pub trait EventSink: Send + Sync {
    fn report(&self, event: XapiEvent);
}

/// Sink that keeps every reported event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<XapiEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reported events, oldest first
    pub fn events(&self) -> Vec<XapiEvent> {
        self.events.lock().clone()
    }

    /// Verbs of the reported events, oldest first
    pub fn verbs(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.verb.clone()).collect()
    }
}

impl EventSink for RecordingSink {
    fn report(&self, event: XapiEvent) {
        self.events.lock().push(event);
    }
}

/// Which verbs are dropped and which are debounced
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EventPolicy {
    /// Verbs never forwarded
    pub deny: Vec<String>,

    /// Verbs forwarded at most once per quiet window, plus a trailing report
    pub debounce: Vec<String>,

    /// Quiet window in milliseconds
    pub debounce_ms: u64,
}

impl Default for EventPolicy {
    fn default() -> Self {
        Self {
            deny: vec![
                "attempted".to_string(),
                "experienced".to_string(),
                "progressed".to_string(),
            ],
            debounce: vec!["interacted".to_string()],
            debounce_ms: 5000,
        }
    }
}

impl EventPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn is_denied(&self, verb: &str) -> bool {
        self.deny.iter().any(|v| v == verb)
    }

    pub fn is_debounced(&self, verb: &str) -> bool {
        self.debounce.iter().any(|v| v == verb)
    }
}

/// Result of offering an event to the [`Debouncer`]
#[derive(Debug, Default, PartialEq)]
pub struct Offer {
    /// Events to report now, in order
    pub fire: Vec<XapiEvent>,

    /// Set when a new window opened: the caller must call
    /// [`Debouncer::expire`] at this instant
    pub arm: Option<Instant>,
}

/// Result of checking a verb's window
#[derive(Debug, PartialEq)]
pub enum Expiry {
    /// No open window
    Idle,

    /// Window still open; check again at this instant
    Pending(Instant),

    /// Window closed, with the trailing event if one is due
    Closed(Option<XapiEvent>),
}

#[derive(Debug)]
struct Window {
    deadline: Instant,
    pending: Option<XapiEvent>,
}

/// Per-verb debounce state machine
///
/// The first event of a verb fires immediately and opens a window. Every
/// further event inside the window replaces the pending one and pushes the
/// deadline back. When the deadline passes the pending event, if any, fires
/// as the trailing edge and the window closes.
///
/// Time is passed in explicitly; the machine never reads a clock.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    windows: HashMap<String, Window>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            windows: HashMap::new(),
        }
    }

    /// Offer an event observed at `now`
    pub fn offer(&mut self, event: XapiEvent, now: Instant) -> Offer {
        let mut offer = Offer::default();

        if let Some(window) = self.windows.get_mut(&event.verb) {
            if now < window.deadline {
                window.pending = Some(event);
                window.deadline = now + self.delay;
                return offer;
            }
        }

        // No window, or one whose deadline passed before its timer ran
        if let Some(stale) = self.windows.remove(&event.verb) {
            offer.fire.extend(stale.pending);
        }

        let deadline = now + self.delay;
        self.windows.insert(
            event.verb.clone(),
            Window {
                deadline,
                pending: None,
            },
        );
        offer.fire.push(event);
        offer.arm = Some(deadline);
        offer
    }

    /// Check a verb's window at `now`
    pub fn expire(&mut self, verb: &str, now: Instant) -> Expiry {
        let deadline = match self.windows.get(verb) {
            None => return Expiry::Idle,
            Some(window) => window.deadline,
        };
        if now < deadline {
            return Expiry::Pending(deadline);
        }
        match self.windows.remove(verb) {
            Some(window) => Expiry::Closed(window.pending),
            None => Expiry::Idle,
        }
    }

    /// Close every window, returning the trailing events still due
    pub fn drain(&mut self) -> Vec<XapiEvent> {
        let mut verbs: Vec<String> = self.windows.keys().cloned().collect();
        verbs.sort();
        verbs
            .into_iter()
            .filter_map(|verb| self.windows.remove(&verb))
            .filter_map(|window| window.pending)
            .collect()
    }

    /// Check if a verb has an open window
    pub fn is_open(&self, verb: &str) -> bool {
        self.windows.contains_key(verb)
    }
}

struct DispatcherInner {
    deny: HashSet<String>,
    debounce: HashSet<String>,
    sink: Arc<dyn EventSink>,
    debouncer: Mutex<Debouncer>,
    handle: Handle,
}

/// Filters and debounces events on their way to a sink
///
/// Trailing reports are delivered from timer tasks spawned on the runtime
/// handle given at construction.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<DispatcherInner>,
}

impl EventDispatcher {
    /// Create a dispatcher; the policy is fixed from here on
    pub fn new(policy: &EventPolicy, sink: Arc<dyn EventSink>, handle: Handle) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                deny: policy.deny.iter().cloned().collect(),
                debounce: policy.debounce.iter().cloned().collect(),
                sink,
                debouncer: Mutex::new(Debouncer::new(policy.delay())),
                handle,
            }),
        }
    }

    /// Forward an event according to the policy
    ///
    /// Returns `false` if the verb is deny-listed.
    pub fn dispatch(&self, event: XapiEvent) -> bool {
        let inner = &self.inner;
        if inner.deny.contains(&event.verb) {
            return false;
        }
        if !inner.debounce.contains(&event.verb) {
            inner.sink.report(event);
            return true;
        }

        let verb = event.verb.clone();
        let now = tokio::time::Instant::now().into_std();
        let offer = inner.debouncer.lock().offer(event, now);

        for event in offer.fire {
            inner.sink.report(event);
        }
        if let Some(deadline) = offer.arm {
            self.arm(verb, deadline);
        }
        true
    }

    /// Report every pending trailing event now
    pub fn flush(&self) {
        let pending = self.inner.debouncer.lock().drain();
        for event in pending {
            self.inner.sink.report(event);
        }
    }

    fn arm(&self, verb: String, deadline: Instant) {
        let inner = Arc::clone(&self.inner);
        self.inner.handle.spawn(async move {
            let mut wake = deadline;
            loop {
                tokio::time::sleep_until(tokio::time::Instant::from_std(wake)).await;
                let now = tokio::time::Instant::now().into_std();
                let expiry = inner.debouncer.lock().expire(&verb, now);
                match expiry {
                    Expiry::Pending(next) => wake = next,
                    Expiry::Closed(trailing) => {
                        if let Some(event) = trailing {
                            inner.sink.report(event);
                        }
                        break;
                    }
                    Expiry::Idle => break,
                }
            }
        });
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("deny", &self.inner.deny)
            .field("debounce", &self.inner.debounce)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_verb_from_statement() {
        let statement = serde_json::json!({
            "verb": { "id": "http://adlnet.gov/expapi/verbs/answered" },
            "result": { "score": { "raw": 1 } }
        });
        let event = XapiEvent::from_statement(statement).unwrap();
        assert_eq!(event.verb, "answered");

        assert!(XapiEvent::from_statement(serde_json::json!({"verb": {}})).is_none());
    }

    #[test]
    fn test_default_policy() {
        let policy = EventPolicy::default();
        assert!(policy.is_denied("progressed"));
        assert!(policy.is_debounced("interacted"));
        assert!(!policy.is_denied("answered"));
        assert_eq!(policy.delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_leading_then_trailing() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(ms(5000));

        let offer = debouncer.offer(XapiEvent::new("interacted"), start);
        assert_eq!(offer.fire.len(), 1);
        assert_eq!(offer.arm, Some(start + ms(5000)));

        // Ten more inside the window: all absorbed, deadline keeps moving
        for i in 1..=10 {
            let offer = debouncer.offer(XapiEvent::new("interacted"), start + ms(i * 400));
            assert!(offer.fire.is_empty());
            assert!(offer.arm.is_none());
        }

        assert_eq!(
            debouncer.expire("interacted", start + ms(5000)),
            Expiry::Pending(start + ms(9000))
        );
        match debouncer.expire("interacted", start + ms(9000)) {
            Expiry::Closed(Some(event)) => assert_eq!(event.verb, "interacted"),
            other => panic!("expected trailing event, got {:?}", other),
        }
        assert_eq!(debouncer.expire("interacted", start + ms(9001)), Expiry::Idle);
    }

    #[test]
    fn test_single_event_has_no_trailing_edge() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(ms(100));

        debouncer.offer(XapiEvent::new("interacted"), start);
        assert_eq!(debouncer.expire("interacted", start + ms(100)), Expiry::Closed(None));
        assert!(!debouncer.is_open("interacted"));
    }

    #[test]
    fn test_verbs_are_independent() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(ms(100));

        assert_eq!(debouncer.offer(XapiEvent::new("a"), start).fire.len(), 1);
        assert_eq!(debouncer.offer(XapiEvent::new("b"), start).fire.len(), 1);
        assert!(debouncer.offer(XapiEvent::new("a"), start + ms(10)).fire.is_empty());
    }

    #[test]
    fn test_stale_window_flushes_before_new_leading() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(ms(100));

        debouncer.offer(XapiEvent::new("a"), start);
        debouncer.offer(XapiEvent::new("a"), start + ms(50));

        // The timer never ran; a late event closes the old window first
        let offer = debouncer.offer(XapiEvent::new("a"), start + ms(500));
        assert_eq!(offer.fire.len(), 2);
        assert_eq!(offer.arm, Some(start + ms(600)));
    }

    #[test]
    fn test_drain() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(ms(100));

        debouncer.offer(XapiEvent::new("a"), start);
        debouncer.offer(XapiEvent::new("a"), start + ms(1));
        debouncer.offer(XapiEvent::new("b"), start);

        let drained = debouncer.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].verb, "a");
        assert!(!debouncer.is_open("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatcher_collapses_bursts() {
        let sink = Arc::new(RecordingSink::new());
        let dispatcher =
            EventDispatcher::new(&EventPolicy::default(), sink.clone(), Handle::current());

        for _ in 0..10 {
            assert!(dispatcher.dispatch(XapiEvent::new("interacted")));
            tokio::time::sleep(ms(300)).await;
        }
        assert_eq!(sink.verbs(), vec!["interacted"]);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(sink.verbs(), vec!["interacted", "interacted"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatcher_deny_and_passthrough() {
        let sink = Arc::new(RecordingSink::new());
        let dispatcher =
            EventDispatcher::new(&EventPolicy::default(), sink.clone(), Handle::current());

        assert!(!dispatcher.dispatch(XapiEvent::new("progressed")));
        assert!(!dispatcher.dispatch(XapiEvent::new("attempted")));
        assert!(dispatcher.dispatch(XapiEvent::new("answered")));
        assert!(dispatcher.dispatch(XapiEvent::new("answered")));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(sink.verbs(), vec!["answered", "answered"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_reports_pending() {
        let sink = Arc::new(RecordingSink::new());
        let dispatcher =
            EventDispatcher::new(&EventPolicy::default(), sink.clone(), Handle::current());

        dispatcher.dispatch(XapiEvent::new("interacted"));
        dispatcher.dispatch(XapiEvent::new("interacted"));
        dispatcher.flush();
        assert_eq!(sink.verbs().len(), 2);

        // The timer finds the window closed and stays quiet
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(sink.verbs().len(), 2);
    }
}
