//! Event fan-out to identified, subscribed sessions.
//!
//! `publish` is callable from any thread and returns once the fan-out job is
//! queued on the server runtime. Jobs run on a semaphore-bounded pool and are
//! tracked, so shutdown can drain them: after [`BroadcastEngine::drain`]
//! completes, every queued event has either been delivered or dropped, and
//! later publishes are rejected.

use std::sync::{Arc, OnceLock};

use axum::extract::ws::Utf8Bytes;
use bytes::Bytes;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use pylon_core::{Encoding, ServerMessage};

use super::registry::SessionRegistry;

/// Upper bound on fan-out jobs running at once.
const MAX_CONCURRENT_FANOUTS: usize = 4;

/// One event's wire payloads, serialized at most once per encoding.
///
/// A fan-out touches only the encodings its recipients actually use; a
/// hundred JSON sessions share one serialization (and one buffer, cloned by
/// reference).
pub(crate) struct EventPayloads {
    message: ServerMessage,
    text: OnceLock<Option<Utf8Bytes>>,
    binary: OnceLock<Option<Bytes>>,
}

impl EventPayloads {
    pub(crate) fn new(message: ServerMessage) -> Self {
        Self {
            message,
            text: OnceLock::new(),
            binary: OnceLock::new(),
        }
    }

    /// The JSON text payload, serialized on first use.
    pub(crate) fn text(&self) -> Option<Utf8Bytes> {
        self.text
            .get_or_init(|| match serde_json::to_string(&self.message) {
                Ok(json) => Some(Utf8Bytes::from(json)),
                Err(err) => {
                    warn!(error = %err, "failed to serialize event as json");
                    None
                }
            })
            .clone()
    }

    /// The MsgPack binary payload, serialized on first use.
    pub(crate) fn binary(&self) -> Option<Bytes> {
        self.binary
            .get_or_init(|| match rmp_serde::to_vec_named(&self.message) {
                Ok(bytes) => Some(Bytes::from(bytes)),
                Err(err) => {
                    warn!(error = %err, "failed to serialize event as msgpack");
                    None
                }
            })
            .clone()
    }
}

/// Queues event fan-outs onto the server runtime.
pub struct BroadcastEngine {
    registry: Arc<SessionRegistry>,
    runtime: Handle,
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
}

impl BroadcastEngine {
    /// Create an engine fanning out over `registry` on `runtime`.
    pub fn new(registry: Arc<SessionRegistry>, runtime: Handle) -> Self {
        Self {
            registry,
            runtime,
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(MAX_CONCURRENT_FANOUTS)),
        }
    }

    /// Queue an event for fan-out to matching sessions.
    ///
    /// Delivery goes to sessions that are identified and whose subscription
    /// mask intersects `required_intent`, each in its own encoding. Returns
    /// whether the job was queued; after [`Self::drain`] every publish is
    /// rejected.
    pub fn publish(
        &self,
        required_intent: u64,
        event_type: impl Into<String>,
        event_data: Option<Value>,
    ) -> bool {
        let event_type = event_type.into();
        if self.tracker.is_closed() {
            debug!(event_type, "broadcast engine draining, dropping event");
            return false;
        }

        let payloads = EventPayloads::new(ServerMessage::event(event_type.clone(), event_data));
        let registry = self.registry.clone();
        let permits = self.permits.clone();
        let job = self.tracker.track_future(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            fan_out(&registry, required_intent, &event_type, &payloads);
        });
        let _ = self.runtime.spawn(job);
        true
    }

    /// Stop accepting events and wait for queued fan-outs to finish.
    pub async fn drain(&self) {
        let _ = self.tracker.close();
        self.tracker.wait().await;
    }

    /// Whether the engine has begun draining.
    pub fn is_draining(&self) -> bool {
        self.tracker.is_closed()
    }
}

/// Deliver one event to every matching session, registry lock held throughout.
fn fan_out(
    registry: &SessionRegistry,
    required_intent: u64,
    event_type: &str,
    payloads: &EventPayloads,
) {
    let mut delivered = 0usize;
    let mut skipped = 0usize;
    registry.for_each_locked(|session| {
        if !session.is_identified() || session.event_subscriptions() & required_intent == 0 {
            skipped += 1;
            return;
        }
        let queued = match session.encoding {
            Encoding::Json => payloads.text().map(|text| session.send_text(text)),
            Encoding::MsgPack => payloads.binary().map(|bytes| session.send_binary(bytes)),
        };
        match queued {
            Some(true) => delivered += 1,
            Some(false) => {
                warn!(handle = %session.handle, event_type, "failed to queue event for session");
                skipped += 1;
            }
            // Serialization failed; already logged by the payload cache.
            None => skipped += 1,
        }
    });
    debug!(event_type, delivered, skipped, "event fan-out complete");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    use pylon_core::SessionHandle;

    use crate::websocket::session::{OutboundFrame, Session};

    fn make_session(
        handle: &str,
        encoding: Encoding,
        identified: bool,
        subscriptions: u64,
    ) -> (Arc<Session>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(8);
        let session = Arc::new(Session::new(
            SessionHandle::from(handle),
            "192.0.2.7:41000".into(),
            encoding,
            tx,
        ));
        if identified {
            let _ = session.mark_identified();
        }
        session.set_event_subscriptions(subscriptions);
        (session, rx)
    }

    fn make_engine(registry: Arc<SessionRegistry>) -> BroadcastEngine {
        BroadcastEngine::new(registry, Handle::current())
    }

    fn text_of(frame: OutboundFrame) -> Utf8Bytes {
        match frame {
            OutboundFrame::Text(text) => text,
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    // ── EventPayloads ───────────────────────────────────────────────

    #[test]
    fn payloads_share_one_buffer_per_encoding() {
        let payloads = EventPayloads::new(ServerMessage::event("A", Some(json!({"x": 1}))));
        let first = payloads.text().unwrap();
        let second = payloads.text().unwrap();
        assert_eq!(first.as_str().as_ptr(), second.as_str().as_ptr());

        let b1 = payloads.binary().unwrap();
        let b2 = payloads.binary().unwrap();
        assert_eq!(b1.as_ptr(), b2.as_ptr());
    }

    #[test]
    fn payload_forms_agree() {
        let payloads = EventPayloads::new(ServerMessage::event("A", Some(json!({"x": 1}))));
        let from_text: Value = serde_json::from_str(payloads.text().unwrap().as_str()).unwrap();
        let from_binary: Value = rmp_serde::from_slice(&payloads.binary().unwrap()).unwrap();
        assert_eq!(from_text, from_binary);
        assert_eq!(from_text["messageType"], "Event");
        assert_eq!(from_text["eventType"], "A");
    }

    // ── publish ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn delivers_to_identified_subscribed_session() {
        let registry = Arc::new(SessionRegistry::new());
        let (session, mut rx) = make_session("s1", Encoding::Json, true, 0b01);
        registry.insert(session);

        let engine = make_engine(registry);
        assert!(engine.publish(0b01, "SceneChanged", Some(json!({"scene": "b"}))));
        engine.drain().await;

        let text = text_of(rx.try_recv().unwrap());
        let value: Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(value["messageType"], "Event");
        assert_eq!(value["eventType"], "SceneChanged");
        assert_eq!(value["eventData"]["scene"], "b");
    }

    #[tokio::test]
    async fn skips_unidentified_session() {
        let registry = Arc::new(SessionRegistry::new());
        let (session, mut rx) = make_session("s1", Encoding::Json, false, u64::MAX);
        registry.insert(session);

        let engine = make_engine(registry);
        let _ = engine.publish(1, "E", None);
        engine.drain().await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn skips_session_without_matching_intent() {
        let registry = Arc::new(SessionRegistry::new());
        let (session, mut rx) = make_session("s1", Encoding::Json, true, 0b10);
        registry.insert(session);

        let engine = make_engine(registry);
        let _ = engine.publish(0b01, "E", None);
        engine.drain().await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn msgpack_session_receives_binary() {
        let registry = Arc::new(SessionRegistry::new());
        let (session, mut rx) = make_session("s1", Encoding::MsgPack, true, 1);
        registry.insert(session);

        let engine = make_engine(registry);
        let _ = engine.publish(1, "InputMuted", Some(json!({"muted": true})));
        engine.drain().await;

        let OutboundFrame::Binary(payload) = rx.try_recv().unwrap() else {
            panic!("expected binary frame");
        };
        let value: Value = rmp_serde::from_slice(&payload).unwrap();
        assert_eq!(value["messageType"], "Event");
        assert_eq!(value["eventType"], "InputMuted");
        assert_eq!(value["eventData"]["muted"], true);
    }

    #[tokio::test]
    async fn one_publish_serializes_once_per_encoding() {
        let registry = Arc::new(SessionRegistry::new());
        let (a, mut rx_a) = make_session("a", Encoding::Json, true, 1);
        let (b, mut rx_b) = make_session("b", Encoding::Json, true, 1);
        registry.insert(a);
        registry.insert(b);

        let engine = make_engine(registry);
        let _ = engine.publish(1, "Shared", Some(json!({"n": 42})));
        engine.drain().await;

        let text_a = text_of(rx_a.try_recv().unwrap());
        let text_b = text_of(rx_b.try_recv().unwrap());
        // Both recipients hold the same underlying buffer.
        assert_eq!(text_a.as_str().as_ptr(), text_b.as_str().as_ptr());
    }

    #[tokio::test]
    async fn delivery_matches_identity_and_intent_across_many_sessions() {
        let registry = Arc::new(SessionRegistry::new());
        let mut should_receive = Vec::new();
        let mut should_not = Vec::new();

        for i in 0..100 {
            let (session, rx) = match i % 5 {
                // 60% identified and subscribed to the published intent
                0 | 1 | 2 => make_session(&format!("s{i}"), Encoding::Json, true, 0b11),
                // 20% identified but subscribed elsewhere
                3 => make_session(&format!("s{i}"), Encoding::Json, true, 0b100),
                // 20% never identified
                _ => make_session(&format!("s{i}"), Encoding::Json, false, 0b11),
            };
            registry.insert(session);
            if i % 5 <= 2 {
                should_receive.push(rx);
            } else {
                should_not.push(rx);
            }
        }

        let engine = make_engine(registry);
        let _ = engine.publish(0b01, "Tick", None);
        engine.drain().await;

        for rx in &mut should_receive {
            assert!(rx.try_recv().is_ok(), "subscribed session missed event");
        }
        for rx in &mut should_not {
            assert!(rx.try_recv().is_err(), "excluded session received event");
        }
    }

    #[tokio::test]
    async fn full_queue_does_not_abort_fan_out() {
        let registry = Arc::new(SessionRegistry::new());

        let (tx, _stuck_rx) = mpsc::channel(1);
        let stuck = Arc::new(Session::new(
            SessionHandle::from("stuck"),
            "192.0.2.7:41001".into(),
            Encoding::Json,
            tx,
        ));
        let _ = stuck.mark_identified();
        stuck.set_event_subscriptions(1);
        assert!(stuck.send_text("filler"));
        registry.insert(stuck);

        let (healthy, mut rx) = make_session("healthy", Encoding::Json, true, 1);
        registry.insert(healthy);

        let engine = make_engine(registry);
        let _ = engine.publish(1, "E", None);
        engine.drain().await;

        assert!(rx.try_recv().is_ok(), "healthy session should still receive");
    }

    #[tokio::test]
    async fn publish_after_drain_is_rejected() {
        let registry = Arc::new(SessionRegistry::new());
        let (session, mut rx) = make_session("s1", Encoding::Json, true, 1);
        registry.insert(session);

        let engine = make_engine(registry);
        engine.drain().await;
        assert!(engine.is_draining());
        assert!(!engine.publish(1, "Late", None));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn drain_waits_for_queued_jobs() {
        let registry = Arc::new(SessionRegistry::new());
        let (session, mut rx) = make_session("s1", Encoding::Json, true, 1);
        registry.insert(session);

        let engine = make_engine(registry);
        for i in 0..20 {
            assert!(engine.publish(1, format!("E{i}"), None));
        }
        engine.drain().await;

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        // Queue capacity is 8, so not all 20 fit, but everything the drain
        // promised has already happened by now: no late deliveries.
        assert!(received > 0);
        assert!(rx.try_recv().is_err());
    }
}
