//! Per-connection session state.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};

use axum::extract::ws::Utf8Bytes;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use pylon_core::{CloseCode, Encoding, SessionHandle};

/// A frame queued for the session's writer task.
#[derive(Debug)]
pub enum OutboundFrame {
    /// A text frame (JSON sessions).
    Text(Utf8Bytes),
    /// A binary frame (MsgPack sessions).
    Binary(Bytes),
    /// A close frame; the writer sends it and stops.
    Close(CloseCode),
}

/// Represents one connected WebSocket client.
///
/// Identity fields are fixed when the connection is accepted. Everything the
/// dispatcher and broadcast engine touch concurrently is atomic or mutexed;
/// the transport itself is confined to the connection's driver task.
pub struct Session {
    /// Stable handle for the connection lifetime, the registry key.
    pub handle: SessionHandle,
    /// Peer socket address captured at accept time.
    pub remote_address: String,
    /// Unix timestamp (seconds) when the connection was accepted.
    pub connected_at: u64,
    /// Wire encoding negotiated at handshake; every send uses it.
    pub encoding: Encoding,
    /// Whether the dispatcher has accepted this client's identify step.
    identified: AtomicBool,
    /// Event intent bitmask, maintained by the dispatcher.
    event_subscriptions: AtomicU64,
    /// Challenge issued in `Hello` when the server requires auth.
    auth_challenge: Mutex<Option<String>>,
    /// Data frames received from the peer.
    incoming_messages: AtomicU64,
    /// Messages successfully queued toward the peer.
    outgoing_messages: AtomicU64,
    /// Set once a close has been requested; the read loop stops dispatching.
    closing: AtomicBool,
    /// First close code this side requested (0 = none).
    close_code: AtomicU16,
    /// Send channel to the connection's writer task.
    tx: mpsc::Sender<OutboundFrame>,
}

impl Session {
    /// Create a session for a freshly accepted connection.
    pub fn new(
        handle: SessionHandle,
        remote_address: String,
        encoding: Encoding,
        tx: mpsc::Sender<OutboundFrame>,
    ) -> Self {
        Self {
            handle,
            remote_address,
            connected_at: u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default(),
            encoding,
            identified: AtomicBool::new(false),
            event_subscriptions: AtomicU64::new(0),
            auth_challenge: Mutex::new(None),
            incoming_messages: AtomicU64::new(0),
            outgoing_messages: AtomicU64::new(0),
            closing: AtomicBool::new(false),
            close_code: AtomicU16::new(0),
            tx,
        }
    }

    /// Mark the session identified.
    ///
    /// Flips at most once and never reverts; returns whether this call did
    /// the flip.
    pub fn mark_identified(&self) -> bool {
        !self.identified.swap(true, Ordering::Relaxed)
    }

    /// Whether the identify step has completed.
    pub fn is_identified(&self) -> bool {
        self.identified.load(Ordering::Relaxed)
    }

    /// Replace the event intent bitmask.
    pub fn set_event_subscriptions(&self, mask: u64) {
        self.event_subscriptions.store(mask, Ordering::Relaxed);
    }

    /// Current event intent bitmask.
    pub fn event_subscriptions(&self) -> u64 {
        self.event_subscriptions.load(Ordering::Relaxed)
    }

    /// Store the challenge issued to this session in `Hello`.
    pub fn set_auth_challenge(&self, challenge: impl Into<String>) {
        *self.auth_challenge.lock() = Some(challenge.into());
    }

    /// The challenge issued to this session, if auth is required.
    pub fn auth_challenge(&self) -> Option<String> {
        self.auth_challenge.lock().clone()
    }

    /// Count one received data frame.
    pub fn count_incoming(&self) {
        let _ = self.incoming_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Data frames received from the peer so far.
    pub fn incoming_messages(&self) -> u64 {
        self.incoming_messages.load(Ordering::Relaxed)
    }

    /// Messages successfully queued toward the peer so far.
    pub fn outgoing_messages(&self) -> u64 {
        self.outgoing_messages.load(Ordering::Relaxed)
    }

    /// Queue a text frame toward the peer.
    ///
    /// Returns `false` when the outbound queue is full or the connection is
    /// gone; callers log and move on.
    pub fn send_text(&self, text: impl Into<Utf8Bytes>) -> bool {
        self.queue(OutboundFrame::Text(text.into()))
    }

    /// Queue a binary frame toward the peer.
    pub fn send_binary(&self, payload: impl Into<Bytes>) -> bool {
        self.queue(OutboundFrame::Binary(payload.into()))
    }

    fn queue(&self, frame: OutboundFrame) -> bool {
        if self.tx.try_send(frame).is_ok() {
            let _ = self.outgoing_messages.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Ask the writer to close the connection with `code`.
    ///
    /// Marks the session closing (the read loop stops dispatching) and
    /// records the code for the disconnect notification before attempting
    /// the enqueue, so the recorded reason survives a full queue. Only the
    /// first requested code is kept.
    pub fn request_close(&self, code: CloseCode) -> bool {
        self.closing.store(true, Ordering::Relaxed);
        let _ = self.close_code.compare_exchange(
            0,
            code.code(),
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
        self.tx.try_send(OutboundFrame::Close(code)).is_ok()
    }

    /// Whether a close has been requested for this session.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Relaxed)
    }

    /// The close code this side requested, if any.
    pub fn requested_close_code(&self) -> Option<u16> {
        match self.close_code.load(Ordering::Relaxed) {
            0 => None,
            code => Some(code),
        }
    }

    /// Produce an owned copy of the session's public state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            handle: self.handle.clone(),
            remote_address: self.remote_address.clone(),
            connected_at: self.connected_at,
            incoming_messages: self.incoming_messages(),
            outgoing_messages: self.outgoing_messages(),
        }
    }
}

/// Owned, serializable copy of a session's public state.
///
/// Produced on demand for status queries and observer notifications; never
/// aliases live session state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Stable handle for the connection.
    pub handle: SessionHandle,
    /// Peer socket address captured at accept time.
    pub remote_address: String,
    /// Unix timestamp (seconds) when the connection was accepted.
    pub connected_at: u64,
    /// Data frames received from the peer.
    pub incoming_messages: u64,
    /// Messages successfully queued toward the peer.
    pub outgoing_messages: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn make_session() -> (Session, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(8);
        let session = Session::new(
            SessionHandle::from("sess_1"),
            "192.0.2.10:52000".into(),
            Encoding::Json,
            tx,
        );
        (session, rx)
    }

    #[test]
    fn create_session() {
        let (session, _rx) = make_session();
        assert_eq!(session.handle.as_str(), "sess_1");
        assert_eq!(session.remote_address, "192.0.2.10:52000");
        assert_eq!(session.encoding, Encoding::Json);
        assert!(!session.is_identified());
        assert!(!session.is_closing());
        assert_eq!(session.event_subscriptions(), 0);
        assert!(session.connected_at > 0);
    }

    #[test]
    fn mark_identified_flips_once() {
        let (session, _rx) = make_session();
        assert!(session.mark_identified());
        assert!(session.is_identified());
        // Second attempt reports it did not flip.
        assert!(!session.mark_identified());
        assert!(session.is_identified());
    }

    #[test]
    fn event_subscriptions_round_trip() {
        let (session, _rx) = make_session();
        session.set_event_subscriptions(0b1010);
        assert_eq!(session.event_subscriptions(), 0b1010);
        session.set_event_subscriptions(u64::MAX);
        assert_eq!(session.event_subscriptions(), u64::MAX);
    }

    #[test]
    fn auth_challenge_round_trip() {
        let (session, _rx) = make_session();
        assert!(session.auth_challenge().is_none());
        session.set_auth_challenge("challenge-abc");
        assert_eq!(session.auth_challenge().as_deref(), Some("challenge-abc"));
    }

    #[tokio::test]
    async fn send_text_queues_and_counts() {
        let (session, mut rx) = make_session();
        assert!(session.send_text("hello"));
        assert_eq!(session.outgoing_messages(), 1);
        assert_matches!(rx.recv().await, Some(OutboundFrame::Text(text)) if text.as_str() == "hello");
    }

    #[tokio::test]
    async fn send_binary_queues_and_counts() {
        let (session, mut rx) = make_session();
        assert!(session.send_binary(vec![0x90, 0x01]));
        assert_eq!(session.outgoing_messages(), 1);
        assert_matches!(rx.recv().await, Some(OutboundFrame::Binary(b)) if b.as_ref() == [0x90, 0x01]);
    }

    #[test]
    fn send_to_full_queue_returns_false() {
        let (tx, _rx) = mpsc::channel(1);
        let session = Session::new(
            SessionHandle::from("full"),
            "192.0.2.10:52001".into(),
            Encoding::Json,
            tx,
        );
        assert!(session.send_text("first"));
        assert!(!session.send_text("second"));
        // The failed send did not count.
        assert_eq!(session.outgoing_messages(), 1);
    }

    #[test]
    fn send_after_receiver_dropped_returns_false() {
        let (session, rx) = make_session();
        drop(rx);
        assert!(!session.send_text("into the void"));
        assert_eq!(session.outgoing_messages(), 0);
    }

    #[tokio::test]
    async fn request_close_marks_and_queues() {
        let (session, mut rx) = make_session();
        assert!(session.request_close(CloseCode::SessionInvalidated));
        assert!(session.is_closing());
        assert_eq!(session.requested_close_code(), Some(4001));
        assert_matches!(
            rx.recv().await,
            Some(OutboundFrame::Close(CloseCode::SessionInvalidated))
        );
    }

    #[test]
    fn first_close_code_wins() {
        let (session, _rx) = make_session();
        let _ = session.request_close(CloseCode::SessionInvalidated);
        let _ = session.request_close(CloseCode::GoingAway);
        assert_eq!(session.requested_close_code(), Some(4001));
    }

    #[test]
    fn close_code_recorded_even_when_queue_full() {
        let (tx, _rx) = mpsc::channel(1);
        let session = Session::new(
            SessionHandle::from("full"),
            "192.0.2.10:52002".into(),
            Encoding::Json,
            tx,
        );
        assert!(session.send_text("filler"));
        assert!(!session.request_close(CloseCode::GoingAway));
        assert!(session.is_closing());
        assert_eq!(session.requested_close_code(), Some(1001));
    }

    #[test]
    fn incoming_counter() {
        let (session, _rx) = make_session();
        session.count_incoming();
        session.count_incoming();
        session.count_incoming();
        assert_eq!(session.incoming_messages(), 3);
    }

    #[test]
    fn snapshot_copies_state() {
        let (session, _rx) = make_session();
        session.count_incoming();
        let _ = session.send_text("one");
        let snapshot = session.snapshot();
        assert_eq!(snapshot.handle, session.handle);
        assert_eq!(snapshot.remote_address, session.remote_address);
        assert_eq!(snapshot.connected_at, session.connected_at);
        assert_eq!(snapshot.incoming_messages, 1);
        assert_eq!(snapshot.outgoing_messages, 1);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let (session, _rx) = make_session();
        let value = serde_json::to_value(session.snapshot()).unwrap();
        assert_eq!(value["handle"], "sess_1");
        assert_eq!(value["remoteAddress"], "192.0.2.10:52000");
        assert!(value["connectedAt"].is_number());
        assert_eq!(value["incomingMessages"], 0);
        assert_eq!(value["outgoingMessages"], 0);
    }
}
