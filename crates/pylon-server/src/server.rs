//! Server lifecycle and control surface.
//!
//! [`PylonServer`] owns a dedicated tokio runtime for the listen socket and
//! every connection task. `start()` binds synchronously and returns once the
//! socket is live; `stop()` blocks until every session has been closed,
//! drained, and reported to the observer. Both are safe to call from plain
//! (non-async) threads, which is where embedders drive the lifecycle from.

use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use pylon_auth::ServerAuth;
use pylon_core::{CloseCode, SessionHandle};

use crate::config::SettingsProvider;
use crate::dispatch::RequestDispatcher;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::observer::SessionObserver;
use crate::websocket::broadcast::BroadcastEngine;
use crate::websocket::handshake::ws_handler;
use crate::websocket::registry::SessionRegistry;
use crate::websocket::session::SessionSnapshot;

/// Shared state handed to every route handler.
#[derive(Clone)]
pub(crate) struct AppState {
    /// Live session map, shared with the broadcast engine.
    pub(crate) registry: Arc<SessionRegistry>,
    /// Per-start auth material (salt, derived secret).
    pub(crate) auth: Arc<ServerAuth>,
    /// Embedder's request handler.
    pub(crate) dispatcher: Arc<dyn RequestDispatcher>,
    /// Embedder's lifecycle listener.
    pub(crate) observer: Arc<dyn SessionObserver>,
    /// Tracks every connection driver task so `stop()` can wait for them.
    pub(crate) session_tasks: TaskTracker,
    /// Cancelled during shutdown to force lingering read loops to exit.
    pub(crate) halt: CancellationToken,
    /// When this server generation started listening.
    pub(crate) started_at: Instant,
}

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.started_at, state.registry.len()))
}

/// Everything that exists only while the server is listening.
///
/// Dropped as the last step of `stop()`, which tears down the runtime after
/// all tasks have finished.
struct RunningState {
    runtime: Runtime,
    registry: Arc<SessionRegistry>,
    broadcast: BroadcastEngine,
    session_tasks: TaskTracker,
    accept_token: CancellationToken,
    halt: CancellationToken,
    serve_handle: JoinHandle<()>,
    local_addr: SocketAddr,
    auth: Arc<ServerAuth>,
    password: String,
}

/// WebSocket session server.
///
/// Holds the pluggable seams (settings, dispatcher, observer) for its whole
/// lifetime and a mutex-guarded running state that exists only between
/// `start()` and `stop()`. Restarting re-reads settings and regenerates the
/// auth salt, so sessions never outlive the generation that accepted them.
pub struct PylonServer {
    settings: Arc<dyn SettingsProvider>,
    dispatcher: Arc<dyn RequestDispatcher>,
    observer: Arc<dyn SessionObserver>,
    state: Mutex<Option<RunningState>>,
}

impl PylonServer {
    /// Create a stopped server around the embedder's seams.
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        dispatcher: Arc<dyn RequestDispatcher>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            settings,
            dispatcher,
            observer,
            state: Mutex::new(None),
        }
    }

    /// Bind the listen socket and start serving.
    ///
    /// Reads settings fresh, generates this generation's auth salt and
    /// secret, binds synchronously (so a bind failure surfaces here, with no
    /// partial state left behind), then hands the socket to a dedicated
    /// runtime. A `start()` while already listening logs and returns `Ok`.
    pub fn start(&self) -> Result<(), ServerError> {
        let mut guard = self.state.lock();
        if guard.is_some() {
            warn!("start requested while already listening, ignoring");
            return Ok(());
        }

        let settings = self.settings.load();
        let auth = Arc::new(ServerAuth::generate(
            &settings.password,
            settings.auth_required,
        ));

        let bind_addr = format!("{}:{}", settings.host, settings.port);
        let listener = StdTcpListener::bind(&bind_addr).map_err(|source| ServerError::Bind {
            addr: bind_addr.clone(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("pylon-io")
            .build()?;

        let registry = Arc::new(SessionRegistry::new());
        let broadcast = BroadcastEngine::new(registry.clone(), runtime.handle().clone());
        let session_tasks = TaskTracker::new();
        let accept_token = CancellationToken::new();
        let halt = CancellationToken::new();

        let router = build_router(AppState {
            registry: registry.clone(),
            auth: auth.clone(),
            dispatcher: self.dispatcher.clone(),
            observer: self.observer.clone(),
            session_tasks: session_tasks.clone(),
            halt: halt.clone(),
            started_at: Instant::now(),
        });

        let shutdown = accept_token.clone();
        let serve_handle = runtime.spawn(async move {
            // from_std needs the runtime's reactor, so adoption happens here
            // rather than in start() itself.
            let listener = match tokio::net::TcpListener::from_std(listener) {
                Ok(listener) => listener,
                Err(err) => {
                    error!(error = %err, "failed to adopt listen socket into runtime");
                    return;
                }
            };
            let serve = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(err) = serve.await {
                error!(error = %err, "server task failed");
            }
        });

        info!(address = %local_addr, auth_required = auth.required, "websocket server listening");
        *guard = Some(RunningState {
            runtime,
            registry,
            broadcast,
            session_tasks,
            accept_token,
            halt,
            serve_handle,
            local_addr,
            auth,
            password: settings.password,
        });
        Ok(())
    }

    /// Stop serving and block until every session is torn down.
    ///
    /// Ordering: stop accepting, ask every live session to close with
    /// `GoingAway` (1001), drain queued broadcasts so in-flight events still
    /// deliver, force any lingering read loop to exit, then wait for all
    /// session tasks and the serve task. When this returns, every observer
    /// disconnect notification has fired and the runtime is gone.
    ///
    /// Must be called from outside the server's runtime, i.e. from a plain
    /// thread. A `stop()` while not listening is a no-op.
    pub fn stop(&self) {
        let taken = self.state.lock().take();
        let Some(mut state) = taken else {
            debug!("stop requested while not listening, ignoring");
            return;
        };

        info!("stopping websocket server");
        state.accept_token.cancel();

        state.registry.for_each_locked(|session| {
            if !session.request_close(CloseCode::GoingAway) {
                warn!(handle = %session.handle, "failed to queue going-away close");
            }
        });

        let _ = state.session_tasks.close();
        state.runtime.block_on(async {
            state.broadcast.drain().await;
            state.halt.cancel();
            state.session_tasks.wait().await;
            if let Err(err) = (&mut state.serve_handle).await {
                error!(error = %err, "server task join failed");
            }
        });

        // Runtime drop joins its worker threads; nothing is left on it.
        drop(state);
        info!("websocket server stopped");
    }

    /// Whether the server is currently listening.
    pub fn is_listening(&self) -> bool {
        self.state.lock().is_some()
    }

    /// The bound socket address, if listening.
    ///
    /// Reflects the actual port when the configured port was `0`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.state.lock().as_ref().map(|state| state.local_addr)
    }

    /// Snapshots of every live session; empty when not listening.
    pub fn sessions(&self) -> Vec<SessionSnapshot> {
        self.state
            .lock()
            .as_ref()
            .map(|state| state.registry.snapshot_all())
            .unwrap_or_default()
    }

    /// Publish an event to every identified session whose subscription mask
    /// intersects `required_intent`.
    ///
    /// Callable from any thread. Serialization happens at most once per
    /// encoding, lazily, on the server's runtime. Returns whether the event
    /// was accepted for delivery; events published while stopped or stopping
    /// are dropped.
    pub fn publish(
        &self,
        required_intent: u64,
        event_type: impl Into<String>,
        event_data: Option<Value>,
    ) -> bool {
        let guard = self.state.lock();
        let Some(state) = guard.as_ref() else {
            debug!("publish while not listening, dropping event");
            return false;
        };
        state.broadcast.publish(required_intent, event_type, event_data)
    }

    /// Kick one session with close code 4001.
    ///
    /// The session leaves the registry when its driver task finishes the
    /// close, not here. Returns whether the close frame was queued.
    pub fn invalidate(&self, handle: &SessionHandle) -> bool {
        let guard = self.state.lock();
        let Some(state) = guard.as_ref() else {
            return false;
        };
        let Some(session) = state.registry.get(handle) else {
            debug!(%handle, "invalidate for unknown session, ignoring");
            return false;
        };
        info!(handle = %session.handle, "invalidating session");
        let queued = session.request_close(CloseCode::SessionInvalidated);
        if !queued {
            warn!(handle = %session.handle, "failed to queue invalidation close");
        }
        queued
    }

    /// Connect string for client onboarding, `None` when not listening.
    ///
    /// `pylon|<address>:<port>`, with `|<password>` appended when auth is
    /// required. The address is the advertisable LAN address, not the bind
    /// address.
    pub fn connect_string(&self) -> Option<String> {
        let guard = self.state.lock();
        let state = guard.as_ref()?;
        let mut connect = format!(
            "pylon|{}:{}",
            pylon_platform::local_address(),
            state.local_addr.port()
        );
        if state.auth.required {
            connect.push('|');
            connect.push_str(&state.password);
        }
        Some(connect)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
