// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Connection controller (C3): the synchronous-looking
//! `Connection::try_connect` / `try_close` / `send` surface, backed by a
//! `quinn` connection attempt driven on the crate-owned Tokio runtime.
//!
//! The state machine is exactly the one spec.md §3/§4.2 describes —
//! `idle -> connecting -> connected -> closed` or `idle -> connecting ->
//! failed` — implemented with a `std::sync::{Mutex, Condvar}` pair rather
//! than the teacher's `tokio::sync::{RwLock, Notify}` (see `session/state.rs`
//! in the teacher crate): the public API here is a blocking call, not an
//! `async fn`, so the wait primitive has to be the blocking kind even
//! though the work it waits on runs on an async runtime underneath.

use std::net::SocketAddr;
use std::sync::{Arc, Condvar, Mutex};

use crate::error::{CloseError, ConnectError, ConnectErrorKind, StreamSetupFailed};
use crate::parser::PacketSink;
use crate::registry::{self, ConnectionId};
use crate::runtime;
use crate::send::{SendCompletionSink, SendDescriptor};
use crate::stream::StreamHandles;

/// Connection lifecycle state, matching spec.md §3's state enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection attempt has been made yet.
    Idle,
    /// A handshake is in progress.
    Connecting,
    /// The handshake succeeded; the bidirectional stream may or may not be
    /// open yet (see [`ConnectionObserver::on_stream_setup_failed`]).
    Connected,
    /// The connection was closed locally via [`Connection::try_close`] or
    /// remotely by the peer, after having been `Connected`.
    Closed,
    /// The handshake failed and the connection will never become `Connected`.
    Failed,
}

/// Observes events this crate's synchronous API has no return value to
/// carry, because they are discovered after the call that triggered them
/// has already returned successfully.
///
/// Currently this is exactly the `StreamSetupFailed` case described in
/// SPEC_FULL.md §4.2: `try_connect` returns `Ok` as soon as the QUIC
/// handshake completes, but opening the single bidirectional stream is a
/// second, separate async step that can still fail.
pub trait ConnectionObserver: Send + Sync {
    /// The connection reached `connected` but its stream could not be
    /// opened or started.
    fn on_stream_setup_failed(&self, error: &StreamSetupFailed);
}

/// A [`ConnectionObserver`] that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopConnectionObserver;

impl ConnectionObserver for NoopConnectionObserver {
    fn on_stream_setup_failed(&self, _error: &StreamSetupFailed) {}
}

/// Shared state behind a [`Connection`] handle.
///
/// Held by an `Arc` from the public [`Connection`] wrapper and by `Weak`
/// from every spawned background task, per the registry's arena+index
/// pattern (spec.md §9).
pub(crate) struct ConnectionInner {
    state: Mutex<ConnectionState>,
    condvar: Condvar,
    quic_connection: Mutex<Option<quinn::Connection>>,
    stream: Mutex<Option<Arc<StreamHandles>>>,
    sink: Arc<dyn PacketSink>,
    observer: Arc<dyn ConnectionObserver>,
    completion_sink: Arc<dyn SendCompletionSink>,
    registry_id: Mutex<Option<ConnectionId>>,
}

impl ConnectionInner {
    fn new(
        sink: Arc<dyn PacketSink>,
        observer: Arc<dyn ConnectionObserver>,
        completion_sink: Arc<dyn SendCompletionSink>,
    ) -> Self {
        Self {
            state: Mutex::new(ConnectionState::Idle),
            condvar: Condvar::new(),
            quic_connection: Mutex::new(None),
            stream: Mutex::new(None),
            sink,
            observer,
            completion_sink,
            registry_id: Mutex::new(None),
        }
    }

    /// Build a `ConnectionInner` for unit tests that never dial out.
    #[cfg(test)]
    pub(crate) fn new_for_test() -> Self {
        Self::new(
            Arc::new(crate::parser::DiscardingSink),
            Arc::new(NoopConnectionObserver),
            Arc::new(crate::send::NoopSendCompletionSink),
        )
    }

    pub(crate) fn sink(&self) -> Arc<dyn PacketSink> {
        Arc::clone(&self.sink)
    }

    fn set_state(&self, new_state: ConnectionState) {
        {
            let mut state = self.state.lock().unwrap();
            log::debug!("connection state transition: {:?} -> {:?}", *state, new_state);
            *state = new_state;
            self.condvar.notify_all();
        }
        // Terminal states no longer need a registry entry: nothing will
        // ever deliver another event for this connection again, so drop
        // the entry now rather than waiting on the Arc to be dropped.
        if matches!(new_state, ConnectionState::Failed | ConnectionState::Closed) {
            if let Some(id) = self.registry_id.lock().unwrap().take() {
                registry::unregister(id);
            }
        }
    }

    fn wait_until_settled(&self) -> ConnectionState {
        let guard = self.state.lock().unwrap();
        let guard = self
            .condvar
            .wait_while(guard, |s| {
                matches!(s, ConnectionState::Idle | ConnectionState::Connecting)
            })
            .unwrap();
        *guard
    }

    /// Block while the state is `connected`, letting the callback path
    /// (`watch_for_shutdown`) perform the actual transition out of it. A
    /// connection that is `idle`, `connecting`, or already terminal returns
    /// immediately without this caller thread touching the state itself.
    fn wait_while_connected(&self) {
        let guard = self.state.lock().unwrap();
        let _guard = self
            .condvar
            .wait_while(guard, |s| *s == ConnectionState::Connected)
            .unwrap();
    }
}

/// Client-side connection and its single bidirectional stream.
///
/// Mirrors spec.md §6's `Connection` surface: construct with the
/// [`PacketSink`] that will receive inbound bytes, then call
/// [`Connection::try_connect`].
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Create a connection object in the `idle` state. No network activity
    /// occurs until [`Connection::try_connect`] is called.
    #[must_use]
    pub fn new(sink: Arc<dyn PacketSink>) -> Self {
        Self::with_observer(sink, Arc::new(NoopConnectionObserver))
    }

    /// Like [`Connection::new`], additionally registering a
    /// [`ConnectionObserver`] for events that can't be reported through a
    /// direct return value.
    #[must_use]
    pub fn with_observer(sink: Arc<dyn PacketSink>, observer: Arc<dyn ConnectionObserver>) -> Self {
        Self::with_sinks(sink, observer, Arc::new(crate::send::NoopSendCompletionSink))
    }

    /// Like [`Connection::new`], additionally registering a
    /// [`SendCompletionSink`] so callers (and tests) can observe testable
    /// property 3 — exactly one completion notification per submitted
    /// [`Connection::send`] call.
    #[must_use]
    pub fn with_completion_sink(
        sink: Arc<dyn PacketSink>,
        completion_sink: Arc<dyn SendCompletionSink>,
    ) -> Self {
        Self::with_sinks(sink, Arc::new(NoopConnectionObserver), completion_sink)
    }

    /// Full constructor taking all three collaborator sinks.
    #[must_use]
    pub fn with_sinks(
        sink: Arc<dyn PacketSink>,
        observer: Arc<dyn ConnectionObserver>,
        completion_sink: Arc<dyn SendCompletionSink>,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectionInner::new(sink, observer, completion_sink)),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock().unwrap()
    }

    /// Attempt to connect to `host:port`, blocking the calling thread until
    /// the attempt reaches `connected` or `failed`.
    ///
    /// `bind_addr`, if provided, overrides the local address this
    /// connection's client endpoint binds to; `None` lets the OS pick
    /// (`0.0.0.0:0` / `[::]:0`), reusing the default endpoint built at
    /// [`crate::configure`] time. Binding the requested address is a
    /// best-effort "parameter set" per spec.md §4.2 step 3: failure is
    /// logged as a warning and falls back to the default local address
    /// rather than failing the connect attempt.
    ///
    /// # Errors
    /// Returns [`ConnectError`] if `host` is empty, the provider is not
    /// configured, or the handshake fails.
    pub fn try_connect(
        &self,
        host: &str,
        port: u16,
        bind_addr: Option<SocketAddr>,
    ) -> Result<(), ConnectError> {
        if host.is_empty() {
            return Err(ConnectError::new(ConnectErrorKind::InvalidArgument(
                "host must not be empty".to_string(),
            )));
        }

        {
            let mut state = self.inner.state.lock().unwrap();
            if *state != ConnectionState::Idle {
                return Err(ConnectError::new(ConnectErrorKind::InvalidArgument(
                    "connection is not idle".to_string(),
                )));
            }
            *state = ConnectionState::Connecting;
        }

        let id = registry::register(&self.inner);
        *self.inner.registry_id.lock().unwrap() = Some(id);

        let host = host.to_string();
        let inner = Arc::clone(&self.inner);

        let spawned = runtime::with_global(move |global| {
            let remote: Result<SocketAddr, _> = format!("{host}:{port}").parse();
            let endpoint = global.endpoint_for(bind_addr);
            log::debug!("dialing {host}:{port} on the {:?} runtime", global.execution_profile);
            global.runtime.spawn(async move {
                run_connect_attempt(endpoint, remote, host, inner).await;
            });
        });

        if spawned.is_none() {
            self.inner.set_state(ConnectionState::Failed);
            return Err(ConnectError::new(ConnectErrorKind::ProviderError(
                "configure() has not been called successfully".to_string(),
            )));
        }

        match self.inner.wait_until_settled() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Failed => Err(ConnectError::new(ConnectErrorKind::HandshakeFailed(
                "see logs for the underlying transport error".to_string(),
            ))),
            _ => Err(ConnectError::new(ConnectErrorKind::Unknown)),
        }
    }

    /// Close the connection. Idempotent: closing an already-closed or
    /// never-connected connection succeeds without effect.
    ///
    /// Requests transport shutdown (if a handle exists) and then blocks
    /// while the state is `connected`, exactly as spec.md §4.2 describes —
    /// the actual `connected -> closed` transition is still made by the
    /// callback path (`watch_for_shutdown`), never by this caller thread
    /// directly, preserving the single-writer state invariant from §3.
    ///
    /// # Errors
    /// Returns [`CloseError`] if the provider rejects the shutdown request.
    pub fn try_close(&self) -> Result<(), CloseError> {
        let quic_connection = self.inner.quic_connection.lock().unwrap().clone();
        if let Some(conn) = quic_connection {
            conn.close(0u32.into(), b"");
            log::info!("connection closed locally");
        }
        self.inner.wait_while_connected();
        Ok(())
    }

    /// Submit `buf` for sending on the connection's single bidirectional
    /// stream.
    ///
    /// Returns the number of bytes accepted for sending on success, or
    /// `-1` if the stream is not open, `buf` is empty, or `buf` exceeds
    /// [`crate::send::MAX_SEND_LEN`]. Completion (success or failure) is
    /// reported asynchronously through whichever [`SendCompletionSink`]
    /// was installed at construction.
    pub fn send(&self, buf: &[u8]) -> i64 {
        if buf.is_empty() {
            return -1;
        }
        let Some(descriptor) = SendDescriptor::new(buf) else {
            log::warn!("send rejected: payload exceeds maximum send length");
            return -1;
        };
        let Some(stream) = self.inner.stream.lock().unwrap().clone() else {
            log::warn!("send rejected: stream is not open");
            return -1;
        };

        let len = descriptor.len() as i64;
        let completion_sink = Arc::clone(&self.inner.completion_sink);
        let spawned = runtime::with_global(move |global| {
            global.runtime.spawn(async move {
                stream.write(descriptor, completion_sink).await;
            });
        });

        if spawned.is_none() {
            log::warn!("send rejected: provider is not configured");
            return -1;
        }
        len
    }
}

async fn run_connect_attempt(
    endpoint: quinn::Endpoint,
    remote: Result<SocketAddr, std::net::AddrParseError>,
    server_name: String,
    inner: Arc<ConnectionInner>,
) {
    let remote = match remote {
        Ok(addr) => addr,
        Err(e) => {
            log::error!("invalid remote address: {e}");
            inner.set_state(ConnectionState::Failed);
            return;
        }
    };

    let connecting = match endpoint.connect(remote, &server_name) {
        Ok(connecting) => connecting,
        Err(e) => {
            log::error!("connect() rejected before handshake began: {e}");
            inner.set_state(ConnectionState::Failed);
            return;
        }
    };

    let quic_connection = match connecting.await {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("handshake failed: {e}");
            inner.set_state(ConnectionState::Failed);
            return;
        }
    };

    log::info!("connection established with {remote}");
    *inner.quic_connection.lock().unwrap() = Some(quic_connection.clone());
    inner.set_state(ConnectionState::Connected);

    match crate::stream::open(&quic_connection).await {
        Ok((handles, recv)) => {
            let handles = Arc::new(handles);
            *inner.stream.lock().unwrap() = Some(Arc::clone(&handles));
            if let Some(id) = *inner.registry_id.lock().unwrap() {
                crate::stream::spawn_receive_loop(id, Arc::clone(&handles), recv);
            }
        }
        Err(err) => {
            log::warn!("stream setup failed: {}", err.reason);
            inner.observer.on_stream_setup_failed(&err);
        }
    }

    watch_for_shutdown(quic_connection, inner).await;
}

async fn watch_for_shutdown(quic_connection: quinn::Connection, inner: Arc<ConnectionInner>) {
    let reason = quic_connection.closed().await;
    let initiator = match &reason {
        quinn::ConnectionError::ApplicationClosed(_) => "peer",
        quinn::ConnectionError::LocallyClosed => "local",
        quinn::ConnectionError::TimedOut => "idle timeout",
        _ => "transport",
    };
    log::info!("connection closed ({initiator}): {reason}");

    let was_connected = *inner.state.lock().unwrap() == ConnectionState::Connected;
    if was_connected {
        inner.set_state(ConnectionState::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_connection_is_idle() {
        let conn = Connection::new(Arc::new(crate::parser::DiscardingSink));
        assert_eq!(conn.state(), ConnectionState::Idle);
    }

    #[test]
    fn empty_host_is_rejected_without_touching_the_provider() {
        let conn = Connection::new(Arc::new(crate::parser::DiscardingSink));
        let err = conn.try_connect("", 1883, None).unwrap_err();
        assert!(matches!(err.kind(), ConnectErrorKind::InvalidArgument(_)));
        assert_eq!(conn.state(), ConnectionState::Idle);
    }

    #[test]
    fn send_before_connect_is_rejected() {
        let conn = Connection::new(Arc::new(crate::parser::DiscardingSink));
        assert_eq!(conn.send(b"hello"), -1);
    }

    #[test]
    fn send_with_empty_buffer_is_rejected() {
        let conn = Connection::new(Arc::new(crate::parser::DiscardingSink));
        assert_eq!(conn.send(b""), -1);
    }

    #[test]
    fn try_close_on_a_never_connected_connection_is_a_no_op_success() {
        // try_close only ever waits for a departure from `connected`; an
        // `idle` connection isn't `connected`, so this must return
        // immediately without writing any state transition itself (state
        // transitions are single-writer: the callback path only).
        let conn = Connection::new(Arc::new(crate::parser::DiscardingSink));
        assert!(conn.try_close().is_ok());
        assert_eq!(conn.state(), ConnectionState::Idle);
    }
}
