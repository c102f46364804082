//! A client connection at the Gate.
//!
//! The conn owns the transport and a bounded outbound queue drained by
//! one writer task. Sends are non-blocking offers: a full queue returns
//! `ConnBusy`, and five consecutive busy strikes close the conn: a
//! client that can't drain its socket is shed, not buffered forever.
//!
//! A conn knows its session only by id (set once at binding); the session
//! side holds the strong reference, and survives this conn's death.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use palisade_protocol::Envelope;
use palisade_transport::{Conn as Transport, FramedTcp, TransportError, WsConn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::GateError;

/// Outbound queue depth per client conn.
pub const SEND_QUEUE_CAPACITY: usize = 8192;

/// Consecutive `ConnBusy` strikes that force a close.
pub const BUSY_STRIKE_LIMIT: u32 = 5;

/// Which edge transport the conn arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnKind {
    Tcp,
    WebSocket,
}

/// Static dispatch over the two edge transports.
pub enum GateTransport {
    Tcp(FramedTcp),
    Ws(WsConn),
}

impl GateTransport {
    async fn read_envelope(&self) -> Result<Envelope, TransportError> {
        match self {
            GateTransport::Tcp(conn) => conn.read_envelope().await,
            GateTransport::Ws(conn) => conn.read_envelope().await,
        }
    }

    async fn write_envelope(&self, env: &Envelope) -> Result<(), TransportError> {
        match self {
            GateTransport::Tcp(conn) => conn.write_envelope(env).await,
            GateTransport::Ws(conn) => conn.write_envelope(env).await,
        }
    }

    async fn close(&self) {
        match self {
            GateTransport::Tcp(conn) => conn.close().await,
            GateTransport::Ws(conn) => conn.close().await,
        }
    }
}

pub struct GateConn {
    id: u64,
    trace_id: String,
    kind: ConnKind,
    transport: GateTransport,
    session_id: AtomicI64,
    connected_at: Instant,
    last_alive: Mutex<Instant>,
    send_tx: mpsc::Sender<Envelope>,
    busy_strikes: AtomicU32,
    closed: AtomicBool,
    closed_token: CancellationToken,
}

impl std::fmt::Debug for GateConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateConn")
            .field("id", &self.id)
            .field("trace_id", &self.trace_id)
            .field("kind", &self.kind)
            .field("session_id", &self.session_id.load(Ordering::Relaxed))
            .finish()
    }
}

impl GateConn {
    /// Wraps a transport and starts the writer task.
    pub fn spawn(id: u64, kind: ConnKind, transport: GateTransport) -> Arc<Self> {
        let (send_tx, send_rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        let now = Instant::now();
        let conn = Arc::new(Self {
            id,
            trace_id: new_trace_id(),
            kind,
            transport,
            session_id: AtomicI64::new(0),
            connected_at: now,
            last_alive: Mutex::new(now),
            send_tx,
            busy_strikes: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            closed_token: CancellationToken::new(),
        });
        tokio::spawn(Arc::clone(&conn).write_loop(send_rx));
        conn
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn kind(&self) -> ConnKind {
        self.kind
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// The session this conn is bound to; 0 before binding.
    pub fn session_id(&self) -> i64 {
        self.session_id.load(Ordering::Acquire)
    }

    pub fn bind_session(&self, session_id: i64) {
        self.session_id.store(session_id, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Refreshes the liveness clock (heartbeats and traffic).
    pub fn mark_alive(&self) {
        *self.last_alive.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    pub fn last_alive(&self) -> Instant {
        *self.last_alive.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Non-blocking send. Resets the busy-strike counter on success;
    /// on a full queue, counts a strike and closes the conn at the limit.
    pub fn send(&self, env: Envelope) -> Result<(), GateError> {
        if self.is_closed() {
            return Err(GateError::ConnClosed);
        }
        match self.send_tx.try_send(env) {
            Ok(()) => {
                self.busy_strikes.store(0, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                let strikes = self.busy_strikes.fetch_add(1, Ordering::Relaxed) + 1;
                if strikes >= BUSY_STRIKE_LIMIT {
                    tracing::warn!(
                        conn_id = self.id,
                        trace_id = %self.trace_id,
                        session = self.session_id(),
                        reason = "conn_busy",
                        strikes,
                        "send queue full, closing conn"
                    );
                    self.close();
                }
                Err(GateError::ConnBusy)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(GateError::ConnClosed),
        }
    }

    /// Writes directly on the transport, bypassing the queue. For
    /// responses that must reach the wire before an imminent close; the
    /// transport's write lock keeps the frame atomic either way.
    pub async fn send_now(&self, env: &Envelope) -> Result<(), GateError> {
        if self.is_closed() {
            return Err(GateError::ConnClosed);
        }
        self.transport
            .write_envelope(env)
            .await
            .map_err(GateError::from)
    }

    /// Idempotent close. The writer task flushes out and shuts the
    /// transport; the read loop observes the failure and detaches the
    /// session.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.closed_token.cancel();
        }
    }

    /// Reads the next client envelope. Fails once the conn is closed.
    pub async fn read_envelope(&self) -> Result<Envelope, TransportError> {
        tokio::select! {
            _ = self.closed_token.cancelled() => Err(TransportError::Closed),
            read = self.transport.read_envelope() => read,
        }
    }

    async fn write_loop(self: Arc<Self>, mut send_rx: mpsc::Receiver<Envelope>) {
        loop {
            let env = tokio::select! {
                _ = self.closed_token.cancelled() => break,
                env = send_rx.recv() => match env {
                    Some(env) => env,
                    None => break,
                }
            };
            if let Err(e) = self.transport.write_envelope(&env).await {
                tracing::debug!(
                    conn_id = self.id,
                    trace_id = %self.trace_id,
                    error = %e,
                    "conn write failed"
                );
                break;
            }
        }
        self.close();
        self.transport.close().await;
    }
}

/// Short random id correlating one conn's log lines.
fn new_trace_id() -> String {
    use rand::Rng;
    let bytes: [u8; 8] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
