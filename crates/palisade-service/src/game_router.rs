//! The Service → Game link.
//!
//! One persistent TCP connection to the Game node, owned by a writer loop
//! and a reconnect loop with 1s → 5s exponential backoff. Senders never
//! block: a full queue is [`ServiceError::GameRouterBusy`], a down link is
//! [`ServiceError::GameRouterNotReady`]; the calling handler decides
//! whether that becomes a user-visible error.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use palisade_protocol::Envelope;
use palisade_transport::{Conn, ConnTimeouts, FramedTcp, TransportError};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::ServiceError;

/// Outbound queue depth toward the Game node.
const SEND_QUEUE_CAPACITY: usize = 2048;

const BACKOFF_START: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(5);

pub struct GameRouter {
    addr: String,
    max_envelope_size: usize,
    timeouts: ConnTimeouts,
    send_tx: mpsc::Sender<Envelope>,
    send_rx: tokio::sync::Mutex<Option<mpsc::Receiver<Envelope>>>,
    conn: RwLock<Option<Arc<FramedTcp>>>,
    connected: AtomicBool,
}

impl GameRouter {
    pub fn new(addr: &str, max_envelope_size: usize, timeouts: ConnTimeouts) -> Arc<Self> {
        let (send_tx, send_rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        Arc::new(Self {
            addr: addr.to_string(),
            max_envelope_size,
            timeouts,
            send_tx,
            send_rx: tokio::sync::Mutex::new(Some(send_rx)),
            conn: RwLock::new(None),
            connected: AtomicBool::new(false),
        })
    }

    /// Queues an envelope for the Game node.
    pub fn send(&self, env: Envelope) -> Result<(), ServiceError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(ServiceError::GameRouterNotReady);
        }
        self.send_tx
            .try_send(env)
            .map_err(|_| ServiceError::GameRouterBusy)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Starts the writer and reconnect loops. Returns the stream of
    /// envelopes arriving *from* the Game node (replies and pushes); the
    /// caller forwards those to the right gate.
    pub async fn start(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<Envelope> {
        let (inbound_tx, inbound_rx) = mpsc::channel(SEND_QUEUE_CAPACITY);

        let send_rx = self
            .send_rx
            .lock()
            .await
            .take()
            .expect("game router started twice");

        tokio::spawn(Arc::clone(self).write_loop(send_rx, cancel.clone()));
        tokio::spawn(Arc::clone(self).connect_loop(inbound_tx, cancel));

        inbound_rx
    }

    async fn write_loop(
        self: Arc<Self>,
        mut send_rx: mpsc::Receiver<Envelope>,
        cancel: CancellationToken,
    ) {
        loop {
            let env = tokio::select! {
                _ = cancel.cancelled() => return,
                env = send_rx.recv() => match env {
                    Some(env) => env,
                    None => return,
                }
            };

            let conn = self.conn.read().await.clone();
            let Some(conn) = conn else {
                // Link down between admission and write: prefer fresh data
                // over stale backlog.
                tracing::debug!(msg_id = env.msg_id, "dropping envelope, game link down");
                continue;
            };
            if let Err(e) = conn.write_envelope(&env).await {
                tracing::warn!(msg_id = env.msg_id, error = %e, "game write failed");
            }
        }
    }

    async fn connect_loop(
        self: Arc<Self>,
        inbound_tx: mpsc::Sender<Envelope>,
        cancel: CancellationToken,
    ) {
        let mut backoff = BACKOFF_START;
        loop {
            if cancel.is_cancelled() {
                return;
            }

            let stream = tokio::select! {
                _ = cancel.cancelled() => return,
                dialed = TcpStream::connect(&self.addr) => match dialed {
                    Ok(stream) => stream,
                    Err(e) => {
                        tracing::warn!(addr = %self.addr, error = %e, "game dial failed");
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            _ = tokio::time::sleep(backoff) => {}
                        }
                        backoff = (backoff * 2).min(BACKOFF_CAP);
                        continue;
                    }
                }
            };

            let conn = Arc::new(FramedTcp::new(
                stream,
                self.max_envelope_size,
                self.timeouts,
            ));
            *self.conn.write().await = Some(Arc::clone(&conn));
            self.connected.store(true, Ordering::Release);
            backoff = BACKOFF_START;
            tracing::info!(addr = %self.addr, "game link up");

            // Read until the link dies, feeding game-originated envelopes
            // to the forwarder.
            loop {
                let env = tokio::select! {
                    _ = cancel.cancelled() => {
                        conn.close().await;
                        return;
                    }
                    read = conn.read_envelope() => match read {
                        Ok(env) => env,
                        Err(e) => {
                            if !matches!(e, TransportError::Closed) {
                                tracing::warn!(error = %e, "game link read failed");
                            }
                            break;
                        }
                    }
                };
                if inbound_tx.send(env).await.is_err() {
                    return;
                }
            }

            self.connected.store(false, Ordering::Release);
            *self.conn.write().await = None;
            conn.close().await;
            tracing::warn!(addr = %self.addr, "game link down, reconnecting");
        }
    }
}
