//! The Gate ↔ Service connection pool.
//!
//! `service_pool_size` persistent TCP links, each with three cooperating
//! loops: a reader feeding service envelopes back to the Gate, a writer
//! draining a bounded queue, and a reconnector with 1s → 5s exponential
//! backoff. A periodic `ServicePing` keeps NAT state warm; pongs are
//! absorbed at the reader.
//!
//! Sends shard by `|session_id| % n`, sticky per session, so the Service
//! sees one session's envelopes in order. Envelopes without a session
//! (broadcasts, notifications) rotate round-robin instead of piling onto
//! shard 0.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use palisade_protocol::{Envelope, msgid};
use palisade_transport::{Conn, ConnTimeouts, FramedTcp, TransportError};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::GateError;

/// Outbound queue depth per pool member.
const SEND_QUEUE_CAPACITY: usize = 8192;

const BACKOFF_START: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(5);

struct RemoteClient {
    name: String,
    addr: String,
    max_envelope_size: usize,
    timeouts: ConnTimeouts,
    send_tx: mpsc::Sender<Envelope>,
    send_rx: Mutex<Option<mpsc::Receiver<Envelope>>>,
    conn: RwLock<Option<Arc<FramedTcp>>>,
    connected: AtomicBool,
    /// Envelopes discarded because the link was down at write time.
    dropped_disconnected: AtomicU64,
}

impl RemoteClient {
    fn new(name: String, addr: &str, max_envelope_size: usize, timeouts: ConnTimeouts) -> Arc<Self> {
        let (send_tx, send_rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        Arc::new(Self {
            name,
            addr: addr.to_string(),
            max_envelope_size,
            timeouts,
            send_tx,
            send_rx: Mutex::new(Some(send_rx)),
            conn: RwLock::new(None),
            connected: AtomicBool::new(false),
            dropped_disconnected: AtomicU64::new(0),
        })
    }

    /// Non-blocking offer into this member's queue.
    fn send(&self, env: Envelope) -> Result<(), GateError> {
        self.send_tx
            .try_send(env)
            .map_err(|_| GateError::RemoteBusy)
    }

    async fn start(
        self: &Arc<Self>,
        inbound_tx: mpsc::Sender<Envelope>,
        ping_interval: Duration,
        cancel: CancellationToken,
    ) {
        let send_rx = self
            .send_rx
            .lock()
            .await
            .take()
            .expect("remote client started twice");
        tokio::spawn(Arc::clone(self).write_loop(send_rx, cancel.clone()));
        tokio::spawn(Arc::clone(self).connect_loop(inbound_tx, cancel.clone()));
        if !ping_interval.is_zero() {
            tokio::spawn(Arc::clone(self).ping_loop(ping_interval, cancel));
        }
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
                // Fresh data beats stale backlog: drop and count.
                self.dropped_disconnected.fetch_add(1, Ordering::Relaxed);
                continue;
            };
            if let Err(e) = conn.write_envelope(&env).await {
                tracing::warn!(
                    remote = %self.name,
                    msg_id = env.msg_id,
                    error = %e,
                    "service write failed"
                );
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
                        tracing::warn!(remote = %self.name, addr = %self.addr, error = %e, "service dial failed");
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
            tracing::info!(remote = %self.name, addr = %self.addr, "service link up");

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
                                tracing::warn!(remote = %self.name, error = %e, "service link read failed");
                            }
                            break;
                        }
                    }
                };
                // Keep-alive replies stop here.
                if env.msg_id == msgid::SERVICE_PONG {
                    continue;
                }
                if inbound_tx.send(env).await.is_err() {
                    return;
                }
            }

            self.connected.store(false, Ordering::Release);
            *self.conn.write().await = None;
            conn.close().await;
            tracing::warn!(remote = %self.name, "service link down, reconnecting");
        }
    }

    async fn ping_loop(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if self.connected.load(Ordering::Acquire) {
                        let ping = Envelope::new(msgid::SERVICE_PING, 0, 0, Vec::new());
                        let _ = self.send(ping);
                    }
                }
            }
        }
    }
}

/// The sticky-sharded pool of Service links.
pub struct RemoteClientPool {
    clients: Vec<Arc<RemoteClient>>,
    round_robin: AtomicUsize,
    retry_max: u32,
    retry_backoff: Duration,
}

impl RemoteClientPool {
    pub fn new(
        addr: &str,
        size: usize,
        max_envelope_size: usize,
        timeouts: ConnTimeouts,
        retry_max: u32,
        retry_backoff: Duration,
    ) -> Self {
        let size = size.max(1);
        let clients = (0..size)
            .map(|i| RemoteClient::new(format!("service-{i}"), addr, max_envelope_size, timeouts))
            .collect();
        Self {
            clients,
            round_robin: AtomicUsize::new(0),
            retry_max: retry_max.max(1),
            retry_backoff,
        }
    }

    /// Starts every member's loops. Returns the merged stream of
    /// envelopes arriving from the Service.
    pub async fn start(
        &self,
        ping_interval: Duration,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<Envelope> {
        let (inbound_tx, inbound_rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        for client in &self.clients {
            client
                .start(inbound_tx.clone(), ping_interval, cancel.clone())
                .await;
        }
        inbound_rx
    }

    /// Queues an envelope on the session's shard, retrying a full queue
    /// `retry_max` times with `retry_backoff` spacing.
    pub async fn send(&self, session_id: i64, env: Envelope) -> Result<(), GateError> {
        let index = if session_id == 0 {
            self.round_robin.fetch_add(1, Ordering::Relaxed) % self.clients.len()
        } else {
            (session_id.unsigned_abs() as usize) % self.clients.len()
        };
        let client = &self.clients[index];

        let mut attempt = 1;
        loop {
            match client.send(env.clone()) {
                Ok(()) => return Ok(()),
                Err(_) if attempt < self.retry_max => {
                    attempt += 1;
                    tokio::time::sleep(self.retry_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Envelopes dropped across the pool because a link was down.
    pub fn dropped_disconnected(&self) -> u64 {
        self.clients
            .iter()
            .map(|c| c.dropped_disconnected.load(Ordering::Relaxed))
            .sum()
    }
}
