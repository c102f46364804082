//! Client edge listeners: framed TCP and WebSocket.
//!
//! Each accepted conn gets one read task; writes ride the conn's own
//! writer task. A read failure of any kind detaches the conn and parks
//! its session offline; recovery is the client's resume, not ours.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use palisade_transport::{FramedTcp, WsConn, WsEncoding};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::http;
use tokio_util::sync::CancellationToken;

use crate::conn::{ConnKind, GateConn, GateTransport};
use crate::gate::Gate;
use crate::GateError;

pub struct GateServer {
    gate: Arc<Gate>,
    next_conn_id: Arc<AtomicU64>,
}

impl GateServer {
    pub fn new(gate: Arc<Gate>) -> Self {
        Self {
            gate,
            next_conn_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Binds the enabled edge listeners, starts the Gate loops, and runs
    /// until cancelled. Bind failures abort startup.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), GateError> {
        let config = self.gate.config().clone();

        let tcp_listener = if config.enable_tcp {
            let listener = TcpListener::bind(&config.listen_addr)
                .await
                .map_err(palisade_transport::TransportError::Io)?;
            tracing::info!(addr = %config.listen_addr, "gate tcp listening");
            Some(listener)
        } else {
            None
        };
        let ws_listener = if config.enable_websocket {
            let listener = TcpListener::bind(&config.websocket_listen_addr)
                .await
                .map_err(palisade_transport::TransportError::Io)?;
            tracing::info!(
                addr = %config.websocket_listen_addr,
                path = %config.websocket_path,
                "gate websocket listening"
            );
            Some(listener)
        } else {
            None
        };

        self.gate.start(cancel.clone()).await;

        if let Some(listener) = tcp_listener {
            tokio::spawn(accept_tcp(
                listener,
                Arc::clone(&self.gate),
                Arc::clone(&self.next_conn_id),
                cancel.clone(),
            ));
        }
        if let Some(listener) = ws_listener {
            tokio::spawn(accept_ws(
                listener,
                Arc::clone(&self.gate),
                Arc::clone(&self.next_conn_id),
                cancel.clone(),
            ));
        }

        cancel.cancelled().await;
        Ok(())
    }
}

async fn accept_tcp(
    listener: TcpListener,
    gate: Arc<Gate>,
    next_conn_id: Arc<AtomicU64>,
    cancel: CancellationToken,
) {
    let config = gate.config().clone();
    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => return,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %e, "tcp accept failed");
                    continue;
                }
            }
        };
        apply_keepalive(&stream, &config);

        let transport = GateTransport::Tcp(FramedTcp::new(
            stream,
            config.max_envelope_size,
            config.conn_timeouts,
        ));
        let conn = GateConn::spawn(
            next_conn_id.fetch_add(1, Ordering::Relaxed),
            ConnKind::Tcp,
            transport,
        );
        tracing::info!(conn_id = conn.id(), %peer, trace_id = %conn.trace_id(), "client connected");
        tokio::spawn(read_loop(Arc::clone(&gate), conn, cancel.clone()));
    }
}

async fn accept_ws(
    listener: TcpListener,
    gate: Arc<Gate>,
    next_conn_id: Arc<AtomicU64>,
    cancel: CancellationToken,
) {
    let config = gate.config().clone();
    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => return,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %e, "ws accept failed");
                    continue;
                }
            }
        };
        apply_keepalive(&stream, &config);

        let gate = Arc::clone(&gate);
        let next_conn_id = Arc::clone(&next_conn_id);
        let cancel = cancel.clone();
        let config = config.clone();
        // The WS handshake can stall; never block the accept loop on it.
        tokio::spawn(async move {
            let path = config.websocket_path.clone();
            let handshake = tokio_tungstenite::accept_hdr_async(
                stream,
                move |req: &http::Request<()>, rsp| {
                    if req.uri().path() == path {
                        Ok(rsp)
                    } else {
                        let reject = http::Response::builder()
                            .status(http::StatusCode::NOT_FOUND)
                            .body(Some("unknown path".to_string()))
                            .expect("static response");
                        Err(reject)
                    }
                },
            )
            .await;

            let ws = match handshake {
                Ok(ws) => ws,
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "ws handshake failed");
                    return;
                }
            };
            let encoding = if config.websocket_use_json {
                WsEncoding::Json
            } else {
                WsEncoding::Binary
            };
            let transport = GateTransport::Ws(WsConn::new(
                ws,
                encoding,
                config.max_envelope_size,
                config.conn_timeouts,
            ));
            let conn = GateConn::spawn(
                next_conn_id.fetch_add(1, Ordering::Relaxed),
                ConnKind::WebSocket,
                transport,
            );
            tracing::info!(conn_id = conn.id(), %peer, trace_id = %conn.trace_id(), "ws client connected");
            read_loop(gate, conn, cancel).await;
        });
    }
}

fn apply_keepalive(stream: &TcpStream, config: &crate::config::GateConfig) {
    if !config.conn_keepalive.is_zero() {
        if let Err(e) = FramedTcp::set_keepalive(stream, config.conn_keepalive) {
            tracing::debug!(error = %e, "keepalive setup failed");
        }
    }
}

/// Reads until the conn dies, feeding the Gate's event path.
async fn read_loop(gate: Arc<Gate>, conn: Arc<GateConn>, cancel: CancellationToken) {
    loop {
        let env = tokio::select! {
            _ = cancel.cancelled() => break,
            read = conn.read_envelope() => match read {
                Ok(env) => env,
                Err(e) => {
                    tracing::debug!(
                        conn_id = conn.id(),
                        trace_id = %conn.trace_id(),
                        error = %e,
                        "client read ended"
                    );
                    break;
                }
            }
        };
        gate.on_client_envelope(&conn, env).await;
    }
    gate.on_conn_closed(&conn).await;
}
