//! WebSocket transport via `tokio-tungstenite`.
//!
//! WS message boundaries replace the length prefix. Reads accept either
//! encoding regardless of the negotiated write mode: binary messages are
//! the wire envelope, text messages are the JSON envelope. Writes use the
//! encoding chosen at upgrade time.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use palisade_protocol::{Envelope, ProtocolError};

use crate::{Conn, ConnTimeouts, TransportError};

type WsStream = WebSocketStream<TcpStream>;

/// How envelopes are written to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsEncoding {
    /// Binary messages carrying the wire envelope form.
    Binary,
    /// Text messages carrying the JSON envelope form.
    Json,
}

/// A WebSocket connection carrying envelopes.
///
/// The stream is split so reads and writes lock independently; a writer
/// task is never blocked behind a reader parked in `next()`.
pub struct WsConn {
    reader: Mutex<SplitStream<WsStream>>,
    writer: Mutex<SplitSink<WsStream, Message>>,
    encoding: WsEncoding,
    max_envelope_size: usize,
    timeouts: ConnTimeouts,
}

impl WsConn {
    pub fn new(
        ws: WsStream,
        encoding: WsEncoding,
        max_envelope_size: usize,
        timeouts: ConnTimeouts,
    ) -> Self {
        let (writer, reader) = ws.split();
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            encoding,
            max_envelope_size,
            timeouts,
        }
    }

    async fn read_message(&self) -> Result<Envelope, TransportError> {
        let mut reader = self.reader.lock().await;
        loop {
            let msg = match reader.next().await {
                Some(msg) => msg?,
                None => return Err(TransportError::Closed),
            };
            match msg {
                Message::Binary(data) => {
                    if data.len() > self.max_envelope_size {
                        return Err(TransportError::FrameTooLarge {
                            len: data.len(),
                            max: self.max_envelope_size,
                        });
                    }
                    return Ok(Envelope::decode(&data)?);
                }
                Message::Text(text) => {
                    if text.len() > self.max_envelope_size {
                        return Err(TransportError::FrameTooLarge {
                            len: text.len(),
                            max: self.max_envelope_size,
                        });
                    }
                    let env = serde_json::from_str(text.as_str())
                        .map_err(ProtocolError::Decode)?;
                    return Ok(env);
                }
                Message::Close(_) => return Err(TransportError::Closed),
                // Ping/pong are handled by tungstenite; skip.
                _ => continue,
            }
        }
    }

    async fn write_message(&self, env: &Envelope) -> Result<(), TransportError> {
        if env.encoded_len() > self.max_envelope_size {
            return Err(TransportError::FrameTooLarge {
                len: env.encoded_len(),
                max: self.max_envelope_size,
            });
        }
        let msg = match self.encoding {
            WsEncoding::Binary => Message::Binary(env.encode()),
            WsEncoding::Json => {
                let text = serde_json::to_string(env).map_err(ProtocolError::Encode)?;
                Message::Text(text.into())
            }
        };
        let mut writer = self.writer.lock().await;
        writer.send(msg).await?;
        Ok(())
    }
}

impl Conn for WsConn {
    async fn read_envelope(&self) -> Result<Envelope, TransportError> {
        match self.timeouts.read {
            Some(deadline) => tokio::time::timeout(deadline, self.read_message())
                .await
                .map_err(|_| TransportError::ReadTimeout)?,
            None => self.read_message().await,
        }
    }

    async fn write_envelope(&self, env: &Envelope) -> Result<(), TransportError> {
        match self.timeouts.write {
            Some(deadline) => tokio::time::timeout(deadline, self.write_message(env))
                .await
                .map_err(|_| TransportError::WriteTimeout)?,
            None => self.write_message(env).await,
        }
    }

    async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.send(Message::Close(None)).await;
        let _ = writer.close().await;
    }
}
