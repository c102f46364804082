//! Length-prefixed TCP transport.
//!
//! Wire layout per frame: 4-byte big-endian payload length, then the
//! binary envelope (see [`Envelope::encode`]). The length is checked
//! against `max_envelope_size` *before* allocating, so a hostile peer
//! cannot make the node allocate 4 GiB from a 4-byte header.

use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use palisade_protocol::Envelope;

use crate::{Conn, ConnTimeouts, TransportError};

/// A TCP connection carrying length-prefixed binary envelopes.
///
/// Reader and writer halves are independently locked: one task can block
/// in `read_envelope` while another writes. The write lock also makes
/// each frame atomic on the stream.
pub struct FramedTcp {
    reader: Mutex<BufReader<OwnedReadHalf>>,
    writer: Mutex<BufWriter<OwnedWriteHalf>>,
    max_envelope_size: usize,
    timeouts: ConnTimeouts,
}

impl FramedTcp {
    pub fn new(stream: TcpStream, max_envelope_size: usize, timeouts: ConnTimeouts) -> Self {
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: Mutex::new(BufReader::new(read_half)),
            writer: Mutex::new(BufWriter::new(write_half)),
            max_envelope_size,
            timeouts,
        }
    }

    /// Enables OS-level TCP keepalive probes on an accepted stream.
    /// Catches dead peers that never FIN, below the protocol heartbeat.
    pub fn set_keepalive(stream: &TcpStream, interval: Duration) -> std::io::Result<()> {
        let keepalive = TcpKeepalive::new()
            .with_time(interval)
            .with_interval(interval);
        SockRef::from(stream).set_tcp_keepalive(&keepalive)
    }

    async fn read_frame(&self) -> Result<Envelope, TransportError> {
        let mut reader = self.reader.lock().await;

        let mut len_buf = [0u8; 4];
        read_exact_eof(&mut *reader, &mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > self.max_envelope_size {
            return Err(TransportError::FrameTooLarge {
                len,
                max: self.max_envelope_size,
            });
        }

        let mut data = vec![0u8; len];
        read_exact_eof(&mut *reader, &mut data).await?;
        Ok(Envelope::decode(&data)?)
    }

    async fn write_frame(&self, env: &Envelope) -> Result<(), TransportError> {
        let len = env.encoded_len();
        if len > self.max_envelope_size {
            return Err(TransportError::FrameTooLarge {
                len,
                max: self.max_envelope_size,
            });
        }

        let mut writer = self.writer.lock().await;
        writer.write_all(&(len as u32).to_be_bytes()).await?;
        writer.write_all(&env.encode()).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl Conn for FramedTcp {
    async fn read_envelope(&self) -> Result<Envelope, TransportError> {
        match self.timeouts.read {
            Some(deadline) => tokio::time::timeout(deadline, self.read_frame())
                .await
                .map_err(|_| TransportError::ReadTimeout)?,
            None => self.read_frame().await,
        }
    }

    async fn write_envelope(&self, env: &Envelope) -> Result<(), TransportError> {
        match self.timeouts.write {
            Some(deadline) => tokio::time::timeout(deadline, self.write_frame(env))
                .await
                .map_err(|_| TransportError::WriteTimeout)?,
            None => self.write_frame(env).await,
        }
    }

    async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// `read_exact` that maps a clean EOF to [`TransportError::Closed`].
async fn read_exact_eof<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<(), TransportError> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(TransportError::Closed),
        Err(e) => Err(TransportError::Io(e)),
    }
}
