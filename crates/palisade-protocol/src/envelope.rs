//! The envelope: the unit of framed traffic between every tier.
//!
//! Everything that crosses a node boundary (client → Gate, Gate → Service,
//! Service → Game) is an [`Envelope`]. The envelope carries routing
//! metadata on the outside (`msg_id`, `session_id`, `player_id`) and an
//! opaque payload inside. Nodes route on `msg_id` alone and never look
//! into payloads that aren't addressed to them.
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │ msg_id:     1001   (i32, BE)     │  ← what kind of message
//! │ session_id: 7      (i64, BE)     │  ← which client session
//! │ player_id:  10001  (i64, BE)     │  ← which player (0 = unset)
//! │ ┌──────────────────────────────┐ │
//! │ │ payload: [...bytes...]       │ │  ← codec-encoded content
//! │ └──────────────────────────────┘ │
//! └──────────────────────────────────┘
//! ```
//!
//! There is no sequence field: ordering is provided by the underlying
//! stream (TCP per connection, shard queues per session further in).
//!
//! Two encodings carry the same four fields:
//! - **binary** ([`Envelope::encode`]/[`Envelope::decode`]): the fixed
//!   big-endian header above followed by the raw payload. Used on every
//!   TCP link and on binary WebSocket frames.
//! - **JSON** (the `Serialize`/`Deserialize` derives): used on text
//!   WebSocket frames for clients that negotiate the JSON encoding.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Size of the fixed binary header: msg_id (4) + session_id (8) + player_id (8).
pub const ENVELOPE_HEADER_LEN: usize = 20;

/// Default cap on a single envelope's encoded size (header + payload).
pub const DEFAULT_MAX_ENVELOPE_SIZE: usize = 4 * 1024 * 1024;

/// The wire unit exchanged between client, Gate, Service, and Game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message kind. Routing is decided solely from this id; see
    /// [`route_for`](crate::route_for) for the band layout.
    pub msg_id: i32,

    /// The Gate session this envelope belongs to. 0 means "unset" and is
    /// never used as an index key.
    #[serde(default)]
    pub session_id: i64,

    /// The authenticated player, once known. 0 means "unset".
    #[serde(default)]
    pub player_id: i64,

    /// Codec-encoded content, opaque to nodes that only route it.
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Convenience constructor for the common "reply on a session" shape.
    pub fn new(msg_id: i32, session_id: i64, player_id: i64, payload: Vec<u8>) -> Self {
        Self {
            msg_id,
            session_id,
            player_id,
            payload,
        }
    }

    /// Length of the binary encoding (header + payload), without any
    /// transport length prefix.
    pub fn encoded_len(&self) -> usize {
        ENVELOPE_HEADER_LEN + self.payload.len()
    }

    /// Encodes to the binary wire form: fixed big-endian header followed
    /// by the payload bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_i32(self.msg_id);
        buf.put_i64(self.session_id);
        buf.put_i64(self.player_id);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Decodes the binary wire form. Everything after the fixed header is
    /// the payload.
    pub fn decode(mut buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < ENVELOPE_HEADER_LEN {
            return Err(ProtocolError::Truncated { len: buf.len() });
        }
        let msg_id = buf.get_i32();
        let session_id = buf.get_i64();
        let player_id = buf.get_i64();
        Ok(Self {
            msg_id,
            session_id,
            player_id,
            payload: buf.to_vec(),
        })
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout_is_big_endian_header_then_payload() {
        let env = Envelope::new(0x0102_0304, 0x0506_0708_090a_0b0c, 0, vec![0xAA, 0xBB]);
        let bytes = env.encode();

        assert_eq!(bytes.len(), ENVELOPE_HEADER_LEN + 2);
        // msg_id, big-endian.
        assert_eq!(&bytes[0..4], &[0x01, 0x02, 0x03, 0x04]);
        // session_id, big-endian.
        assert_eq!(
            &bytes[4..12],
            &[0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c]
        );
        // player_id (zero).
        assert_eq!(&bytes[12..20], &[0; 8]);
        // Payload is appended untouched.
        assert_eq!(&bytes[20..], &[0xAA, 0xBB]);
    }

    #[test]
    fn test_decode_round_trips_encode() {
        let env = Envelope::new(1001, 7, 10001, b"hello".to_vec());
        let decoded = Envelope::decode(&env.encode()).expect("should decode");
        assert_eq!(decoded, env);
    }

    #[test]
    fn test_decode_empty_payload_round_trips() {
        let env = Envelope::new(10, 3, 0, Vec::new());
        let bytes = env.encode();
        assert_eq!(bytes.len(), ENVELOPE_HEADER_LEN);
        assert_eq!(Envelope::decode(&bytes).expect("should decode"), env);
    }

    #[test]
    fn test_decode_truncated_header_returns_error() {
        let result = Envelope::decode(&[0u8; ENVELOPE_HEADER_LEN - 1]);
        assert!(matches!(
            result,
            Err(ProtocolError::Truncated { len }) if len == ENVELOPE_HEADER_LEN - 1
        ));
    }

    #[test]
    fn test_negative_ids_survive_round_trip() {
        // msg_id is i32 and ids are always positive in practice, but the
        // codec must not mangle sign bits.
        let env = Envelope::new(-1, -2, -3, vec![1]);
        assert_eq!(Envelope::decode(&env.encode()).expect("decode"), env);
    }

    #[test]
    fn test_json_form_carries_identical_fields() {
        let env = Envelope::new(1001, 7, 10001, vec![1, 2, 3]);
        let json = serde_json::to_string(&env).expect("encode");
        let back: Envelope = serde_json::from_str(&json).expect("decode");
        assert_eq!(back, env);
    }

    #[test]
    fn test_json_form_defaults_missing_ids_to_zero() {
        let back: Envelope =
            serde_json::from_str(r#"{"msg_id":10,"payload":[]}"#).expect("decode");
        assert_eq!(back.session_id, 0);
        assert_eq!(back.player_id, 0);
    }
}
