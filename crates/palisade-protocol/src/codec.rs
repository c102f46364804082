//! Payload codec: how message payloads become bytes inside an envelope.
//!
//! The envelope header has a fixed binary layout, but the payload encoding
//! is a swappable strategy behind the [`Codec`] trait. Handlers and
//! modules go through the codec so a compact binary format can replace
//! [`JsonCodec`] without touching any routing or session code.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes and decodes payload structs.
///
/// `Send + Sync + 'static` because every node shares one codec instance
/// across its worker tasks.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a payload value into envelope bytes.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes envelope bytes into a payload value.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// JSON payload codec. Human-readable, and the format text-mode WebSocket
/// clients already speak.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::LoginRsp;

    #[test]
    fn test_json_codec_round_trips_payloads() {
        let codec = JsonCodec;
        let rsp = LoginRsp { player_id: 10001 };
        let bytes = codec.encode(&rsp).expect("encode");
        let back: LoginRsp = codec.decode(&bytes).expect("decode");
        assert_eq!(back, rsp);
    }

    #[test]
    fn test_json_codec_decode_garbage_returns_decode_error() {
        let codec = JsonCodec;
        let result: Result<LoginRsp, _> = codec.decode(b"not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_codec_decode_wrong_shape_returns_decode_error() {
        let codec = JsonCodec;
        let result: Result<LoginRsp, _> = codec.decode(br#"{"nickname":"x"}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
