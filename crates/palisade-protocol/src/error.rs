//! Error types and client-visible error codes for the protocol layer.

/// Errors from envelope and payload encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Payload serialization failed.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Payload deserialization failed: malformed bytes, missing fields,
    /// or the wrong message shape for the id.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A binary envelope shorter than its fixed header.
    #[error("envelope truncated: {len} bytes")]
    Truncated { len: usize },

    /// Structurally valid but violates a protocol rule.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

/// Error codes visible to clients in an `ErrorRsp`.
///
/// The numeric values are part of the wire contract and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    Unknown = 1000,
    InvalidParam = 1001,
    Unauthorized = 1002,
    InvalidToken = 1003,
    SessionExpired = 1004,
    UnknownPlatform = 10005,
    LoginFailed = 1100,
    PlayerNotReady = 2000,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Client platforms accepted at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Platform {
    Test = 0,
    Android = 1,
    Ios = 2,
    Pc = 3,
}

impl TryFrom<i32> for Platform {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(Platform::Test),
            1 => Ok(Platform::Android),
            2 => Ok(Platform::Ios),
            3 => Ok(Platform::Pc),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown platform {other}"
            ))),
        }
    }
}
