//! Payload structs for the messages this wire carries.
//!
//! Each struct corresponds to one message id in [`crate::msgid`]. Payloads
//! are encoded by the configured [`Codec`](crate::Codec); nothing here
//! assumes a particular serialization beyond serde.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Gate control
// ---------------------------------------------------------------------------

/// Gate → client, first message on a fresh session. Carries everything the
/// client needs to resume later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInit {
    pub session_id: i64,
    pub token: String,
}

/// Client → Gate on a new connection: reattach to an existing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeReq {
    pub session_id: i64,
    pub token: String,
}

/// Gate → client: outcome of a resume attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeRsp {
    pub ok: bool,
    #[serde(default)]
    pub reason: String,
}

/// Server → client error report; `code` is an [`ErrorCode`](crate::ErrorCode)
/// value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRsp {
    pub code: i32,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginReq {
    pub account: String,
    #[serde(default)]
    pub platform: i32,
    /// Platform login token; verification is the auth provider's contract.
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRsp {
    pub player_id: i64,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSendReq {
    #[serde(default)]
    pub channel: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSendRsp {
    pub ok: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessagePush {
    pub channel: String,
    pub from_player: i64,
    pub text: String,
}

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

/// Snapshot of a player's visible state, embedded in game responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerData {
    pub role_id: i64,
    pub nickname: String,
    pub level: i32,
    pub exp: i64,
    pub gold: i64,
    pub stamina: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEnterGameRsp {
    pub data: PlayerData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadPlayerDataRsp {
    pub data: PlayerData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_rsp_reason_defaults_to_empty() {
        let rsp: ResumeRsp = serde_json::from_str(r#"{"ok":true}"#).expect("decode");
        assert!(rsp.ok);
        assert!(rsp.reason.is_empty());
    }

    #[test]
    fn test_login_req_platform_and_token_default() {
        let req: LoginReq = serde_json::from_str(r#"{"account":"a"}"#).expect("decode");
        assert_eq!(req.account, "a");
        assert_eq!(req.platform, 0);
        assert!(req.token.is_empty());
    }

    #[test]
    fn test_session_init_round_trip() {
        let init = SessionInit {
            session_id: 7,
            token: "abc.def".into(),
        };
        let bytes = serde_json::to_vec(&init).expect("encode");
        let back: SessionInit = serde_json::from_slice(&bytes).expect("decode");
        assert_eq!(back, init);
    }

    #[test]
    fn test_player_data_round_trip() {
        let data = PlayerData {
            role_id: 10001,
            nickname: "hero".into(),
            level: 3,
            exp: 120,
            gold: 50,
            stamina: 99,
        };
        let bytes = serde_json::to_vec(&data).expect("encode");
        let back: PlayerData = serde_json::from_slice(&bytes).expect("decode");
        assert_eq!(back, data);
    }
}
