//! The per-envelope context handed to module handlers.

use std::sync::Arc;

use palisade_protocol::messages::ErrorRsp;
use palisade_protocol::{Codec, Envelope, ErrorCode, JsonCodec, msgid};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::game_router::GameRouter;
use crate::ServiceError;

/// Everything a handler can do with one incoming envelope: inspect it,
/// reply to the originating session, raise a client-visible error, bind
/// the player id, or forward work to the Game node.
pub struct ServiceContext {
    pub session_id: i64,
    pub player_id: i64,
    pub msg_id: i32,
    pub payload: Vec<u8>,
    pub trace_id: String,
    cancel: CancellationToken,
    codec: JsonCodec,
    /// Outbound queue of the gate link this envelope arrived on.
    reply_tx: mpsc::Sender<Envelope>,
    game: Arc<GameRouter>,
}

impl ServiceContext {
    pub fn new(
        env: &Envelope,
        reply_tx: mpsc::Sender<Envelope>,
        game: Arc<GameRouter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session_id: env.session_id,
            player_id: env.player_id,
            msg_id: env.msg_id,
            payload: env.payload.clone(),
            trace_id: String::new(),
            cancel,
            codec: JsonCodec,
            reply_tx,
            game,
        }
    }

    /// Decodes this envelope's payload.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, ServiceError> {
        Ok(self.codec.decode(&self.payload)?)
    }

    /// Sends a message back to the originating session, via its gate.
    pub async fn reply<T: serde::Serialize>(
        &self,
        msg_id: i32,
        body: &T,
    ) -> Result<(), ServiceError> {
        let payload = self.codec.encode(body)?;
        self.reply_raw(msg_id, payload).await
    }

    /// `reply` for pre-encoded payloads.
    pub async fn reply_raw(&self, msg_id: i32, payload: Vec<u8>) -> Result<(), ServiceError> {
        let env = Envelope::new(msg_id, self.session_id, self.player_id, payload);
        self.reply_tx
            .send(env)
            .await
            .map_err(|_| ServiceError::NoGateConnection(self.session_id))
    }

    /// Alias of [`reply`](Self::reply); pushes are replies the client
    /// didn't ask for.
    pub async fn push<T: serde::Serialize>(
        &self,
        msg_id: i32,
        body: &T,
    ) -> Result<(), ServiceError> {
        self.reply(msg_id, body).await
    }

    /// Sends an `ErrorRsp` back to the client.
    pub async fn reply_error(&self, code: ErrorCode, message: &str) -> Result<(), ServiceError> {
        self.reply(
            msgid::ERROR_RSP,
            &ErrorRsp {
                code: code.code(),
                message: message.to_string(),
            },
        )
        .await
    }

    /// Binds the player id: every later reply and game forward from this
    /// context carries it, so downstream routing knows the owner.
    pub fn set_player_id(&mut self, player_id: i64) {
        self.player_id = player_id;
    }

    /// Forwards work to the Game node on this session's behalf.
    pub fn send_to_game<T: serde::Serialize>(
        &self,
        msg_id: i32,
        body: &T,
    ) -> Result<(), ServiceError> {
        let payload = self.codec.encode(body)?;
        self.game.send(Envelope::new(
            msg_id,
            self.session_id,
            self.player_id,
            payload,
        ))
    }

    /// The node's shutdown token; long handlers should observe it.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
