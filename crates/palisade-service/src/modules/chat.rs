//! Chat: validate, ack, and hand the message to the broadcaster.
//!
//! Fan-out to other sessions is the external broadcaster's concern; the
//! module acks the sender and emits the canonical push shape back on the
//! sender's own session.

use async_trait::async_trait;
use palisade_protocol::messages::{ChatMessagePush, ChatSendReq, ChatSendRsp};
use palisade_protocol::{ErrorCode, msgid};

use crate::context::ServiceContext;
use crate::module::ServiceModule;
use crate::ServiceError;

const DEFAULT_CHANNEL: &str = "world";

pub struct ChatModule;

#[async_trait]
impl ServiceModule for ChatModule {
    fn name(&self) -> &'static str {
        "chat"
    }

    fn msg_ids(&self) -> Vec<i32> {
        vec![msgid::CHAT_SEND_REQ]
    }

    async fn handle(&self, ctx: &mut ServiceContext) -> Result<(), ServiceError> {
        let req: ChatSendReq = match ctx.decode() {
            Ok(req) => req,
            Err(_) => {
                return ctx
                    .reply_error(ErrorCode::InvalidParam, "malformed chat message")
                    .await;
            }
        };

        if ctx.player_id == 0 {
            return ctx
                .reply_error(ErrorCode::Unauthorized, "not logged in")
                .await;
        }
        if req.text.trim().is_empty() {
            return ctx
                .reply_error(ErrorCode::InvalidParam, "empty message")
                .await;
        }

        let channel = if req.channel.is_empty() {
            DEFAULT_CHANNEL.to_string()
        } else {
            req.channel
        };

        ctx.reply(msgid::CHAT_SEND_RSP, &ChatSendRsp { ok: true })
            .await?;
        ctx.push(
            msgid::CHAT_MESSAGE_PUSH,
            &ChatMessagePush {
                channel,
                from_player: ctx.player_id,
                text: req.text,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use palisade_protocol::messages::ErrorRsp;
    use palisade_protocol::{Codec, Envelope, JsonCodec};
    use palisade_transport::ConnTimeouts;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::game_router::GameRouter;

    fn chat_env(player_id: i64, channel: &str, text: &str) -> Envelope {
        let payload = JsonCodec
            .encode(&ChatSendReq {
                channel: channel.to_string(),
                text: text.to_string(),
            })
            .expect("encode");
        Envelope::new(msgid::CHAT_SEND_REQ, 7, player_id, payload)
    }

    fn ctx_for(env: &Envelope) -> (ServiceContext, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(8);
        let game = GameRouter::new("127.0.0.1:1", 4096, ConnTimeouts::default());
        (
            ServiceContext::new(env, tx, game, CancellationToken::new()),
            rx,
        )
    }

    #[tokio::test]
    async fn test_chat_acks_then_pushes_to_sender() {
        let env = chat_env(500, "global", "hello");
        let (mut ctx, mut rx) = ctx_for(&env);

        ChatModule.handle(&mut ctx).await.expect("handle");

        let ack = rx.try_recv().expect("ack");
        assert_eq!(ack.msg_id, msgid::CHAT_SEND_RSP);
        let ack: ChatSendRsp = JsonCodec.decode(&ack.payload).expect("decode");
        assert!(ack.ok);

        let push = rx.try_recv().expect("push");
        assert_eq!(push.msg_id, msgid::CHAT_MESSAGE_PUSH);
        let push: ChatMessagePush = JsonCodec.decode(&push.payload).expect("decode");
        assert_eq!(push.channel, "global");
        assert_eq!(push.from_player, 500);
        assert_eq!(push.text, "hello");
    }

    #[tokio::test]
    async fn test_chat_empty_channel_falls_back_to_world() {
        let env = chat_env(500, "", "hi");
        let (mut ctx, mut rx) = ctx_for(&env);

        ChatModule.handle(&mut ctx).await.expect("handle");

        let _ack = rx.try_recv().expect("ack");
        let push = rx.try_recv().expect("push");
        let push: ChatMessagePush = JsonCodec.decode(&push.payload).expect("decode");
        assert_eq!(push.channel, "world");
    }

    #[tokio::test]
    async fn test_chat_without_player_is_unauthorized() {
        let env = chat_env(0, "global", "hello");
        let (mut ctx, mut rx) = ctx_for(&env);

        ChatModule.handle(&mut ctx).await.expect("handle");

        let reply = rx.try_recv().expect("error reply");
        assert_eq!(reply.msg_id, msgid::ERROR_RSP);
        let rsp: ErrorRsp = JsonCodec.decode(&reply.payload).expect("decode");
        assert_eq!(rsp.code, ErrorCode::Unauthorized.code());
    }

    #[tokio::test]
    async fn test_chat_blank_text_is_invalid_param() {
        let env = chat_env(500, "global", "   ");
        let (mut ctx, mut rx) = ctx_for(&env);

        ChatModule.handle(&mut ctx).await.expect("handle");

        let reply = rx.try_recv().expect("error reply");
        let rsp: ErrorRsp = JsonCodec.decode(&reply.payload).expect("decode");
        assert_eq!(rsp.code, ErrorCode::InvalidParam.code());
    }
}
