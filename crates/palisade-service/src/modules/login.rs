//! Login: resolve an account to its role, allocating on first contact.
//!
//! Token verification is the platform auth provider's contract; this
//! module only enforces the shape of it (non-test platforms must present
//! a token). Everything else is the account → role mapping against the
//! player store.

use std::sync::Arc;

use async_trait::async_trait;
use palisade_protocol::messages::{LoginReq, LoginRsp};
use palisade_protocol::{ErrorCode, Platform, msgid};
use palisade_store::{PlayerProfile, PlayerStore};

use crate::context::ServiceContext;
use crate::module::ServiceModule;
use crate::ServiceError;

pub struct LoginModule {
    store: Arc<dyn PlayerStore>,
}

impl LoginModule {
    pub fn new(store: Arc<dyn PlayerStore>) -> Self {
        Self { store }
    }

    /// Returns the account's role id, creating role and profile on first
    /// login.
    async fn resolve_role(&self, account: &str) -> Result<i64, ServiceError> {
        if let Some(role_id) = self.store.load_role_id(account).await? {
            return Ok(role_id);
        }

        let role_id = self.store.next_uid().await?;
        self.store.save_role_id(account, role_id).await?;
        self.store
            .save_profile(&PlayerProfile::new(role_id, account))
            .await?;
        tracing::info!(account, role = role_id, "role created");
        Ok(role_id)
    }
}

#[async_trait]
impl ServiceModule for LoginModule {
    fn name(&self) -> &'static str {
        "login"
    }

    fn msg_ids(&self) -> Vec<i32> {
        vec![msgid::LOGIN_REQ]
    }

    async fn handle(&self, ctx: &mut ServiceContext) -> Result<(), ServiceError> {
        let req: LoginReq = match ctx.decode() {
            Ok(req) => req,
            Err(_) => {
                return ctx
                    .reply_error(ErrorCode::InvalidParam, "malformed login request")
                    .await;
            }
        };

        let platform = match Platform::try_from(req.platform) {
            Ok(platform) => platform,
            Err(_) => {
                tracing::warn!(
                    session = ctx.session_id,
                    platform = req.platform,
                    reason = "unknown_platform",
                    "login rejected"
                );
                return ctx
                    .reply_error(ErrorCode::UnknownPlatform, "unknown platform")
                    .await;
            }
        };

        if req.account.is_empty() {
            return ctx
                .reply_error(ErrorCode::InvalidParam, "empty account")
                .await;
        }
        if platform != Platform::Test && req.token.is_empty() {
            return ctx
                .reply_error(ErrorCode::Unauthorized, "missing platform token")
                .await;
        }

        let role_id = match self.resolve_role(&req.account).await {
            Ok(role_id) => role_id,
            Err(e) => {
                tracing::warn!(
                    session = ctx.session_id,
                    account = %req.account,
                    error = %e,
                    "login store failure"
                );
                return ctx.reply_error(ErrorCode::LoginFailed, "login failed").await;
            }
        };

        ctx.set_player_id(role_id);
        tracing::info!(
            session = ctx.session_id,
            account = %req.account,
            player = role_id,
            "login ok"
        );
        ctx.reply(msgid::LOGIN_RSP, &LoginRsp { player_id: role_id })
            .await
    }
}

#[cfg(test)]
mod tests {
    use palisade_protocol::messages::ErrorRsp;
    use palisade_protocol::{Codec, Envelope, JsonCodec};
    use palisade_store::MemoryStore;
    use palisade_transport::ConnTimeouts;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::game_router::GameRouter;

    fn login_env(account: &str, platform: i32, token: &str) -> Envelope {
        let payload = JsonCodec
            .encode(&LoginReq {
                account: account.to_string(),
                platform,
                token: token.to_string(),
            })
            .expect("encode");
        Envelope::new(msgid::LOGIN_REQ, 7, 0, payload)
    }

    fn ctx_for(env: &Envelope) -> (ServiceContext, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(8);
        let game = GameRouter::new("127.0.0.1:1", 4096, ConnTimeouts::default());
        (
            ServiceContext::new(env, tx, game, CancellationToken::new()),
            rx,
        )
    }

    async fn run_login(
        module: &LoginModule,
        env: Envelope,
    ) -> (ServiceContext, Envelope) {
        let (mut ctx, mut rx) = ctx_for(&env);
        module.handle(&mut ctx).await.expect("handle");
        let reply = rx.try_recv().expect("one reply");
        (ctx, reply)
    }

    #[tokio::test]
    async fn test_first_login_allocates_role_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let module = LoginModule::new(Arc::clone(&store) as Arc<dyn PlayerStore>);

        let (ctx, reply) = run_login(&module, login_env("acct-a", 0, "")).await;

        assert_eq!(reply.msg_id, msgid::LOGIN_RSP);
        let rsp: LoginRsp = JsonCodec.decode(&reply.payload).expect("decode");
        assert!(rsp.player_id > 0);
        // The context now owns the player for downstream routing.
        assert_eq!(ctx.player_id, rsp.player_id);
        // Mapping and profile both persisted.
        assert_eq!(
            store.load_role_id("acct-a").await.expect("load"),
            Some(rsp.player_id)
        );
        assert!(
            store
                .load_profile(rsp.player_id)
                .await
                .expect("load")
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_second_login_returns_same_role() {
        let store = Arc::new(MemoryStore::new());
        let module = LoginModule::new(Arc::clone(&store) as Arc<dyn PlayerStore>);

        let (_, first) = run_login(&module, login_env("acct-a", 0, "")).await;
        let (_, second) = run_login(&module, login_env("acct-a", 0, "")).await;

        let first: LoginRsp = JsonCodec.decode(&first.payload).expect("decode");
        let second: LoginRsp = JsonCodec.decode(&second.payload).expect("decode");
        assert_eq!(first.player_id, second.player_id);
    }

    #[tokio::test]
    async fn test_unknown_platform_replies_error() {
        let store = Arc::new(MemoryStore::new());
        let module = LoginModule::new(store as Arc<dyn PlayerStore>);

        let (ctx, reply) = run_login(&module, login_env("acct-a", 42, "")).await;

        assert_eq!(reply.msg_id, msgid::ERROR_RSP);
        let rsp: ErrorRsp = JsonCodec.decode(&reply.payload).expect("decode");
        assert_eq!(rsp.code, ErrorCode::UnknownPlatform.code());
        assert_eq!(ctx.player_id, 0, "player must stay unbound");
    }

    #[tokio::test]
    async fn test_empty_account_replies_invalid_param() {
        let store = Arc::new(MemoryStore::new());
        let module = LoginModule::new(store as Arc<dyn PlayerStore>);

        let (_, reply) = run_login(&module, login_env("", 0, "")).await;

        assert_eq!(reply.msg_id, msgid::ERROR_RSP);
        let rsp: ErrorRsp = JsonCodec.decode(&reply.payload).expect("decode");
        assert_eq!(rsp.code, ErrorCode::InvalidParam.code());
    }

    #[tokio::test]
    async fn test_non_test_platform_requires_token() {
        let store = Arc::new(MemoryStore::new());
        let module = LoginModule::new(store as Arc<dyn PlayerStore>);

        let (_, reply) = run_login(&module, login_env("acct-a", 1, "")).await;
        let rsp: ErrorRsp = JsonCodec.decode(&reply.payload).expect("decode");
        assert_eq!(rsp.code, ErrorCode::Unauthorized.code());

        // With a token the android login goes through.
        let (_, reply) = run_login(&module, login_env("acct-a", 1, "platform-token")).await;
        assert_eq!(reply.msg_id, msgid::LOGIN_RSP);
    }

    #[tokio::test]
    async fn test_malformed_payload_replies_invalid_param() {
        let store = Arc::new(MemoryStore::new());
        let module = LoginModule::new(store as Arc<dyn PlayerStore>);

        let env = Envelope::new(msgid::LOGIN_REQ, 7, 0, b"not json".to_vec());
        let (_, reply) = run_login(&module, env).await;
        let rsp: ErrorRsp = JsonCodec.decode(&reply.payload).expect("decode");
        assert_eq!(rsp.code, ErrorCode::InvalidParam.code());
    }
}
