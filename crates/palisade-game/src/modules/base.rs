//! Base module: enter-game and profile queries.

use palisade_protocol::messages::{LoadPlayerDataRsp, PlayerData, PlayerEnterGameRsp};
use palisade_protocol::{Codec, Envelope, JsonCodec, ProtocolError, msgid};

use crate::module::{ModuleOutcome, PlayerCtx, PlayerModule};
use crate::GameError;

pub struct BaseModule {
    codec: JsonCodec,
}

impl BaseModule {
    pub fn new() -> Self {
        Self { codec: JsonCodec }
    }

    fn player_data(ctx: &PlayerCtx) -> PlayerData {
        let profile = ctx.profile_snapshot();
        PlayerData {
            role_id: profile.role_id,
            nickname: profile.nickname,
            level: profile.level,
            exp: profile.exp,
            gold: profile.gold,
            stamina: profile.stamina,
        }
    }

    fn reply(
        &self,
        env: &Envelope,
        msg_id: i32,
        payload: Result<Vec<u8>, ProtocolError>,
    ) -> Result<ModuleOutcome, GameError> {
        let payload = payload.map_err(|e| GameError::Transport(e.into()))?;
        Ok(ModuleOutcome::Handled(Some(Envelope::new(
            msg_id,
            env.session_id,
            env.player_id,
            payload,
        ))))
    }
}

impl Default for BaseModule {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerModule for BaseModule {
    fn name(&self) -> &'static str {
        "base"
    }

    fn can_handle(&self, msg_id: i32) -> bool {
        msg_id == msgid::PLAYER_ENTER_GAME_REQ || msg_id == msgid::LOAD_PLAYER_DATA_REQ
    }

    fn handle(&mut self, ctx: &PlayerCtx, env: &Envelope) -> Result<ModuleOutcome, GameError> {
        match env.msg_id {
            msgid::PLAYER_ENTER_GAME_REQ => {
                let rsp = PlayerEnterGameRsp {
                    data: Self::player_data(ctx),
                };
                self.reply(env, msgid::PLAYER_ENTER_GAME_RSP, self.codec.encode(&rsp))
            }
            msgid::LOAD_PLAYER_DATA_REQ => {
                let rsp = LoadPlayerDataRsp {
                    data: Self::player_data(ctx),
                };
                self.reply(env, msgid::LOAD_PLAYER_DATA_RSP, self.codec.encode(&rsp))
            }
            _ => Ok(ModuleOutcome::Pass),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use palisade_store::PlayerProfile;

    use super::*;

    fn ctx_with_profile(profile: PlayerProfile) -> PlayerCtx {
        PlayerCtx {
            player_id: profile.role_id,
            session_id: 7,
            profile: Arc::new(Mutex::new(profile)),
        }
    }

    #[test]
    fn test_can_handle_claims_enter_and_load_only() {
        let module = BaseModule::new();
        assert!(module.can_handle(msgid::PLAYER_ENTER_GAME_REQ));
        assert!(module.can_handle(msgid::LOAD_PLAYER_DATA_REQ));
        assert!(!module.can_handle(msgid::PLAYER_RESUME_REQ));
        assert!(!module.can_handle(msgid::LOGIN_REQ));
    }

    #[test]
    fn test_enter_game_replies_with_profile_snapshot() {
        let mut profile = PlayerProfile::new(10001, "a");
        profile.level = 5;
        profile.gold = 250;
        let ctx = ctx_with_profile(profile);
        let mut module = BaseModule::new();

        let req = Envelope::new(msgid::PLAYER_ENTER_GAME_REQ, 7, 10001, Vec::new());
        let outcome = module.handle(&ctx, &req).expect("handle");

        let ModuleOutcome::Handled(Some(reply)) = outcome else {
            panic!("expected a reply");
        };
        assert_eq!(reply.msg_id, msgid::PLAYER_ENTER_GAME_RSP);
        assert_eq!(reply.session_id, 7);
        assert_eq!(reply.player_id, 10001);

        let rsp: PlayerEnterGameRsp = JsonCodec.decode(&reply.payload).expect("decode");
        assert_eq!(rsp.data.role_id, 10001);
        assert_eq!(rsp.data.level, 5);
        assert_eq!(rsp.data.gold, 250);
    }

    #[test]
    fn test_load_player_data_replies_on_matching_id() {
        let ctx = ctx_with_profile(PlayerProfile::new(3, "b"));
        let mut module = BaseModule::new();

        let req = Envelope::new(msgid::LOAD_PLAYER_DATA_REQ, 9, 3, Vec::new());
        let outcome = module.handle(&ctx, &req).expect("handle");

        let ModuleOutcome::Handled(Some(reply)) = outcome else {
            panic!("expected a reply");
        };
        assert_eq!(reply.msg_id, msgid::LOAD_PLAYER_DATA_RSP);
        let rsp: LoadPlayerDataRsp = JsonCodec.decode(&reply.payload).expect("decode");
        assert_eq!(rsp.data.role_id, 3);
    }

    #[test]
    fn test_unrelated_id_passes() {
        let ctx = ctx_with_profile(PlayerProfile::new(3, "b"));
        let mut module = BaseModule::new();
        let req = Envelope::new(3999, 9, 3, Vec::new());
        assert!(matches!(
            module.handle(&ctx, &req).expect("handle"),
            ModuleOutcome::Pass
        ));
    }
}
