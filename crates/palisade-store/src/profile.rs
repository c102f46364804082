//! The persistent player profile.

use serde::{Deserialize, Serialize};

/// Everything the Game persists per player. Stored JSON-encoded under
/// `player:{role}:profile`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub role_id: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub account_id: String,
    pub nickname: String,
    pub level: i32,
    pub exp: i64,
    pub gold: i64,
    pub stamina: i64,
}

impl PlayerProfile {
    /// A fresh level-1 profile for a newly created role.
    pub fn new(role_id: i64, account_id: &str) -> Self {
        Self {
            role_id,
            account_id: account_id.to_string(),
            nickname: format!("player{role_id}"),
            level: 1,
            exp: 0,
            gold: 0,
            stamina: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_profile_starts_at_level_one() {
        let p = PlayerProfile::new(10001, "acct-a");
        assert_eq!(p.role_id, 10001);
        assert_eq!(p.account_id, "acct-a");
        assert_eq!(p.level, 1);
        assert_eq!(p.stamina, 100);
    }

    #[test]
    fn test_profile_json_round_trip() {
        let p = PlayerProfile::new(7, "a");
        let json = serde_json::to_string(&p).expect("encode");
        let back: PlayerProfile = serde_json::from_str(&json).expect("decode");
        assert_eq!(back, p);
    }

    #[test]
    fn test_profile_json_field_names_match_layout() {
        // The persisted shape is a contract shared with external tooling.
        let json = serde_json::to_value(PlayerProfile::new(1, "a")).expect("encode");
        for key in ["role_id", "nickname", "level", "exp", "gold", "stamina"] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
    }
}
