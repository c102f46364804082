//! The abstract player store.
//!
//! Persistence is external to this repo; nodes only see this trait. The
//! production implementation (Redis) lives with the deployment, the
//! in-process [`MemoryStore`](crate::MemoryStore) backs tests and
//! store-less development runs. Both speak the same key layout:
//!
//! ```text
//! account:{account_id}:role   → role id (decimal string)
//! player:{role_id}:profile    → JSON profile
//! uid:next                    → monotonic id counter
//! ```

use async_trait::async_trait;

use crate::{PlayerProfile, StoreError};

/// Key for the account → role mapping.
pub fn account_role_key(account_id: &str) -> String {
    format!("account:{account_id}:role")
}

/// Key for a role's persisted profile.
pub fn player_profile_key(role_id: i64) -> String {
    format!("player:{role_id}:profile")
}

/// Key of the monotonic uid counter.
pub const UID_NEXT_KEY: &str = "uid:next";

/// Load/save per key plus monotonic id allocation.
///
/// Implementations must be safe to share across tasks; nodes hold an
/// `Arc<dyn PlayerStore>`.
#[async_trait]
pub trait PlayerStore: Send + Sync {
    /// Resolves an account to its role id. `Ok(None)` when the account
    /// has no role yet.
    async fn load_role_id(&self, account_id: &str) -> Result<Option<i64>, StoreError>;

    async fn save_role_id(&self, account_id: &str, role_id: i64) -> Result<(), StoreError>;

    /// Loads a profile snapshot. `Ok(None)` when the role was never saved.
    async fn load_profile(&self, role_id: i64) -> Result<Option<PlayerProfile>, StoreError>;

    async fn save_profile(&self, profile: &PlayerProfile) -> Result<(), StoreError>;

    /// Allocates the next monotonic id. Ids are never reused.
    async fn next_uid(&self) -> Result<i64, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout_matches_contract() {
        assert_eq!(account_role_key("a"), "account:a:role");
        assert_eq!(player_profile_key(10001), "player:10001:profile");
        assert_eq!(UID_NEXT_KEY, "uid:next");
    }
}
