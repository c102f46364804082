//! In-process store over the shared key layout.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;

use crate::store::{PlayerStore, account_role_key, player_profile_key};
use crate::{PlayerProfile, StoreError};

/// Starting value for allocated role ids; keeps them visually distinct
/// from session ids in logs and test fixtures.
const FIRST_UID: i64 = 10001;

/// A `HashMap`-backed [`PlayerStore`].
///
/// Values are stored as the same strings the external store would hold,
/// so the key layout and the JSON profile encoding are exercised in every
/// test that touches persistence.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    next_uid: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_uid: AtomicI64::new(FIRST_UID),
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: String, value: String) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, value);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlayerStore for MemoryStore {
    async fn load_role_id(&self, account_id: &str) -> Result<Option<i64>, StoreError> {
        if account_id.is_empty() {
            return Ok(None);
        }
        match self.get(&account_role_key(account_id)) {
            Some(value) => {
                let role_id = value
                    .parse::<i64>()
                    .map_err(|_| StoreError::Corrupt(account_role_key(account_id)))?;
                Ok(Some(role_id))
            }
            None => Ok(None),
        }
    }

    async fn save_role_id(&self, account_id: &str, role_id: i64) -> Result<(), StoreError> {
        if account_id.is_empty() {
            return Err(StoreError::InvalidKey("empty account id".into()));
        }
        self.set(account_role_key(account_id), role_id.to_string());
        Ok(())
    }

    async fn load_profile(&self, role_id: i64) -> Result<Option<PlayerProfile>, StoreError> {
        if role_id == 0 {
            return Ok(None);
        }
        match self.get(&player_profile_key(role_id)) {
            Some(value) => {
                let profile = serde_json::from_str(&value)
                    .map_err(|_| StoreError::Corrupt(player_profile_key(role_id)))?;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }

    async fn save_profile(&self, profile: &PlayerProfile) -> Result<(), StoreError> {
        if profile.role_id == 0 {
            return Err(StoreError::InvalidKey("profile with role id 0".into()));
        }
        let value = serde_json::to_string(profile).map_err(StoreError::Encode)?;
        self.set(player_profile_key(profile.role_id), value);
        Ok(())
    }

    async fn next_uid(&self) -> Result<i64, StoreError> {
        Ok(self.next_uid.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_role_id_unknown_account_returns_none() {
        let store = MemoryStore::new();
        assert!(store.load_role_id("nobody").await.expect("load").is_none());
    }

    #[tokio::test]
    async fn test_save_then_load_role_id() {
        let store = MemoryStore::new();
        store.save_role_id("a", 10001).await.expect("save");
        assert_eq!(store.load_role_id("a").await.expect("load"), Some(10001));
    }

    #[tokio::test]
    async fn test_save_then_load_profile_round_trips() {
        let store = MemoryStore::new();
        let profile = PlayerProfile::new(10001, "a");
        store.save_profile(&profile).await.expect("save");
        assert_eq!(
            store.load_profile(10001).await.expect("load"),
            Some(profile)
        );
    }

    #[tokio::test]
    async fn test_load_profile_role_zero_is_none() {
        // 0 is the "unset" sentinel, never a key.
        let store = MemoryStore::new();
        assert!(store.load_profile(0).await.expect("load").is_none());
    }

    #[tokio::test]
    async fn test_save_profile_role_zero_is_refused() {
        let store = MemoryStore::new();
        let result = store.save_profile(&PlayerProfile::default()).await;
        assert!(matches!(result, Err(StoreError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_next_uid_is_monotonic() {
        let store = MemoryStore::new();
        let first = store.next_uid().await.expect("uid");
        let second = store.next_uid().await.expect("uid");
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_empty_account_id_never_stored() {
        let store = MemoryStore::new();
        assert!(store.save_role_id("", 1).await.is_err());
        assert!(store.load_role_id("").await.expect("load").is_none());
    }
}
