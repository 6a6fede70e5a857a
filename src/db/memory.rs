// db/memory.rs
//! Process-local store used for `STORAGE_BACKEND=memory` and in tests. Counters
//! here are only unique within one process.
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::counterdb::CounterStore;
use super::kycdb::KycStore;
use super::referraldb::ReferralCodeStore;
use crate::models::{
    kycmodel::{KycCheck, KycStatus},
    referralmodel::ReferralCodeRecord,
};
use crate::service::error::ServiceError;

#[derive(Debug, Default)]
pub struct MemoryStore {
    counters: Mutex<HashMap<char, i64>>,
    codes: Mutex<HashMap<String, ReferralCodeRecord>>,
    kyc_checks: Mutex<HashMap<(Uuid, String), KycCheck>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, ServiceError> {
    mutex
        .lock()
        .map_err(|_| ServiceError::StorageUnavailable("memory store lock poisoned".to_string()))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a shard's counter at `value`, as if it had already issued that many codes.
    #[cfg(test)]
    pub fn set_counter(&self, shard: char, value: i64) -> Result<(), ServiceError> {
        lock(&self.counters)?.insert(shard, value);
        Ok(())
    }

    #[cfg(test)]
    pub fn counter(&self, shard: char) -> Result<Option<i64>, ServiceError> {
        Ok(lock(&self.counters)?.get(&shard).copied())
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment(&self, shard: char) -> Result<i64, ServiceError> {
        let mut counters = lock(&self.counters)?;
        let value = counters.entry(shard).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn seed_shards(&self, shards: &[char]) -> Result<(), ServiceError> {
        let mut counters = lock(&self.counters)?;
        for shard in shards {
            counters.entry(*shard).or_insert(0);
        }
        Ok(())
    }
}

#[async_trait]
impl ReferralCodeStore for MemoryStore {
    async fn insert_code(&self, user_id: Uuid, code: &str) -> Result<ReferralCodeRecord, ServiceError> {
        let mut codes = lock(&self.codes)?;

        if let Some(existing) = codes.values().find(|r| r.user_id == user_id) {
            return Ok(existing.clone());
        }
        if codes.contains_key(code) {
            return Err(ServiceError::CollisionRejected(code.to_string()));
        }

        let record = ReferralCodeRecord {
            user_id,
            code: code.to_string(),
            created_at: Utc::now(),
        };
        codes.insert(code.to_string(), record.clone());
        Ok(record)
    }

    async fn get_code_by_user(&self, user_id: Uuid) -> Result<Option<ReferralCodeRecord>, ServiceError> {
        Ok(lock(&self.codes)?
            .values()
            .find(|r| r.user_id == user_id)
            .cloned())
    }

    async fn get_code(&self, code: &str) -> Result<Option<ReferralCodeRecord>, ServiceError> {
        Ok(lock(&self.codes)?.get(code).cloned())
    }
}

#[async_trait]
impl KycStore for MemoryStore {
    async fn upsert_check(
        &self,
        user_id: Uuid,
        provider: &str,
        status: KycStatus,
        reference: Option<String>,
    ) -> Result<KycCheck, ServiceError> {
        let mut checks = lock(&self.kyc_checks)?;
        let key = (user_id, provider.to_string());
        let reference = reference.or_else(|| checks.get(&key).and_then(|c| c.reference.clone()));

        let check = KycCheck {
            user_id,
            provider: provider.to_string(),
            status,
            reference,
            updated_at: Utc::now(),
        };
        checks.insert(key, check.clone());
        Ok(check)
    }

    async fn list_checks(&self, user_id: Uuid) -> Result<Vec<KycCheck>, ServiceError> {
        let mut checks: Vec<KycCheck> = lock(&self.kyc_checks)?
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        checks.sort_by(|a, b| a.provider.cmp(&b.provider));
        Ok(checks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn increments_are_strictly_increasing_per_shard() {
        let store = MemoryStore::new();
        let first = store.increment('A').await.unwrap();
        let second = store.increment('A').await.unwrap();
        assert!(second > first);
        assert_eq!(store.increment('B').await.unwrap(), 1);
    }

    #[tokio::test]
    async fn seeding_never_resets_a_counter() {
        let store = MemoryStore::new();
        store.set_counter('Z', 41).unwrap();
        store.seed_shards(&['Z', 'Y']).await.unwrap();
        assert_eq!(store.counter('Z').unwrap(), Some(41));
        assert_eq!(store.counter('Y').unwrap(), Some(0));
    }

    #[tokio::test]
    async fn duplicate_codes_are_rejected() {
        let store = MemoryStore::new();
        store.insert_code(Uuid::new_v4(), "A22223B").await.unwrap();

        let err = store.insert_code(Uuid::new_v4(), "A22223B").await.unwrap_err();
        assert!(matches!(err, ServiceError::CollisionRejected(code) if code == "A22223B"));
    }

    #[tokio::test]
    async fn a_user_keeps_their_first_code() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.insert_code(user, "A22223B").await.unwrap();

        let again = store.insert_code(user, "B22223C").await.unwrap();
        assert_eq!(again.code, "A22223B");
        assert!(store.get_code("B22223C").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn kyc_upsert_keeps_previous_reference() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store
            .upsert_check(user, "sumsub", KycStatus::Pending, Some("app-1".into()))
            .await
            .unwrap();
        let updated = store
            .upsert_check(user, "sumsub", KycStatus::Approved, None)
            .await
            .unwrap();

        assert_eq!(updated.status, KycStatus::Approved);
        assert_eq!(updated.reference.as_deref(), Some("app-1"));
        assert_eq!(store.list_checks(user).await.unwrap().len(), 1);
    }
}
