// service/referral.rs
//! Referral codes: `[shard:1][counter:5][checksum:1]`.
//!
//! A code is a random shard symbol, that shard's counter value in base-32
//! (five symbols, padded with the zero symbol) and a checksum symbol. All three
//! parts use the same 32-symbol alphabet, which leaves out `0/O` and `1/I`.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use uuid::Uuid;

use super::error::ServiceError;
use crate::db::{query_timeout::QueryTimeout, CounterStore, ReferralCodeStore};
use crate::models::referralmodel::ReferralCodeRecord;

pub const ALPHABET: &[u8; 32] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";
pub const SHARD_COUNT: usize = ALPHABET.len();
pub const COUNTER_WIDTH: usize = 5;
pub const CODE_LEN: usize = 1 + COUNTER_WIDTH + 1;
/// Storage width of a code. The 8th position is reserved and never populated.
pub const RESERVED_CODE_LEN: usize = 8;
/// Largest counter value that fits in `COUNTER_WIDTH` symbols (32^5 - 1).
pub const MAX_COUNTER_VALUE: i64 = (SHARD_COUNT as i64).pow(COUNTER_WIDTH as u32) - 1;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

fn symbol(index: usize) -> char {
    ALPHABET[index % SHARD_COUNT] as char
}

pub fn alphabet_index(c: char) -> Option<usize> {
    ALPHABET.iter().position(|&b| b as char == c)
}

/// Every shard symbol, in alphabet order.
pub fn shards() -> Vec<char> {
    ALPHABET.iter().map(|&b| b as char).collect()
}

pub fn random_shard() -> char {
    symbol(rand::rng().random_range(0..SHARD_COUNT))
}

/// Base-32 encodes `value` into exactly `COUNTER_WIDTH` symbols, or `None`
/// when it does not fit.
pub fn encode_counter(value: i64) -> Option<String> {
    if !(0..=MAX_COUNTER_VALUE).contains(&value) {
        return None;
    }

    let mut digits = [ALPHABET[0]; COUNTER_WIDTH];
    let mut rest = value as usize;
    for slot in digits.iter_mut().rev() {
        *slot = ALPHABET[rest % SHARD_COUNT];
        rest /= SHARD_COUNT;
    }
    Some(digits.iter().map(|&b| b as char).collect())
}

/// Sum of the alphabet indices mod 32, mapped back through the alphabet.
/// `None` if `payload` holds a symbol outside the alphabet.
pub fn checksum(payload: &str) -> Option<char> {
    let mut sum = 0usize;
    for c in payload.chars() {
        sum += alphabet_index(c)?;
    }
    Some(symbol(sum))
}

pub fn build_code(shard: char, value: i64) -> Result<String, ServiceError> {
    if alphabet_index(shard).is_none() {
        return Err(ServiceError::Validation(format!("'{}' is not a shard symbol", shard)));
    }
    let counter = encode_counter(value).ok_or(ServiceError::CounterExhausted { shard, value })?;

    let mut code = String::with_capacity(CODE_LEN);
    code.push(shard);
    code.push_str(&counter);
    let check = checksum(&code)
        .ok_or_else(|| ServiceError::Validation(format!("unencodable code {}", code)))?;
    code.push(check);

    Ok(code)
}

/// Normalises user input (trim, uppercase) and checks length, alphabet and
/// checksum. Returns the canonical form.
pub fn validate_code(input: &str) -> Result<String, ServiceError> {
    let code = input.trim().to_ascii_uppercase();
    let invalid = || ServiceError::InvalidReferralCode(input.trim().to_string());

    if !code.is_ascii() || code.len() != CODE_LEN {
        return Err(invalid());
    }

    let (payload, check) = code.split_at(CODE_LEN - 1);
    match checksum(payload) {
        Some(expected) if check.starts_with(expected) => Ok(code),
        _ => Err(invalid()),
    }
}

pub fn generate_referral_link(base_url: &str, code: &str) -> String {
    format!("{}/register?ref={}", base_url.trim_end_matches('/'), code)
}

pub struct ReferralService {
    counters: Arc<dyn CounterStore>,
    codes: Arc<dyn ReferralCodeStore>,
    max_attempts: u32,
    counter_timeout: Duration,
}

impl fmt::Debug for ReferralService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferralService")
            .field("max_attempts", &self.max_attempts)
            .field("counter_timeout", &self.counter_timeout)
            .finish()
    }
}

impl ReferralService {
    pub fn new(counters: Arc<dyn CounterStore>, codes: Arc<dyn ReferralCodeStore>) -> Self {
        Self {
            counters,
            codes,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            counter_timeout: QueryTimeout::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_counter_timeout(mut self, counter_timeout: Duration) -> Self {
        self.counter_timeout = counter_timeout;
        self
    }

    /// Creates any missing shard counters. Safe to run on every start.
    pub async fn seed_counters(&self) -> Result<(), ServiceError> {
        self.counters.seed_shards(&shards()).await
    }

    /// Draws a fresh code from a random shard. The code is not persisted, so it
    /// may still collide with one already stored.
    pub async fn generate_code(&self) -> Result<String, ServiceError> {
        self.generate_code_in_shard(random_shard()).await
    }

    pub async fn generate_code_in_shard(&self, shard: char) -> Result<String, ServiceError> {
        if alphabet_index(shard).is_none() {
            return Err(ServiceError::Validation(format!("'{}' is not a shard symbol", shard)));
        }

        let value = QueryTimeout::execute_with_timeout(
            self.counters.increment(shard),
            self.counter_timeout,
        )
        .await
        .map_err(|e| {
            tracing::error!("Referral counter increment failed for shard {}: {}", shard, e);
            e
        })?;

        build_code(shard, value)
    }

    /// Gives `user_id` a referral code, reusing the one they already have.
    /// Collisions and exhausted shards are retried with a new shard up to
    /// `max_attempts` times; storage failures are returned immediately.
    pub async fn assign_code(&self, user_id: Uuid) -> Result<ReferralCodeRecord, ServiceError> {
        if let Some(existing) = self.codes.get_code_by_user(user_id).await? {
            return Ok(existing);
        }

        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            let code = match self.generate_code().await {
                Ok(code) => code,
                Err(err @ ServiceError::CounterExhausted { .. }) => {
                    tracing::error!("{} (attempt {}/{})", err, attempt, self.max_attempts);
                    last_error = Some(err);
                    continue;
                }
                Err(err) => return Err(err),
            };

            match self.codes.insert_code(user_id, &code).await {
                Ok(record) => {
                    tracing::info!("Assigned referral code {} to user {}", record.code, user_id);
                    return Ok(record);
                }
                Err(err @ ServiceError::CollisionRejected(_)) => {
                    tracing::warn!("{} (attempt {}/{})", err, attempt, self.max_attempts);
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        match last_error {
            Some(err @ ServiceError::CounterExhausted { .. }) => Err(err),
            _ => Err(ServiceError::CollisionRetriesExhausted(self.max_attempts)),
        }
    }

    /// Resolves a code to its owner. Malformed codes are rejected before any
    /// storage round trip.
    pub async fn lookup(&self, code: &str) -> Result<ReferralCodeRecord, ServiceError> {
        let code = validate_code(code)?;
        self.codes
            .get_code(&code)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Referral code {}", code)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn service(store: &Arc<MemoryStore>) -> ReferralService {
        ReferralService::new(store.clone(), store.clone())
    }

    struct FailingCounter;

    #[async_trait]
    impl CounterStore for FailingCounter {
        async fn increment(&self, _shard: char) -> Result<i64, ServiceError> {
            Err(ServiceError::StorageUnavailable("connection refused".into()))
        }
    }

    struct SlowCounter;

    #[async_trait]
    impl CounterStore for SlowCounter {
        async fn increment(&self, _shard: char) -> Result<i64, ServiceError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(1)
        }
    }

    /// Rejects the first `rejections` inserts as collisions.
    struct CollidingCodes {
        rejections: AtomicU32,
        inner: MemoryStore,
    }

    #[async_trait]
    impl ReferralCodeStore for CollidingCodes {
        async fn insert_code(&self, user_id: Uuid, code: &str) -> Result<ReferralCodeRecord, ServiceError> {
            let remaining = self.rejections.load(Ordering::SeqCst);
            if remaining > 0 {
                self.rejections.store(remaining - 1, Ordering::SeqCst);
                return Err(ServiceError::CollisionRejected(code.to_string()));
            }
            self.inner.insert_code(user_id, code).await
        }

        async fn get_code_by_user(&self, user_id: Uuid) -> Result<Option<ReferralCodeRecord>, ServiceError> {
            self.inner.get_code_by_user(user_id).await
        }

        async fn get_code(&self, code: &str) -> Result<Option<ReferralCodeRecord>, ServiceError> {
            self.inner.get_code(code).await
        }
    }

    fn colliding(rejections: u32) -> Arc<CollidingCodes> {
        Arc::new(CollidingCodes {
            rejections: AtomicU32::new(rejections),
            inner: MemoryStore::new(),
        })
    }

    #[test]
    fn alphabet_has_no_ambiguous_symbols() {
        assert_eq!(SHARD_COUNT, 32);
        for c in ['0', '1', 'O', 'I'] {
            assert!(alphabet_index(c).is_none());
        }
        assert_eq!(shards().into_iter().collect::<HashSet<_>>().len(), 32);
    }

    #[test]
    fn shard_a_counter_one() {
        assert_eq!(encode_counter(1).as_deref(), Some("22223"));
        // A=8, 3=1 -> 9 -> 'B'
        assert_eq!(build_code('A', 1).unwrap(), "A22223B");
    }

    #[test]
    fn counter_encoding_bounds() {
        assert_eq!(encode_counter(0).as_deref(), Some("22222"));
        assert_eq!(encode_counter(32).as_deref(), Some("22232"));
        assert_eq!(encode_counter(MAX_COUNTER_VALUE).as_deref(), Some("ZZZZZ"));
        assert_eq!(encode_counter(MAX_COUNTER_VALUE + 1), None);
        assert_eq!(encode_counter(-1), None);
        assert_eq!(MAX_COUNTER_VALUE, 33_554_431);
    }

    #[test]
    fn overflow_is_an_error_not_a_wrap() {
        let err = build_code('Q', MAX_COUNTER_VALUE + 1).unwrap_err();
        assert!(matches!(err, ServiceError::CounterExhausted { shard: 'Q', .. }));
    }

    #[test]
    fn codes_fit_the_reserved_width() {
        let code = build_code('Z', MAX_COUNTER_VALUE).unwrap();
        assert_eq!(code.len(), CODE_LEN);
        assert!(code.len() < RESERVED_CODE_LEN);
    }

    #[test]
    fn every_single_symbol_substitution_is_detected() {
        let code = build_code('K', 123_456).unwrap();
        assert!(validate_code(&code).is_ok());

        for position in 0..CODE_LEN {
            for replacement in shards() {
                let mut chars: Vec<char> = code.chars().collect();
                if chars[position] == replacement {
                    continue;
                }
                chars[position] = replacement;
                let corrupted: String = chars.into_iter().collect();
                assert!(validate_code(&corrupted).is_err(), "{} accepted", corrupted);
            }
        }
    }

    #[test]
    fn validation_normalises_input() {
        assert_eq!(validate_code("  a22223b ").unwrap(), "A22223B");
        assert!(validate_code("A22223").is_err());
        assert!(validate_code("A22223BX").is_err());
        assert!(validate_code("O22223B").is_err());
        assert!(validate_code("A2222éB").is_err());
    }

    #[test]
    fn referral_link_format() {
        assert_eq!(
            generate_referral_link("https://app.example.com/", "A22223B"),
            "https://app.example.com/register?ref=A22223B"
        );
    }

    #[tokio::test]
    async fn generated_codes_carry_a_valid_checksum() {
        let store = Arc::new(MemoryStore::new());
        let referrals = service(&store);

        for _ in 0..500 {
            let code = referrals.generate_code().await.unwrap();
            let (payload, check) = code.split_at(CODE_LEN - 1);
            assert_eq!(checksum(payload).map(String::from).as_deref(), Some(check));
        }
    }

    #[tokio::test]
    async fn ten_thousand_codes_are_distinct() {
        let store = Arc::new(MemoryStore::new());
        let referrals = service(&store);

        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(referrals.generate_code().await.unwrap()));
        }
    }

    #[tokio::test]
    async fn concurrent_generation_never_repeats() {
        let store = Arc::new(MemoryStore::new());
        let referrals = Arc::new(service(&store));

        let tasks = (0..256).map(|_| {
            let referrals = referrals.clone();
            tokio::spawn(async move { referrals.generate_code_in_shard('M').await })
        });
        let codes: HashSet<String> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        assert_eq!(codes.len(), 256);
        assert_eq!(store.counter('M').unwrap(), Some(256));
    }

    #[tokio::test]
    async fn exhausted_shard_is_reported() {
        let store = Arc::new(MemoryStore::new());
        store.set_counter('A', MAX_COUNTER_VALUE).unwrap();

        let err = service(&store).generate_code_in_shard('A').await.unwrap_err();
        assert!(matches!(err, ServiceError::CounterExhausted { shard: 'A', .. }));
    }

    #[tokio::test]
    async fn unknown_shard_is_rejected_before_touching_the_counter() {
        let store = Arc::new(MemoryStore::new());

        let err = service(&store).generate_code_in_shard('O').await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(store.counter('O').unwrap(), None);
    }

    #[tokio::test]
    async fn storage_failure_propagates_without_a_code() {
        let store = Arc::new(MemoryStore::new());
        let referrals = ReferralService::new(Arc::new(FailingCounter), store.clone());
        let user = Uuid::new_v4();

        let err = referrals.assign_code(user).await.unwrap_err();
        assert!(matches!(err, ServiceError::StorageUnavailable(_)));
        assert!(err.is_retryable());
        assert!(store.get_code_by_user(user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn slow_counter_times_out() {
        let store = Arc::new(MemoryStore::new());
        let referrals = ReferralService::new(Arc::new(SlowCounter), store)
            .with_counter_timeout(Duration::from_millis(10));

        let err = referrals.generate_code().await.unwrap_err();
        assert!(matches!(err, ServiceError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn collisions_are_retried() {
        let counters = Arc::new(MemoryStore::new());
        let codes = colliding(2);
        let referrals = ReferralService::new(counters, codes.clone());

        let record = referrals.assign_code(Uuid::new_v4()).await.unwrap();
        assert!(validate_code(&record.code).is_ok());
        assert_eq!(codes.rejections.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn collision_retries_are_bounded() {
        let counters = Arc::new(MemoryStore::new());
        let referrals = ReferralService::new(counters, colliding(u32::MAX));

        let err = referrals.assign_code(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::CollisionRetriesExhausted(3)));
    }

    #[tokio::test]
    async fn assigning_twice_returns_the_same_code() {
        let store = Arc::new(MemoryStore::new());
        let referrals = service(&store);
        let user = Uuid::new_v4();

        let first = referrals.assign_code(user).await.unwrap();
        let second = referrals.assign_code(user).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn lookup_rejects_bad_checksums_and_unknown_codes() {
        let store = Arc::new(MemoryStore::new());
        let referrals = service(&store);
        let record = referrals.assign_code(Uuid::new_v4()).await.unwrap();

        let found = referrals.lookup(&record.code.to_lowercase()).await.unwrap();
        assert_eq!(found, record);

        assert!(matches!(
            referrals.lookup("A22223C").await,
            Err(ServiceError::InvalidReferralCode(_))
        ));
        let unissued = build_code('A', 999).unwrap();
        assert!(matches!(
            referrals.lookup(&unissued).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
