// config.rs
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing_subscriber::filter::LevelFilter;

use crate::service::{error::ServiceError, referral::DEFAULT_MAX_ATTEMPTS, webhook::WebhookProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    /// Counters in Redis, codes and KYC checks in Postgres.
    Redis,
    /// Process-local; counters are not shared between instances.
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(StorageBackend::Postgres),
            "redis" => Ok(StorageBackend::Redis),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(ServiceError::Config(format!("unknown STORAGE_BACKEND '{}'", other))),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub storage_backend: StorageBackend,
    pub app_url: String,
    pub port: u16,
    pub log_level: LevelFilter,
    pub referral_max_attempts: u32,
    pub counter_timeout: Duration,
    pub webhook_secrets: HashMap<WebhookProvider, Vec<u8>>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<&str> = self.webhook_secrets.keys().map(|p| p.slug()).collect();
        providers.sort_unstable();
        f.debug_struct("Config")
            .field("storage_backend", &self.storage_backend)
            .field("redis_url", &self.redis_url.is_some())
            .field("app_url", &self.app_url)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("referral_max_attempts", &self.referral_max_attempts)
            .field("counter_timeout", &self.counter_timeout)
            .field("webhook_providers", &providers)
            .finish()
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ServiceError> {
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ServiceError::Config(format!("{} has an invalid value '{}'", key, raw))),
        _ => Ok(default),
    }
}

impl Config {
    /// Reads configuration from the process environment.
    pub fn init() -> Result<Config, ServiceError> {
        Config::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from any key lookup. Every enabled webhook provider
    /// must have a non-empty secret, otherwise this fails with `MissingSecret`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ServiceError> {
        let storage_backend = parse_or(&lookup, "STORAGE_BACKEND", StorageBackend::Postgres)?;

        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        let redis_url = lookup("REDIS_URL").filter(|v| !v.trim().is_empty());

        match storage_backend {
            StorageBackend::Postgres | StorageBackend::Redis if database_url.is_none() => {
                return Err(ServiceError::Config("DATABASE_URL must be set".to_string()));
            }
            StorageBackend::Redis if redis_url.is_none() => {
                return Err(ServiceError::Config(
                    "REDIS_URL must be set when STORAGE_BACKEND=redis".to_string(),
                ));
            }
            _ => {}
        }

        let providers = match lookup("WEBHOOK_PROVIDERS") {
            Some(list) if !list.trim().is_empty() => list
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|p| p.parse::<WebhookProvider>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ServiceError::Config(e.to_string()))?,
            _ => WebhookProvider::ALL.to_vec(),
        };

        let mut webhook_secrets = HashMap::new();
        for provider in providers {
            let key = provider.secret_env_key();
            match lookup(&key) {
                Some(secret) if !secret.trim().is_empty() => {
                    webhook_secrets.insert(provider, secret.into_bytes());
                }
                _ => return Err(ServiceError::MissingSecret(key)),
            }
        }

        let referral_max_attempts: u32 =
            parse_or(&lookup, "REFERRAL_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        let counter_timeout_ms: u64 = parse_or(&lookup, "COUNTER_TIMEOUT_MS", 5000)?;

        Ok(Config {
            database_url,
            redis_url,
            storage_backend,
            app_url: lookup("APP_URL").unwrap_or_else(|| "http://localhost:8000".to_string()),
            port: parse_or(&lookup, "PORT", 8000)?,
            log_level: parse_or(&lookup, "LOG_LEVEL", LevelFilter::DEBUG)?,
            referral_max_attempts: referral_max_attempts.max(1),
            counter_timeout: Duration::from_millis(counter_timeout_ms),
            webhook_secrets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn memory_backend_with_one_provider() {
        let config = Config::from_lookup(env(&[
            ("STORAGE_BACKEND", "memory"),
            ("WEBHOOK_PROVIDERS", "paycrest"),
            ("PAYCREST_WEBHOOK_SECRET", "s3cret"),
        ]))
        .unwrap();

        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.port, 8000);
        assert_eq!(config.referral_max_attempts, 3);
        assert_eq!(config.counter_timeout, Duration::from_secs(5));
        assert_eq!(config.webhook_secrets.len(), 1);
        assert_eq!(
            config.webhook_secrets.get(&WebhookProvider::Paycrest).map(Vec::as_slice),
            Some(&b"s3cret"[..])
        );
    }

    #[test]
    fn enabled_provider_without_secret_fails_closed() {
        let err = Config::from_lookup(env(&[
            ("STORAGE_BACKEND", "memory"),
            ("WEBHOOK_PROVIDERS", "paycrest,sumsub"),
            ("PAYCREST_WEBHOOK_SECRET", "s3cret"),
            ("SUMSUB_WEBHOOK_SECRET", "   "),
        ]))
        .unwrap_err();

        assert!(matches!(err, ServiceError::MissingSecret(key) if key == "SUMSUB_WEBHOOK_SECRET"));
    }

    #[test]
    fn secrets_are_kept_verbatim() {
        let config = Config::from_lookup(env(&[
            ("STORAGE_BACKEND", "memory"),
            ("WEBHOOK_PROVIDERS", "idrx"),
            ("IDRX_WEBHOOK_SECRET", " padded secret\n"),
        ]))
        .unwrap();

        assert_eq!(
            config.webhook_secrets.get(&WebhookProvider::Idrx).map(Vec::as_slice),
            Some(&b" padded secret\n"[..])
        );
    }

    #[test]
    fn all_providers_are_enabled_by_default() {
        let err = Config::from_lookup(env(&[("STORAGE_BACKEND", "memory")])).unwrap_err();
        assert!(matches!(err, ServiceError::MissingSecret(_)));
    }

    #[test]
    fn postgres_requires_database_url() {
        let err = Config::from_lookup(env(&[("WEBHOOK_PROVIDERS", "idrx"), ("IDRX_WEBHOOK_SECRET", "x")]))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }

    #[test]
    fn redis_requires_redis_url() {
        let err = Config::from_lookup(env(&[
            ("STORAGE_BACKEND", "redis"),
            ("DATABASE_URL", "postgres://localhost/offramp"),
            ("WEBHOOK_PROVIDERS", "idrx"),
            ("IDRX_WEBHOOK_SECRET", "x"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ServiceError::Config(msg) if msg.contains("REDIS_URL")));
    }

    #[test]
    fn rejects_unknown_provider_and_bad_numbers() {
        assert!(Config::from_lookup(env(&[
            ("STORAGE_BACKEND", "memory"),
            ("WEBHOOK_PROVIDERS", "stripe"),
        ]))
        .is_err());

        assert!(Config::from_lookup(env(&[
            ("STORAGE_BACKEND", "memory"),
            ("WEBHOOK_PROVIDERS", "idrx"),
            ("IDRX_WEBHOOK_SECRET", "x"),
            ("PORT", "eighty"),
        ]))
        .is_err());
    }
}
