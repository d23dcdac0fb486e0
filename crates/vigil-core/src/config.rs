//! Configuration module
//!
//! Configuration is read from environment variables (optionally seeded from a `.env`
//! file) with defaults for everything except the deployment-specific storage and database
//! settings, then validated once at startup.

use std::env;
use std::str::FromStr;

use crate::backends::{BusBackend, StatusStoreBackend, StorageBackend};

// Common constants
const SERVICE_NAME: &str = "vigil";
const KAFKA_BROKERS: &str = "localhost:9092";
const KAFKA_GROUP_ID: &str = "vigil-scanner";
const KAFKA_RESULTS_GROUP_ID: &str = "vigil-results";
const TOPIC_UPLOAD_EVENTS: &str = "file-upload-events";
const TOPIC_SCAN_RESULTS: &str = "file-scan-results";
const TOPIC_UPLOAD_EVENTS_DLT: &str = "file-upload-events-dlt";
const RETRY_MAX_ATTEMPTS: u32 = 3;
const RETRY_INITIAL_DELAY_MS: u64 = 1000;
const RETRY_MULTIPLIER: f64 = 2.0;
const RETRY_MAX_DELAY_MS: u64 = 10_000;
const DLT_REPLAY_POLL_TIMEOUT_MS: u64 = 2000;
const CONSUMER_WORKERS: usize = 1;
const CLAMAV_PORT: u16 = 3310;
const CLAMAV_TIMEOUT_SECS: u64 = 30;
const DB_MAX_CONNECTIONS: u32 = 10;

/// Channel names. Deployment configuration, not part of the message contract.
#[derive(Clone, Debug, PartialEq)]
pub struct TopicConfig {
    pub upload_events: String,
    pub scan_results: String,
    pub upload_events_dlt: String,
}

/// Message transport configuration
#[derive(Clone, Debug, PartialEq)]
pub struct BusConfig {
    pub backend: BusBackend,
    pub brokers: String,
    pub client_id: String,
    /// Consumer group of the scan worker
    pub group_id: String,
    /// Consumer group of the result ingester
    pub results_group_id: String,
    pub topics: TopicConfig,
}

/// Redelivery policy settings for consumers
#[derive(Clone, Debug, PartialEq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            initial_delay_ms: RETRY_INITIAL_DELAY_MS,
            multiplier: RETRY_MULTIPLIER,
            max_delay_ms: RETRY_MAX_DELAY_MS,
        }
    }
}

/// ClamAV daemon connection settings
#[derive(Clone, Debug, PartialEq)]
pub struct ClamAvConfig {
    pub host: String,
    pub port: u16,
    /// Timeout in seconds for each scan operation
    pub timeout_secs: u64,
}

/// Object storage configuration
#[derive(Clone, Debug, PartialEq)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    /// Custom endpoint for S3-compatible providers such as MinIO
    pub s3_endpoint: Option<String>,
    pub local_storage_path: Option<String>,
}

impl StorageConfig {
    /// Bucket name stamped on events republished by admin operations
    pub fn bucket_name(&self) -> &str {
        self.s3_bucket.as_deref().unwrap_or("local")
    }
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub service_name: String,
    pub log_json: bool,
    pub bus: BusConfig,
    pub retry: RetrySettings,
    pub dlt_replay_poll_timeout_ms: u64,
    pub consumer_workers: usize,
    pub clamav: ClamAvConfig,
    pub storage: StorageConfig,
    pub status_store: StatusStoreBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
}

impl Config {
    /// Load `.env` if present, then read configuration from the process environment.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup and validate it.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string_or = |key: &str, default: &str| {
            lookup(key)
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let optional = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

        let storage_backend = parse_or(&lookup, "STORAGE_BACKEND", StorageBackend::S3)?;
        let bus_backend = parse_or(&lookup, "BUS_BACKEND", BusBackend::Kafka)?;
        let status_store = parse_or(&lookup, "STATUS_STORE", StatusStoreBackend::Postgres)?;

        let config = Config {
            environment: string_or("ENVIRONMENT", "development"),
            service_name: string_or("SERVICE_NAME", SERVICE_NAME),
            log_json: string_or("LOG_FORMAT", "text").eq_ignore_ascii_case("json"),
            bus: BusConfig {
                backend: bus_backend,
                brokers: string_or("KAFKA_BROKERS", KAFKA_BROKERS),
                client_id: string_or("KAFKA_CLIENT_ID", SERVICE_NAME),
                group_id: string_or("KAFKA_GROUP_ID", KAFKA_GROUP_ID),
                results_group_id: string_or("KAFKA_RESULTS_GROUP_ID", KAFKA_RESULTS_GROUP_ID),
                topics: TopicConfig {
                    upload_events: string_or("TOPIC_UPLOAD_EVENTS", TOPIC_UPLOAD_EVENTS),
                    scan_results: string_or("TOPIC_SCAN_RESULTS", TOPIC_SCAN_RESULTS),
                    upload_events_dlt: string_or(
                        "TOPIC_UPLOAD_EVENTS_DLT",
                        TOPIC_UPLOAD_EVENTS_DLT,
                    ),
                },
            },
            retry: RetrySettings {
                max_attempts: parse_or(&lookup, "RETRY_MAX_ATTEMPTS", RETRY_MAX_ATTEMPTS)?,
                initial_delay_ms: parse_or(
                    &lookup,
                    "RETRY_INITIAL_DELAY_MS",
                    RETRY_INITIAL_DELAY_MS,
                )?,
                multiplier: parse_or(&lookup, "RETRY_MULTIPLIER", RETRY_MULTIPLIER)?,
                max_delay_ms: parse_or(&lookup, "RETRY_MAX_DELAY_MS", RETRY_MAX_DELAY_MS)?,
            },
            dlt_replay_poll_timeout_ms: parse_or(
                &lookup,
                "DLT_REPLAY_POLL_TIMEOUT_MS",
                DLT_REPLAY_POLL_TIMEOUT_MS,
            )?,
            consumer_workers: parse_or(&lookup, "CONSUMER_WORKERS", CONSUMER_WORKERS)?,
            clamav: ClamAvConfig {
                host: string_or("CLAMAV_HOST", "localhost"),
                port: parse_or(&lookup, "CLAMAV_PORT", CLAMAV_PORT)?,
                timeout_secs: parse_or(&lookup, "CLAMAV_TIMEOUT_SECS", CLAMAV_TIMEOUT_SECS)?,
            },
            storage: StorageConfig {
                backend: storage_backend,
                s3_bucket: optional("S3_BUCKET"),
                s3_region: optional("S3_REGION").or_else(|| optional("AWS_REGION")),
                s3_endpoint: optional("S3_ENDPOINT"),
                local_storage_path: optional("LOCAL_STORAGE_PATH"),
            },
            status_store,
            database_url: optional("DATABASE_URL"),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DB_MAX_CONNECTIONS)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.retry.max_attempts < 1 {
            return Err(anyhow::anyhow!("RETRY_MAX_ATTEMPTS must be at least 1"));
        }

        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(anyhow::anyhow!("RETRY_MULTIPLIER must be a number >= 1.0"));
        }

        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(anyhow::anyhow!(
                "RETRY_MAX_DELAY_MS must not be lower than RETRY_INITIAL_DELAY_MS"
            ));
        }

        if self.consumer_workers == 0 {
            return Err(anyhow::anyhow!("CONSUMER_WORKERS must be at least 1"));
        }

        let topics = &self.bus.topics;
        if topics.upload_events == topics.upload_events_dlt
            || topics.upload_events == topics.scan_results
        {
            return Err(anyhow::anyhow!(
                "TOPIC_UPLOAD_EVENTS must differ from TOPIC_SCAN_RESULTS and TOPIC_UPLOAD_EVENTS_DLT"
            ));
        }

        match self.storage.backend {
            StorageBackend::S3 => {
                if self.storage.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.storage.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.storage.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
            }
            StorageBackend::Memory => {}
        }

        if self.status_store == StatusStoreBackend::Postgres {
            let valid_url = self.database_url.as_deref().is_some_and(|url| {
                url.starts_with("postgres://") || url.starts_with("postgresql://")
            });
            if !valid_url {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        Ok(())
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, anyhow::Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).filter(|s| !s.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {} ({})", key, raw, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn memory_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("STORAGE_BACKEND", "memory"),
            ("BUS_BACKEND", "memory"),
            ("STATUS_STORE", "memory"),
        ]
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup_from(&memory_env())).unwrap();
        assert_eq!(config.retry, RetrySettings::default());
        assert_eq!(config.bus.topics.upload_events, "file-upload-events");
        assert_eq!(config.bus.topics.upload_events_dlt, "file-upload-events-dlt");
        assert_eq!(config.clamav.port, 3310);
        assert_eq!(config.consumer_workers, 1);
        assert!(!config.is_production());
    }

    #[test]
    fn reads_retry_overrides() {
        let mut env = memory_env();
        env.extend([
            ("RETRY_MAX_ATTEMPTS", "5"),
            ("RETRY_INITIAL_DELAY_MS", "200"),
            ("RETRY_MULTIPLIER", "3"),
            ("RETRY_MAX_DELAY_MS", "900"),
        ]);
        let config = Config::from_lookup(lookup_from(&env)).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay_ms, 200);
        assert_eq!(config.retry.multiplier, 3.0);
        assert_eq!(config.retry.max_delay_ms, 900);
    }

    #[test]
    fn rejects_zero_attempts() {
        let mut env = memory_env();
        env.push(("RETRY_MAX_ATTEMPTS", "0"));
        let err = Config::from_lookup(lookup_from(&env)).unwrap_err();
        assert!(err.to_string().contains("RETRY_MAX_ATTEMPTS"));
    }

    #[test]
    fn rejects_unparseable_numbers() {
        let mut env = memory_env();
        env.push(("CLAMAV_PORT", "not-a-port"));
        let err = Config::from_lookup(lookup_from(&env)).unwrap_err();
        assert!(err.to_string().contains("CLAMAV_PORT"));
    }

    #[test]
    fn rejects_shrinking_delay_ceiling() {
        let mut env = memory_env();
        env.extend([("RETRY_INITIAL_DELAY_MS", "5000"), ("RETRY_MAX_DELAY_MS", "10")]);
        assert!(Config::from_lookup(lookup_from(&env)).is_err());
    }

    #[test]
    fn s3_requires_bucket_and_region() {
        let env = [("BUS_BACKEND", "memory"), ("STATUS_STORE", "memory")];
        let err = Config::from_lookup(lookup_from(&env)).unwrap_err();
        assert!(err.to_string().contains("S3_BUCKET"));

        let env = [
            ("BUS_BACKEND", "memory"),
            ("STATUS_STORE", "memory"),
            ("S3_BUCKET", "uploads"),
            ("AWS_REGION", "eu-west-1"),
        ];
        let config = Config::from_lookup(lookup_from(&env)).unwrap();
        assert_eq!(config.storage.s3_region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.storage.bucket_name(), "uploads");
    }

    #[test]
    fn postgres_requires_database_url() {
        let env = [("STORAGE_BACKEND", "memory"), ("BUS_BACKEND", "memory")];
        let err = Config::from_lookup(lookup_from(&env)).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }
}
