use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub store_type: StoreType,
    pub redis_url: Option<String>,
    pub redis_username: Option<String>,
    pub redis_password: Option<String>,
    pub redis_db: Option<i64>,
    pub lock_key: String,
    pub lock_key_prefix: String,
    pub scenario: usize,
    pub workers: usize,
    pub worker_stagger: Duration,
    pub memory_sweep_interval: u64, // seconds
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    Memory,
    Redis,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from any variable source; unset or unparsable values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_type = lookup("STORE_TYPE")
            .unwrap_or_else(|| "memory".to_string())
            .to_lowercase();

        let store_type = match store_type.as_str() {
            "redis" => StoreType::Redis,
            _ => StoreType::Memory,
        };

        let redis_url = if store_type == StoreType::Redis {
            Some(lookup("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()))
        } else {
            None
        };

        let redis_username = lookup("REDIS_USERNAME");
        let redis_password = lookup("REDIS_PASSWORD");
        let redis_db = lookup("REDIS_DB").and_then(|s| s.parse::<i64>().ok());

        let lock_key = lookup("LOCK_KEY").unwrap_or_else(|| "Test".to_string());
        let lock_key_prefix = lookup("LOCK_KEY_PREFIX").unwrap_or_else(|| "lock:".to_string());

        let scenario = lookup("SCENARIO")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        let workers = lookup("WORKERS")
            .and_then(|s| s.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(1);

        let worker_stagger = lookup("WORKER_STAGGER_SECS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::ZERO);

        let memory_sweep_interval = lookup("MEMORY_SWEEP_INTERVAL")
            .and_then(|s| s.parse().ok())
            .filter(|n: &u64| *n > 0)
            .unwrap_or(60);

        Self {
            store_type,
            redis_url,
            redis_username,
            redis_password,
            redis_db,
            lock_key,
            lock_key_prefix,
            scenario,
            workers,
            worker_stagger,
            memory_sweep_interval,
        }
    }
}
