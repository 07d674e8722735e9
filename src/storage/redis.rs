use crate::error::StoreError;
use crate::storage::LeaseStore;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use std::str::FromStr;
use std::time::Duration;

/// Deletes KEYS[1] only while it still holds ARGV[1].
const COMPARE_AND_DELETE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

pub struct RedisStore {
    client: ConnectionManager,
    prefix: String,
    release_script: Script,
}

impl RedisStore {
    pub async fn new(
        redis_url: &str,
        username: Option<String>,
        password: Option<String>,
        db: Option<i64>,
    ) -> Result<Self, StoreError> {
        let mut connection_info = redis::ConnectionInfo::from_str(redis_url)?;

        if let Some(pwd) = password {
            connection_info.redis.password = Some(pwd);
        }
        if let Some(user) = username {
            connection_info.redis.username = Some(user);
        }
        if let Some(database) = db {
            connection_info.redis.db = database;
        }

        let client = redis::Client::open(connection_info)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self::from_connection(connection))
    }

    pub fn from_connection(client: ConnectionManager) -> Self {
        Self {
            client,
            prefix: "lock:".to_string(),
            release_script: Script::new(COMPARE_AND_DELETE_SCRIPT),
        }
    }

    /// Namespace prepended to every lock key.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn lock_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

/// Redis rejects a zero `PX`, so sub-millisecond TTLs round up.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl LeaseStore for RedisStore {
    async fn set_if_not_exists(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let lock_key = self.lock_key(key);
        let mut conn = self.client.clone();

        // SET NX PX creates the entry and its TTL in one atomic command.
        let reply: Option<String> = redis::cmd("SET")
            .arg(&lock_key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let lock_key = self.lock_key(key);
        let mut conn = self.client.clone();

        let deleted: i64 = self
            .release_script
            .key(&lock_key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;

        Ok(deleted == 1)
    }
}
