use super::{BlobObject, BlobStore, PutCondition};
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use deadpool_redis::redis::{cmd, AsyncCommands, Script};
use deadpool_redis::Pool;
use debug_stub_derive::DebugStub;
use momentum_base::error::MomentumError;

const OBJECT_KEY_PREFIX: &str = "momentum:blob:";

/// Compare-and-set of one object hash. Returns the new version, or -1 when
/// the condition does not hold.
const PUT_OBJECT_SCRIPT: &str = r#"
local key = KEYS[1]
local mode = ARGV[1]
local expected = ARGV[2]
local current = redis.call('HGET', key, 'version')

if mode == 'absent' and current then
    return -1
end
if mode == 'version' and ((not current) or current ~= expected) then
    return -1
end

local next_version = 1
if current then
    next_version = tonumber(current) + 1
end
redis.call('HSET', key, 'data', ARGV[3], 'content_type', ARGV[4], 'version', next_version)
return next_version
"#;

#[derive(Clone, DebugStub)]
pub struct RedisBlobStore {
    #[debug_stub = "deadpool_redis::Pool"]
    pool: Pool,
}

impl RedisBlobStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    fn object_key(bucket: &str, key: &str) -> String {
        format!("{}{}:{}", OBJECT_KEY_PREFIX, bucket, key)
    }
}

fn redis_error(e: deadpool_redis::redis::RedisError) -> MomentumError {
    MomentumError::RedisError(e.to_string())
}

#[async_trait]
impl BlobStore for RedisBlobStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<BlobObject>> {
        let mut conn = self.pool.get().await?;
        let (data, version, content_type): (Option<Vec<u8>>, Option<u64>, Option<String>) =
            cmd("HMGET")
                .arg(Self::object_key(bucket, key))
                .arg("data")
                .arg("version")
                .arg("content_type")
                .query_async(&mut *conn)
                .await
                .map_err(redis_error)?;
        match (data, version) {
            (Some(data), Some(version)) => Ok(Some(BlobObject {
                data: Bytes::from(data),
                version,
                content_type: content_type.unwrap_or_default(),
            })),
            _ => Ok(None),
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
        condition: PutCondition,
    ) -> Result<u64> {
        let (mode, expected) = match condition {
            PutCondition::Always => ("always", String::new()),
            PutCondition::IfAbsent => ("absent", String::new()),
            PutCondition::IfVersion(v) => ("version", v.to_string()),
        };
        let mut conn = self.pool.get().await?;
        let script = Script::new(PUT_OBJECT_SCRIPT);
        let result: i64 = script
            .key(Self::object_key(bucket, key))
            .arg(mode)
            .arg(expected)
            .arg(data.as_ref())
            .arg(content_type)
            .invoke_async(&mut *conn)
            .await
            .map_err(redis_error)?;
        if result < 0 {
            let current: Option<u64> = conn
                .hget(Self::object_key(bucket, key), "version")
                .await
                .map_err(redis_error)?;
            return Err(super::conflict(bucket, key, condition, current));
        }
        tracing::debug!("put object to redis: {}/{} v{}", bucket, key, result);
        Ok(result as u64)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let removed: i64 = conn
            .del(Self::object_key(bucket, key))
            .await
            .map_err(redis_error)?;
        Ok(removed > 0)
    }
}
