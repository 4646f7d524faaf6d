use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use pacekeeper_core_types::PaceError;

#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("serialization failed: {0}")]
    Serialize(String),
}

impl From<StoreError> for PaceError {
    fn from(value: StoreError) -> Self {
        PaceError::Store(value.to_string())
    }
}

/// Closure applied atomically to one key. `None` input means the key is
/// absent (or expired); returning `None` deletes the key.
pub type UpdateFn = Box<dyn FnOnce(Option<Value>) -> Option<Value> + Send>;

#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn put(&self, key: &str, value: Value, ttl: Option<Duration>)
        -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Windowed counter: increments and returns the new count. The TTL
    /// is armed when the key is first created, not refreshed on every
    /// increment.
    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<u64, StoreError>;

    /// Atomic read-modify-write of one key. Two workers racing to
    /// transition the same key serialize here; exactly one observes the
    /// other's write.
    async fn update(
        &self,
        key: &str,
        ttl: Option<Duration>,
        f: UpdateFn,
    ) -> Result<Option<Value>, StoreError>;

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Drops expired entries; returns how many were removed.
    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// Typed JSON helpers over the raw store. A malformed stored record is
/// logged, the key is reset, and the caller sees "absent" rather than a
/// fatal error.
#[async_trait]
pub trait CounterStoreExt: CounterStore {
    async fn get_typed<T>(&self, key: &str) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            None => Ok(None),
            Some(raw) => match serde_json::from_value(raw) {
                Ok(value) => Ok(Some(value)),
                Err(err) => {
                    warn!(target: "counter_store", key, error = %err, "corrupt record dropped");
                    self.delete(key).await?;
                    Ok(None)
                }
            },
        }
    }

    async fn put_typed<T>(&self, key: &str, value: &T, ttl: Option<Duration>)
        -> Result<(), StoreError>
    where
        T: Serialize + Sync,
    {
        let raw = serde_json::to_value(value).map_err(|err| StoreError::Serialize(err.to_string()))?;
        self.put(key, raw, ttl).await
    }

    /// Typed atomic read-modify-write; corruption is treated as absence.
    async fn update_typed<T, F>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        f: F,
    ) -> Result<Option<T>, StoreError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(Option<T>) -> Option<T> + Send + 'static,
    {
        let owned_key = key.to_string();
        let result = self
            .update(
                key,
                ttl,
                Box::new(move |raw| {
                    let current = raw.and_then(|value| match serde_json::from_value::<T>(value) {
                        Ok(typed) => Some(typed),
                        Err(err) => {
                            warn!(
                                target: "counter_store",
                                key = %owned_key,
                                error = %err,
                                "corrupt record reset during update"
                            );
                            None
                        }
                    });
                    f(current).and_then(|next| serde_json::to_value(next).ok())
                }),
            )
            .await?;
        match result {
            None => Ok(None),
            Some(raw) => serde_json::from_value(raw)
                .map(Some)
                .map_err(|err| StoreError::Serialize(err.to_string())),
        }
    }
}

impl<S: CounterStore + ?Sized> CounterStoreExt for S {}
