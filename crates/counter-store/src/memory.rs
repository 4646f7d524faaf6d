use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;

use crate::store::{CounterStore, StoreError, UpdateFn};

#[derive(Clone, Debug)]
struct Stored {
    value: Value,
    expires_at: Option<Instant>,
}

impl Stored {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|dur| Instant::now() + dur),
        }
    }

    fn expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// In-memory store. Durability is the deployment's concern (a
/// Redis-backed implementation slots in behind the same trait); the
/// atomicity contract is identical: `update` runs its closure under the
/// entry lock for the key.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: DashMap<String, Stored>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let now = Instant::now();
        if let Some(entry) = self.map.get(key) {
            if !entry.expired(now) {
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }
        // Expired: drop it lazily.
        self.map.remove_if(key, |_, stored| stored.expired(now));
        Ok(None)
    }

    async fn put(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.map.insert(key.to_string(), Stored::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.map.remove(key).is_some())
    }

    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<u64, StoreError> {
        let now = Instant::now();
        match self.map.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expired(now) {
                    occupied.insert(Stored::new(Value::from(1u64), ttl));
                    return Ok(1);
                }
                let next = occupied.get().value.as_u64().unwrap_or(0) + 1;
                occupied.get_mut().value = Value::from(next);
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Stored::new(Value::from(1u64), ttl));
                Ok(1)
            }
        }
    }

    async fn update(
        &self,
        key: &str,
        ttl: Option<Duration>,
        f: UpdateFn,
    ) -> Result<Option<Value>, StoreError> {
        let now = Instant::now();
        match self.map.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = if occupied.get().expired(now) {
                    None
                } else {
                    Some(occupied.get().value.clone())
                };
                match f(current) {
                    Some(next) => {
                        occupied.insert(Stored::new(next.clone(), ttl));
                        Ok(Some(next))
                    }
                    None => {
                        occupied.remove();
                        Ok(None)
                    }
                }
            }
            Entry::Vacant(vacant) => match f(None) {
                Some(next) => {
                    vacant.insert(Stored::new(next.clone(), ttl));
                    Ok(Some(next))
                }
                None => Ok(None),
            },
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        Ok(self
            .map
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && !entry.value().expired(now))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let before = self.map.len();
        self.map.retain(|_, stored| !stored.expired(now));
        Ok(before.saturating_sub(self.map.len()))
    }
}
