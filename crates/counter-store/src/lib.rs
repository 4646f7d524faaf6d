//! Shared, TTL-capable keyed store used by every control-plane crate.
//!
//! The store is the single writer-of-record for windowed counts,
//! circuit-breaker state, safety status, emergency-stop flags and queued
//! jobs. Every invariant is enforced within a single key's value, so the
//! only atomic primitive components need is [`CounterStore::update`]: a
//! read-modify-write of one key that serializes against concurrent
//! writers of the same key.

pub mod keys;
pub mod memory;
pub mod store;

pub use memory::MemoryStore;
pub use store::{CounterStore, CounterStoreExt, StoreError, UpdateFn};
