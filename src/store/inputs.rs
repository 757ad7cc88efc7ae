//! Per-slot input references
//!
//! The flow only needs to know whether a slot is filled and by which
//! artifact reference; the artifacts themselves live elsewhere.

use crate::flow::InputSlot;
use crate::store::kv::{KeyValueStore, StoreResult};
use crate::store::records::input_key;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InputRefs {
    pub a: Option<String>,
    pub b: Option<String>,
}

#[async_trait]
pub trait InputStore: Send + Sync {
    async fn save_input(&self, user_id: &str, slot: InputSlot, artifact_ref: &str)
        -> StoreResult<()>;
    async fn input_refs(&self, user_id: &str) -> StoreResult<InputRefs>;
    async fn clear_input(&self, user_id: &str, slot: InputSlot) -> StoreResult<()>;
}

#[async_trait]
impl<T: InputStore + ?Sized> InputStore for Arc<T> {
    async fn save_input(
        &self,
        user_id: &str,
        slot: InputSlot,
        artifact_ref: &str,
    ) -> StoreResult<()> {
        (**self).save_input(user_id, slot, artifact_ref).await
    }

    async fn input_refs(&self, user_id: &str) -> StoreResult<InputRefs> {
        (**self).input_refs(user_id).await
    }

    async fn clear_input(&self, user_id: &str, slot: InputSlot) -> StoreResult<()> {
        (**self).clear_input(user_id, slot).await
    }
}

/// Input references kept in the same keyed store as the rest of the flow,
/// under `input:{user}:{slot}`. Inputs share the session TTL so a live
/// flow never loses a slot before the session itself lapses.
#[derive(Clone)]
pub struct StoreInputStore<S> {
    store: S,
    ttl: Duration,
}

impl<S: KeyValueStore + Clone> StoreInputStore<S> {
    pub fn new(store: S, ttl: Duration) -> Self {
        Self { store, ttl }
    }
}

#[async_trait]
impl<S: KeyValueStore + Clone> InputStore for StoreInputStore<S> {
    async fn save_input(
        &self,
        user_id: &str,
        slot: InputSlot,
        artifact_ref: &str,
    ) -> StoreResult<()> {
        self.store
            .set(&input_key(user_id, slot), artifact_ref, self.ttl)
            .await
    }

    async fn input_refs(&self, user_id: &str) -> StoreResult<InputRefs> {
        Ok(InputRefs {
            a: self.store.get(&input_key(user_id, InputSlot::A)).await?,
            b: self.store.get(&input_key(user_id, InputSlot::B)).await?,
        })
    }

    async fn clear_input(&self, user_id: &str, slot: InputSlot) -> StoreResult<()> {
        self.store.delete(&input_key(user_id, slot)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::kv::MemoryStore;

    #[tokio::test]
    async fn slots_are_independent() {
        let inputs = StoreInputStore::new(MemoryStore::new(), Duration::from_secs(60));
        inputs.save_input("u", InputSlot::A, "ref-a").await.unwrap();

        let refs = inputs.input_refs("u").await.unwrap();
        assert_eq!(refs.a.as_deref(), Some("ref-a"));
        assert_eq!(refs.b, None);

        inputs.save_input("u", InputSlot::B, "ref-b").await.unwrap();
        inputs.clear_input("u", InputSlot::A).await.unwrap();

        let refs = inputs.input_refs("u").await.unwrap();
        assert_eq!(refs.a, None);
        assert_eq!(refs.b.as_deref(), Some("ref-b"));
    }

    #[tokio::test]
    async fn resaving_a_slot_overwrites_it() {
        let inputs = StoreInputStore::new(MemoryStore::new(), Duration::from_secs(60));
        inputs.save_input("u", InputSlot::A, "old").await.unwrap();
        inputs.save_input("u", InputSlot::A, "new").await.unwrap();
        let refs = inputs.input_refs("u").await.unwrap();
        assert_eq!(refs.a.as_deref(), Some("new"));
    }
}
