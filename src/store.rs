//! Persistence layer: keyed TTL store, typed flow facade, advisory locks,
//! and input references

pub mod flow_store;
pub mod inputs;
pub mod kv;
pub mod lock;
pub mod records;

pub use flow_store::{FlowConfig, FlowStore};
pub use inputs::{InputStore, StoreInputStore};
pub use kv::MemoryStore;
pub use lock::LockManager;
