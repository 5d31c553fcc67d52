//! Adapters behind the domain ports: ledger stores, the simulated remote
//! backend, and credential providers.

pub mod auth;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod simulated;
