//! Adapters for the domain ports: in-memory and RocksDB ledgers, and a
//! simulated settlement provider.

pub mod gateway;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
